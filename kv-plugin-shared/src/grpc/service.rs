use crate::error::{Error, StorageError};
use crate::grpc::enrichment::{self, EnrichmentContext};
use crate::grpc::proto::kv_server::Kv;
use crate::grpc::proto::{Empty, GetRequest, GetResponse, PutRequest};
use crate::storage::KvStore;
use serde_json::json;
use tonic::{Request, Response, Status};

/// Server-side handshake context reused across every enrichment (§4.D).
#[derive(Debug, Clone)]
pub struct ServerHandshakeInfo {
    pub endpoint: String,
    pub protocol_version: String,
    pub tls_mode: String,
    pub tls_curve: Option<String>,
    pub cert_fingerprint: Option<String>,
}

/// Implements the abstract `Kv` service (§6) on top of the storage engine.
#[derive(Clone)]
pub struct KvService {
    store: KvStore,
    handshake: ServerHandshakeInfo,
}

impl KvService {
    pub fn new(store: KvStore, handshake: ServerHandshakeInfo) -> Self {
        Self { store, handshake }
    }

    fn enrichment_context(&self) -> EnrichmentContext {
        EnrichmentContext {
            endpoint: self.handshake.endpoint.clone(),
            protocol_version: self.handshake.protocol_version.clone(),
            tls_mode: self.handshake.tls_mode.clone(),
            tls_config: self
                .handshake
                .tls_curve
                .as_ref()
                .map(|curve| json!({ "curve": curve })),
            cert_fingerprint: self.handshake.cert_fingerprint.clone(),
            received_at: self.store.uptime_secs(),
        }
    }
}

#[tonic::async_trait]
impl Kv for KvService {
    async fn put(&self, request: Request<PutRequest>) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        log::debug!(
            "Put key={:?} value_len={}",
            req.key,
            req.value.len()
        );

        let enriched = enrichment::enrich(&req.value, &self.enrichment_context());

        self.store
            .put(req.key, enriched)
            .await
            .map_err(storage_error_to_status)?;

        Ok(Response::new(Empty {}))
    }

    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = request.into_inner();
        let value = self
            .store
            .get(req.key.clone())
            .await
            .map_err(storage_error_to_status)?;

        log::debug!("Get key={:?} value_len={}", req.key, value.len());

        Ok(Response::new(GetResponse { value }))
    }
}

fn storage_error_to_status(err: Error) -> Status {
    match err {
        Error::Storage(StorageError::NotFound { key }) => {
            Status::not_found(format!("key not found: {key}"))
        }
        Error::Storage(StorageError::FilesystemConstraint { key, reason }) => {
            Status::invalid_argument(format!("invalid key {key:?}: {reason}"))
        }
        Error::Storage(StorageError::LockTimeout { key, timeout_ms }) => Status::internal(
            format!("lock timeout acquiring key {key} after {timeout_ms}ms"),
        ),
        other => Status::internal(other.to_string()),
    }
}
