//! KV gRPC Surface: Put/Get methods, JSON enrichment, error mapping (§4.D).

pub mod enrichment;
mod service;

pub mod proto {
    tonic::include_proto!("kv");
}

pub use proto::kv_client::KvClient;
pub use proto::kv_server::{Kv, KvServer};
pub use proto::{Empty, GetRequest, GetResponse, PutRequest};
pub use service::{KvService, ServerHandshakeInfo};

#[cfg(test)]
mod tests;
