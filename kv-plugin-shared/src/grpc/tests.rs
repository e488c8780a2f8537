use super::service::{KvService, ServerHandshakeInfo};
use super::{Kv, PutRequest, GetRequest};
use crate::storage::KvStore;
use std::time::Duration;
use tonic::Request;

fn handshake() -> ServerHandshakeInfo {
    ServerHandshakeInfo {
        endpoint: "127.0.0.1:0".to_string(),
        protocol_version: "1".to_string(),
        tls_mode: "disabled".to_string(),
        tls_curve: None,
        cert_fingerprint: None,
    }
}

fn service() -> (tempfile::TempDir, KvService) {
    let dir = tempfile::tempdir().unwrap();
    let store = KvStore::open(dir.path(), Duration::from_secs(2)).unwrap();
    (dir, KvService::new(store, handshake()))
}

#[tokio::test]
async fn put_non_json_round_trips_verbatim() {
    let (_dir, svc) = service();
    svc.put(Request::new(PutRequest {
        key: "alpha".to_string(),
        value: vec![1, 2, 3],
    }))
    .await
    .unwrap();

    let resp = svc
        .get(Request::new(GetRequest {
            key: "alpha".to_string(),
        }))
        .await
        .unwrap();
    assert_eq!(resp.into_inner().value, vec![1, 2, 3]);
}

#[tokio::test]
async fn put_json_object_gets_enriched() {
    let (_dir, svc) = service();
    let payload = br#"{"test":"ecdsa"}"#.to_vec();
    svc.put(Request::new(PutRequest {
        key: "beta".to_string(),
        value: payload,
    }))
    .await
    .unwrap();

    let resp = svc
        .get(Request::new(GetRequest {
            key: "beta".to_string(),
        }))
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&resp.into_inner().value).unwrap();
    assert_eq!(value["test"], "ecdsa");
    assert!(value.get("server_handshake").is_some());
}

#[tokio::test]
async fn get_missing_key_maps_to_not_found_status() {
    let (_dir, svc) = service();
    let err = svc
        .get(Request::new(GetRequest {
            key: "never".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::NotFound);
}

#[tokio::test]
async fn put_invalid_key_maps_to_invalid_argument() {
    let (_dir, svc) = service();
    let err = svc
        .put(Request::new(PutRequest {
            key: "bad/key".to_string(),
            value: vec![1],
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);
}
