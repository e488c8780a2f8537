//! End-to-end matrix cell tests against the real `kv-plugin-server` binary
//! (§4.I "Cross-cutting integration tests"), spawned via
//! `CARGO_BIN_EXE_kv-plugin-server`.

use kv_plugin_harness::manifest::ManifestStatus;
use kv_plugin_harness::matrix::{build_matrix, ServerBinary};
use kv_plugin_harness::runner::run_cell;
use kv_plugin_shared::config::{Curve, KeyType, TlsMode};
use std::path::PathBuf;

fn server_binary() -> ServerBinary {
    ServerBinary {
        name: "kv-plugin-server-rs".to_string(),
        path: PathBuf::from(env!("CARGO_BIN_EXE_kv-plugin-server")),
    }
}

#[tokio::test]
async fn plaintext_cell_round_trips_and_succeeds() {
    let proof_dir = tempfile::tempdir().unwrap();
    let storage_root = tempfile::tempdir().unwrap();

    let (cells, _skipped) = build_matrix(
        "kv-plugin-client-rs",
        &[server_binary()],
        &[TlsMode::Disabled],
        &[Curve::Auto],
        &[KeyType::Ecdsa],
    );
    assert_eq!(cells.len(), 1);

    let result = run_cell(&cells[0], proof_dir.path(), storage_root.path()).await;

    assert_eq!(result.manifest.status, ManifestStatus::Success);
    assert_eq!(result.manifest.keys_written.len(), 1);
    assert!(!result.manifest.kv_storage_files.is_empty());
    assert!(result.manifest_path.exists());
}

#[tokio::test]
async fn auto_mtls_p256_cell_succeeds_and_reports_curve() {
    let proof_dir = tempfile::tempdir().unwrap();
    let storage_root = tempfile::tempdir().unwrap();

    let (cells, _skipped) = build_matrix(
        "kv-plugin-client-rs",
        &[server_binary()],
        &[TlsMode::Auto],
        &[Curve::P256],
        &[KeyType::Ecdsa],
    );
    assert_eq!(cells.len(), 1);

    let result = run_cell(&cells[0], proof_dir.path(), storage_root.path()).await;

    assert_eq!(result.manifest.status, ManifestStatus::Success);
    let server_handshake = result.manifest.server_handshake.expect("server_handshake present");
    assert_eq!(server_handshake["tls_config"]["curve"], "P-256");
}

#[tokio::test]
async fn unix_socket_network_round_trips_plaintext() {
    use kv_plugin_client::PluginClient;
    use kv_plugin_shared::config::{ClientSpawnConfig, NetworkMode};

    let storage_dir = tempfile::tempdir().unwrap();
    let config = ClientSpawnConfig {
        server_path: Some(server_binary().path),
        network: NetworkMode::Unix,
        tls_mode: TlsMode::Disabled,
        storage_dir: Some(storage_dir.path().to_path_buf()),
        ..Default::default()
    };

    let mut client = PluginClient::start(config).await.expect("unix-socket start");
    assert!(matches!(
        client.handshake.address,
        kv_plugin_shared::handshake::HandshakeAddress::Unix(_)
    ));

    client.put("alpha".to_string(), vec![1, 2, 3]).await.unwrap();
    let value = client.get("alpha".to_string()).await.unwrap();
    assert_eq!(value, vec![1, 2, 3]);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn p521_cell_is_skipped_by_the_compatibility_table() {
    let (cells, skipped) = build_matrix(
        "kv-plugin-client-rs",
        &[server_binary()],
        &[TlsMode::Auto],
        &[Curve::P521],
        &[KeyType::Ecdsa],
    );
    assert!(cells.is_empty());
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].curve, Curve::P521);
}
