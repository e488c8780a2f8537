//! Matrix cell execution (§4.G steps 1-5): spawn a client bound to the
//! cell's server, Put, Get, assert round-trip equivalence, write the manifest.

use crate::manifest::{ManifestStatus, ProofManifest};
use crate::matrix::MatrixCell;
use kv_plugin_shared::config::{Curve, KeyType, TlsMode};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Outcome of running one matrix cell to completion: where its manifest
/// landed, the manifest itself, and how long the cell took.
pub struct CellResult {
    pub manifest_path: PathBuf,
    pub manifest: ProofManifest,
    pub elapsed: Duration,
}

/// Run one matrix cell end-to-end (§4.G). Each cell gets its own KV storage
/// directory under `storage_root` so concurrent cells never collide (§5
/// "each cell owning its own subprocess and its own process-local storage
/// directory").
pub async fn run_cell(cell: &MatrixCell, proof_dir: &Path, storage_root: &Path) -> CellResult {
    let started = Instant::now();
    let short_id = short_uuid();
    let tls_label = tls_mode_label(cell.tls_mode);
    let crypto_label = crypto_label(cell.key_type, cell.curve);

    // §4.G step 1: "Generate a unique key encoding test identity."
    let test_name = format!(
        "{}_{}_{}_{}_{}",
        cell.client_impl, cell.server_impl, tls_label, crypto_label, short_id
    );
    let key = test_name.clone();

    // §4.G step 2: a JSON payload with a `user_data` subfield that also
    // identifies the combination textually, per the example in §8 scenario 3.
    let user_data = json!({ "cell": test_name.clone() });
    let value = json!({
        "test": format!(
            "{}->{}({}_{})",
            cell.client_impl, cell.server_impl, tls_label, crypto_label
        ),
        "user_data": user_data.clone(),
    });

    let mut manifest = ProofManifest::pending(
        &test_name,
        &cell.client_impl,
        &cell.server_impl,
        tls_label,
        &crypto_label,
        user_data,
    );

    let cell_storage_dir = storage_root.join(&test_name);

    match execute(cell, &key, &value, &cell_storage_dir).await {
        Ok(outcome) => {
            manifest.status = ManifestStatus::Success;
            manifest.keys_written = vec![key];
            manifest.client_handshake = Some(outcome.client_handshake);
            manifest.server_handshake = Some(outcome.server_handshake);
            manifest.kv_storage_files = outcome.kv_storage_files;
        }
        Err(reason) => {
            manifest.status = ManifestStatus::Failure;
            manifest.failure_reason = Some(reason);
        }
    }

    let manifest_path = manifest
        .write(proof_dir)
        .unwrap_or_else(|e| panic!("failed to write proof manifest {test_name:?}: {e}"));

    CellResult {
        manifest_path,
        manifest,
        elapsed: started.elapsed(),
    }
}

struct ExecuteOutcome {
    client_handshake: Value,
    server_handshake: Value,
    kv_storage_files: Vec<PathBuf>,
}

async fn execute(
    cell: &MatrixCell,
    key: &str,
    value: &Value,
    storage_dir: &Path,
) -> Result<ExecuteOutcome, String> {
    use kv_plugin_client::{ClientSpawnConfig, PluginClient};

    let config = ClientSpawnConfig {
        server_path: Some(cell.server_path.clone()),
        tls_mode: cell.tls_mode,
        curve: cell.curve,
        key_type: cell.key_type,
        storage_dir: Some(storage_dir.to_path_buf()),
        ..Default::default()
    };

    let mut client = PluginClient::start(config).await.map_err(|e| e.to_string())?;

    // §3 "client_handshake (recorded after connect)".
    let client_handshake = json!({
        "address": client.handshake.address.as_str(),
        "tls_mode": client.tls_mode,
        "negotiated_curve": client.negotiated_curve,
    });

    let value_bytes = serde_json::to_vec(value).map_err(|e| e.to_string())?;

    let put_result = client.put(key.to_string(), value_bytes).await;
    if let Err(e) = put_result {
        let _ = client.shutdown().await;
        return Err(format!("put failed: {e}"));
    }

    // §4.G step 3: "get(key) to recover the enriched payload".
    let get_result = client.get(key.to_string()).await;
    let kv_storage_files = written_files(storage_dir);
    client.shutdown().await.map_err(|e| e.to_string())?;

    let returned = get_result.map_err(|e| format!("get failed: {e}"))?;
    let returned_value: Value =
        serde_json::from_slice(&returned).map_err(|e| format!("response wasn't JSON: {e}"))?;

    let mut normalized = returned_value.clone();
    let server_handshake = match &mut normalized {
        Value::Object(map) => map.remove("server_handshake"),
        _ => None,
    };

    // §4.G step 5: "the bytes round-tripped (ignoring the injected
    // server_handshake) equal the bytes sent".
    if normalized != *value {
        return Err(format!(
            "round-trip mismatch ignoring server_handshake: sent {value} got {normalized}"
        ));
    }

    let server_handshake = server_handshake
        .ok_or_else(|| "Get response missing server_handshake enrichment".to_string())?;

    Ok(ExecuteOutcome {
        client_handshake,
        server_handshake,
        kv_storage_files,
    })
}

/// Paths the server actually wrote under this cell's storage directory (§3
/// "kv_storage_files: paths the server actually wrote").
fn written_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("kv-data-"))
                .unwrap_or(false)
        })
        .collect()
}

fn tls_mode_label(mode: TlsMode) -> &'static str {
    match mode {
        TlsMode::Disabled => "disabled",
        TlsMode::Auto => "auto",
        TlsMode::Manual => "manual",
    }
}

fn crypto_label(key_type: KeyType, curve: Curve) -> String {
    match key_type {
        KeyType::Rsa => "rsa".to_string(),
        KeyType::Ecdsa => format!("ecdsa_{}", curve.canonical_name()),
    }
}

fn short_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_label_rsa_ignores_curve() {
        assert_eq!(crypto_label(KeyType::Rsa, Curve::P256), "rsa");
    }

    #[test]
    fn crypto_label_ecdsa_includes_curve() {
        assert_eq!(crypto_label(KeyType::Ecdsa, Curve::P384), "ecdsa_P-384");
    }

    #[test]
    fn short_uuid_is_eight_hex_chars() {
        let id = short_uuid();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
