//! Proof Manifest (§3): the JSON artifact the harness treats as the
//! authoritative result of a matrix cell.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// `status` field of a proof manifest (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestStatus {
    Pending,
    Success,
    Failure,
}

/// A durable record of one matrix cell's execution (§3 "Proof Manifest").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofManifest {
    pub test_name: String,
    pub client_type: String,
    pub server_type: String,
    pub tls_mode: String,
    pub crypto_type: String,
    pub keys_written: Vec<String>,
    pub user_data: Value,
    pub status: ManifestStatus,
    pub timestamp: u64,
    pub server_handshake: Option<Value>,
    pub client_handshake: Option<Value>,
    pub kv_storage_files: Vec<PathBuf>,
    /// Not part of §3's field list; carried so a `failure` manifest is
    /// actionable on its own rather than forcing a log trawl.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ProofManifest {
    /// Start a manifest in the `pending` state (§3: "status transitions
    /// pending -> success only after the Get returns matching bytes").
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        test_name: impl Into<String>,
        client_type: impl Into<String>,
        server_type: impl Into<String>,
        tls_mode: impl Into<String>,
        crypto_type: impl Into<String>,
        user_data: Value,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            client_type: client_type.into(),
            server_type: server_type.into(),
            tls_mode: tls_mode.into(),
            crypto_type: crypto_type.into(),
            keys_written: Vec::new(),
            user_data,
            status: ManifestStatus::Pending,
            timestamp: now_unix(),
            server_handshake: None,
            client_handshake: None,
            kv_storage_files: Vec::new(),
            failure_reason: None,
        }
    }

    /// Write `<proof_dir>/<test_name>_<unix_timestamp>.json` (§6 "Proof
    /// manifest layout").
    pub fn write(&self, proof_dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(proof_dir)?;
        let path = proof_dir.join(format!("{}_{}.json", self.test_name, self.timestamp));
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_manifest_to_expected_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = ProofManifest::pending(
            "rust_rust_auto_ecdsa_p256_deadbeef",
            "rust-client",
            "rust-server",
            "auto",
            "ecdsa_p256",
            json!({"n": 1}),
        );
        manifest.status = ManifestStatus::Success;
        let path = manifest.write(dir.path()).unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("rust_rust_auto_ecdsa_p256_deadbeef_"));

        let loaded: ProofManifest =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(loaded.status, ManifestStatus::Success);
    }

    #[test]
    fn status_serializes_lowercase() {
        let manifest = ProofManifest::pending("t", "c", "s", "auto", "ecdsa", json!({}));
        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["status"], "pending");
    }
}
