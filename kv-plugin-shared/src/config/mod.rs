//! Environment-driven configuration for the server and client runtimes.
//!
//! Every field here is sourced from the environment contract (§6), not a
//! config file — this crate carries no file-format dependency.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// TLS operating mode negotiated by the server (§3 "TLS Mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlsMode {
    /// Plaintext channel, no certificates exchanged.
    Disabled,
    /// AutoMTLS: both peers generate ephemeral self-signed certs.
    Auto,
    /// Load cert/key from file paths (may fall back to Auto, §9).
    Manual,
}

impl Default for TlsMode {
    fn default() -> Self {
        TlsMode::Auto
    }
}

impl TlsMode {
    /// Parse the `TLS_MODE` environment value, defaulting to `Auto`.
    pub fn from_env_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "none" | "plaintext" => TlsMode::Disabled,
            "manual" => TlsMode::Manual,
            _ => TlsMode::Auto,
        }
    }
}

/// Named elliptic curve, or the `auto` sentinel (§3 "Curve Identifier").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curve {
    P256,
    P384,
    P521,
    /// Server: framework default (P-521). Client: detect from server cert.
    Auto,
}

impl Default for Curve {
    fn default() -> Self {
        Curve::Auto
    }
}

impl Curve {
    /// Parse any of the canonical spellings accepted by `TLS_CURVE` / `--curve`.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "p-256" | "p256" | "secp256r1" => Some(Curve::P256),
            "p-384" | "p384" | "secp384r1" => Some(Curve::P384),
            "p-521" | "p521" | "secp521r1" => Some(Curve::P521),
            "auto" => Some(Curve::Auto),
            _ => None,
        }
    }

    /// The canonical display name used in handshake diagnostics and manifests.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Curve::P256 => "P-256",
            Curve::P384 => "P-384",
            Curve::P521 => "P-521",
            Curve::Auto => "auto",
        }
    }
}

/// Which listener family the server binds (§3 "network ∈ {tcp, unix}").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkMode {
    /// Ephemeral TCP port on loopback (§4.E "BIND").
    Tcp,
    /// Unix domain socket under a system temp directory.
    Unix,
}

impl Default for NetworkMode {
    fn default() -> Self {
        NetworkMode::Tcp
    }
}

impl NetworkMode {
    /// Parse the `PLUGIN_NETWORK` environment value, defaulting to `Tcp`.
    pub fn from_env_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "unix" => NetworkMode::Unix,
            _ => NetworkMode::Tcp,
        }
    }
}

/// Private key family requested for the self-signed certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    Ecdsa,
    Rsa,
}

impl Default for KeyType {
    fn default() -> Self {
        KeyType::Ecdsa
    }
}

impl KeyType {
    pub fn from_env_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "rsa" => KeyType::Rsa,
            _ => KeyType::Ecdsa,
        }
    }
}

/// Environment inputs consumed by the Plugin Server Runtime (§4.E).
#[derive(Debug, Clone)]
pub struct ServerEnvConfig {
    /// Name of the env var the magic cookie is read from (`PLUGIN_MAGIC_COOKIE_KEY`).
    pub magic_cookie_key: String,
    /// Expected magic cookie value, baked into the server (default `"hello"`,
    /// matching the client's own default, §3 "Magic Cookie") — never itself
    /// read from the env var it's compared against, or a mismatch could
    /// never be observed.
    pub magic_cookie_value: String,
    /// Directory `kv-data-*` files are written under.
    pub storage_dir: std::path::PathBuf,
    /// Listener family: TCP loopback or a Unix domain socket (§3, §4.E).
    pub network: NetworkMode,
    pub tls_mode: TlsMode,
    pub tls_curve: Curve,
    pub tls_key_type: KeyType,
    /// PEM of the client's leaf cert, supplied by the client at spawn time.
    pub plugin_client_cert: Option<String>,
    /// Path used to compute a cert fingerprint for enrichment.
    pub plugin_server_cert: Option<String>,
    pub log_level: String,
    pub protocol_versions: String,
    /// Bounded wait for per-key storage locks (§4.C, default 10s).
    pub lock_timeout: Duration,
    /// Bounded drain window on shutdown (§4.E, default 5s).
    pub shutdown_timeout: Duration,
}

impl ServerEnvConfig {
    /// Build from the process environment, applying the documented defaults.
    pub fn from_env() -> Self {
        let magic_cookie_key =
            env::var("PLUGIN_MAGIC_COOKIE_KEY").unwrap_or_else(|_| "BASIC_PLUGIN".to_string());
        // The expected value is baked into the server, not read from the env
        // var it gates (§3, §7 "absent or mismatched"); "hello" is the
        // documented default and matches `ClientSpawnConfig`'s own default.
        let magic_cookie_value = "hello".to_string();

        let storage_dir = env::var("KV_STORAGE_DIR")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir());

        let network = env::var("PLUGIN_NETWORK")
            .map(|v| NetworkMode::from_env_str(&v))
            .unwrap_or_default();

        let tls_mode = env::var("TLS_MODE")
            .map(|v| TlsMode::from_env_str(&v))
            .unwrap_or_default();

        let tls_curve = env::var("TLS_CURVE")
            .ok()
            .and_then(|v| Curve::from_name(&v))
            .unwrap_or_default();

        let tls_key_type = env::var("TLS_KEY_TYPE")
            .map(|v| KeyType::from_env_str(&v))
            .unwrap_or_default();

        Self {
            magic_cookie_key,
            magic_cookie_value,
            storage_dir,
            network,
            tls_mode,
            tls_curve,
            tls_key_type,
            plugin_client_cert: env::var("PLUGIN_CLIENT_CERT").ok(),
            plugin_server_cert: env::var("PLUGIN_SERVER_CERT").ok(),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            protocol_versions: env::var("PLUGIN_PROTOCOL_VERSIONS")
                .unwrap_or_else(|_| "1".to_string()),
            lock_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    /// Whether the cookie env var matched the expected value.
    pub fn cookie_ok(&self) -> bool {
        env::var(&self.magic_cookie_key)
            .map(|v| v == self.magic_cookie_value)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_cookie_key(key: &str) -> ServerEnvConfig {
        ServerEnvConfig {
            magic_cookie_key: key.to_string(),
            magic_cookie_value: "hello".to_string(),
            storage_dir: env::temp_dir(),
            network: NetworkMode::Tcp,
            tls_mode: TlsMode::Auto,
            tls_curve: Curve::Auto,
            tls_key_type: KeyType::Ecdsa,
            plugin_client_cert: None,
            plugin_server_cert: None,
            log_level: "info".to_string(),
            protocol_versions: "1".to_string(),
            lock_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(1),
        }
    }

    // Each test uses its own env var name so they can run concurrently
    // without clobbering one another's process-wide environment state.

    #[test]
    fn cookie_ok_true_when_env_value_matches_expected() {
        let config = config_with_cookie_key("KV_PLUGIN_TEST_COOKIE_MATCH");
        env::set_var(&config.magic_cookie_key, &config.magic_cookie_value);
        assert!(config.cookie_ok());
        env::remove_var(&config.magic_cookie_key);
    }

    #[test]
    fn cookie_ok_false_when_env_value_differs_from_expected() {
        let config = config_with_cookie_key("KV_PLUGIN_TEST_COOKIE_MISMATCH");
        env::set_var(&config.magic_cookie_key, "wrong-value");
        assert!(!config.cookie_ok());
        env::remove_var(&config.magic_cookie_key);
    }

    #[test]
    fn cookie_ok_false_when_env_var_absent() {
        let config = config_with_cookie_key("KV_PLUGIN_TEST_COOKIE_ABSENT");
        env::remove_var(&config.magic_cookie_key);
        assert!(!config.cookie_ok());
    }
}

/// Configuration used by the Plugin Client Runtime when spawning a server (§4.F).
#[derive(Debug, Clone)]
pub struct ClientSpawnConfig {
    /// Path to the server binary, or `None` when reattaching.
    pub server_path: Option<std::path::PathBuf>,
    pub magic_cookie_key: String,
    pub magic_cookie_value: String,
    /// Listener family requested of the spawned server (§3, §4.E).
    pub network: NetworkMode,
    pub tls_mode: TlsMode,
    /// Client's curve preference; `Auto` detects from the server's cert.
    pub curve: Curve,
    pub key_type: KeyType,
    /// Handshake read timeout (§4.B, default 15s).
    pub handshake_timeout: Duration,
    /// Per-RPC call deadline (§5, default 15s).
    pub call_timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL on shutdown.
    pub shutdown_grace: Duration,
    /// `KV_STORAGE_DIR` override passed to the spawned child; `None` lets
    /// the server fall back to its own default (system temp). The harness
    /// sets this per cell so cells never collide on the same directory (§5).
    pub storage_dir: Option<std::path::PathBuf>,
}

impl Default for ClientSpawnConfig {
    fn default() -> Self {
        Self {
            server_path: env::var("PLUGIN_SERVER_PATH").ok().map(std::path::PathBuf::from),
            magic_cookie_key: env::var("PLUGIN_MAGIC_COOKIE_KEY")
                .unwrap_or_else(|_| "BASIC_PLUGIN".to_string()),
            magic_cookie_value: env::var("BASIC_PLUGIN").unwrap_or_else(|_| "hello".to_string()),
            network: NetworkMode::Tcp,
            tls_mode: TlsMode::Auto,
            curve: Curve::Auto,
            key_type: KeyType::Ecdsa,
            handshake_timeout: Duration::from_secs(15),
            call_timeout: Duration::from_secs(15),
            shutdown_grace: Duration::from_secs(5),
            storage_dir: None,
        }
    }
}
