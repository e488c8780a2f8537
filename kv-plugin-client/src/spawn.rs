//! Spawn path of the Plugin Client Runtime (§4.F steps 1-5).

use kv_plugin_shared::config::ClientSpawnConfig;
use kv_plugin_shared::crypto::GeneratedCert;
use kv_plugin_shared::error::{ClientError, Result};
use kv_plugin_shared::handshake::{read_handshake, Handshake};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// A spawned child server, its captured stdout reader (already consumed for
/// the handshake line) and stderr, kept around for diagnostics on failure.
pub struct SpawnedServer {
    pub child: Child,
}

/// Validate the server binary and spawn it with the environment the spec
/// requires (§4.F steps 1-4): magic cookie, and the pre-spawn client cert
/// PEM via `PLUGIN_CLIENT_CERT` so the server can build its trust root
/// during TLS_CONFIG.
pub fn spawn_server(
    config: &ClientSpawnConfig,
    pre_spawn_client_cert: &GeneratedCert,
) -> Result<SpawnedServer> {
    let path = config.server_path.as_ref().ok_or_else(|| ClientError::SpawnFailed {
        path: "<unset>".to_string(),
        reason: "PLUGIN_SERVER_PATH / server_path not configured".to_string(),
    })?;

    let metadata = std::fs::metadata(path).map_err(|e| ClientError::SpawnFailed {
        path: path.display().to_string(),
        reason: format!("cannot stat server binary: {e}"),
    })?;
    if !metadata.is_file() {
        return Err(ClientError::SpawnFailed {
            path: path.display().to_string(),
            reason: "not a regular file".to_string(),
        }
        .into());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ClientError::SpawnFailed {
                path: path.display().to_string(),
                reason: "not executable".to_string(),
            }
            .into());
        }
    }

    let mut command = Command::new(path);
    command
        .env(&config.magic_cookie_key, &config.magic_cookie_value)
        .env("PLUGIN_CLIENT_CERT", &pre_spawn_client_cert.cert_pem)
        .env(
            "TLS_MODE",
            match config.tls_mode {
                kv_plugin_shared::config::TlsMode::Disabled => "disabled",
                kv_plugin_shared::config::TlsMode::Manual => "manual",
                kv_plugin_shared::config::TlsMode::Auto => "auto",
            },
        )
        .env(
            "PLUGIN_NETWORK",
            match config.network {
                kv_plugin_shared::config::NetworkMode::Tcp => "tcp",
                kv_plugin_shared::config::NetworkMode::Unix => "unix",
            },
        )
        .env(
            "TLS_KEY_TYPE",
            match config.key_type {
                kv_plugin_shared::config::KeyType::Ecdsa => "ecdsa",
                kv_plugin_shared::config::KeyType::Rsa => "rsa",
            },
        )
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null());

    // In pure `auto` curve mode we deliberately do NOT pass a curve:
    // letting the framework pick lets the client detect curve from the
    // returned handshake (§4.F step 2; the ordering constraint noted in
    // §9). A specific requested curve (e.g. a matrix cell exercising
    // TLS_CURVE=P-384, §4.E "auto with specific curve C") is forwarded so
    // the server actually presents that curve instead of its own default.
    if config.curve != kv_plugin_shared::config::Curve::Auto {
        command.env("TLS_CURVE", config.curve.canonical_name());
    }

    if let Some(storage_dir) = &config.storage_dir {
        command.env("KV_STORAGE_DIR", storage_dir);
    }

    let child = command.spawn().map_err(|e| ClientError::SpawnFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    Ok(SpawnedServer { child })
}

/// Read the handshake line from the spawned child (§4.B). On timeout or
/// malformed input, the child is killed and its captured stderr attached.
pub async fn read_child_handshake(
    spawned: &mut SpawnedServer,
    timeout: std::time::Duration,
) -> Result<Handshake> {
    let stdout = spawned
        .child
        .stdout
        .take()
        .expect("child spawned with piped stdout");
    let mut reader = BufReader::new(stdout);

    match read_handshake(&mut reader, timeout).await {
        Ok(handshake) => Ok(handshake),
        Err(err) => {
            let stderr = drain_stderr(spawned).await;
            let _ = spawned.child.start_kill();
            Err(attach_stderr(err, stderr))
        }
    }
}

async fn drain_stderr(spawned: &mut SpawnedServer) -> String {
    let Some(stderr) = spawned.child.stderr.take() else {
        return String::new();
    };
    let mut reader = BufReader::new(stderr);
    let mut buf = String::new();
    let _ = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        reader.read_to_string(&mut buf),
    )
    .await;
    buf
}

fn attach_stderr(err: kv_plugin_shared::error::Error, stderr: String) -> kv_plugin_shared::error::Error {
    use kv_plugin_shared::error::{Error, HandshakeError};
    match err {
        Error::Handshake(HandshakeError::Timeout { timeout_ms, .. }) => {
            Error::Handshake(HandshakeError::Timeout { timeout_ms, stderr })
        }
        Error::Handshake(HandshakeError::Malformed { line, .. }) => {
            Error::Handshake(HandshakeError::Malformed { line, reason: stderr })
        }
        other => other,
    }
}
