//! Plugin Server Runtime: the state machine that owns the server's lifecycle
//! from cookie check through handshake emission to graceful drain (§4.E).

use crate::config::{NetworkMode, ServerEnvConfig, TlsMode};
use crate::crypto;
use crate::error::{HandshakeError, Result};
use crate::grpc::{KvServer, KvService, ServerHandshakeInfo};
use crate::handshake::{format_line, HandshakeAddress};
use crate::storage::KvStore;
use std::io::Write;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};

mod transport;

/// States of the server's lifecycle (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Init,
    CookieCheck,
    Bind,
    TlsConfig,
    HandshakeEmitted,
    Serving,
    Draining,
    Exited,
}

fn transition(state: ServerState) {
    log::info!("plugin server runtime: entering state {state:?}");
}

/// Run a conforming plugin server to completion: cookie check, bind, TLS
/// setup, handshake emission, serve until signalled, drain, exit.
///
/// Returns `Ok(())` on a clean shutdown. A cookie mismatch or bind failure
/// returns an error *before* any handshake line is written, matching §4.E's
/// contract that such failures emit no handshake.
pub async fn run(config: ServerEnvConfig) -> Result<()> {
    transition(ServerState::Init);

    transition(ServerState::CookieCheck);
    if !config.cookie_ok() {
        eprintln!(
            "Magic cookie mismatch: expected env {} to be set",
            config.magic_cookie_key
        );
        return Err(HandshakeError::CookieMismatch {
            stderr: "magic cookie mismatch".to_string(),
        }
        .into());
    }

    transition(ServerState::Bind);
    let (incoming, endpoint) = match config.network {
        NetworkMode::Tcp => transport::bind_tcp().await?,
        NetworkMode::Unix => transport::bind_unix().await?,
    };
    let handshake_address = match config.network {
        NetworkMode::Tcp => HandshakeAddress::Tcp(endpoint.clone()),
        NetworkMode::Unix => HandshakeAddress::Unix(endpoint.clone()),
    };

    transition(ServerState::TlsConfig);
    let (tls_identity, client_ca, tls_curve, server_cert_der, tls_mode_label) =
        configure_tls(&config)?;

    let store = KvStore::open(&config.storage_dir, config.lock_timeout)?;
    let handshake_info = ServerHandshakeInfo {
        endpoint: endpoint.clone(),
        protocol_version: config.protocol_versions.clone(),
        tls_mode: tls_mode_label,
        tls_curve,
        cert_fingerprint: config.plugin_server_cert.clone(),
    };
    let kv_service = KvService::new(store, handshake_info);

    transition(ServerState::HandshakeEmitted);
    emit_handshake(&handshake_address, server_cert_der.as_deref())?;

    transition(ServerState::Serving);

    let mut builder = Server::builder();
    if let Some(identity) = tls_identity {
        let mut tls_config = ServerTlsConfig::new().identity(identity);
        if let Some(client_ca) = client_ca {
            tls_config = tls_config.client_ca_root(client_ca);
        }
        builder = builder.tls_config(tls_config).map_err(|e| {
            crate::error::TlsError::ConfigError {
                reason: e.to_string(),
            }
        })?;
    }

    let shutdown_timeout = config.shutdown_timeout;
    let serve_fut = builder
        .add_service(KvServer::new(kv_service))
        .serve_with_incoming(incoming);
    tokio::pin!(serve_fut);

    tokio::select! {
        result = &mut serve_fut => {
            result.map_err(|e| crate::error::TlsError::HandshakeFailed { reason: e.to_string() })?;
        }
        _ = shutdown_signal() => {
            transition(ServerState::Draining);
            match tokio::time::timeout(shutdown_timeout, &mut serve_fut).await {
                Ok(result) => result.map_err(|e| crate::error::TlsError::HandshakeFailed { reason: e.to_string() })?,
                Err(_) => log::warn!("shutdown grace period elapsed with calls still in flight"),
            }
        }
    }

    if config.network == NetworkMode::Unix {
        transport::remove_socket_file(&endpoint);
    }

    transition(ServerState::Exited);
    Ok(())
}

/// Resolve TLS identity, the client trust root (for full mTLS, §4.E "if env
/// PLUGIN_CLIENT_CERT is set, require and verify client cert"), the curve
/// reported in enrichment, the cert DER to advertise in the handshake line,
/// and a human-readable mode label (§4.E).
fn configure_tls(
    config: &ServerEnvConfig,
) -> Result<(Option<Identity>, Option<Certificate>, Option<String>, Option<Vec<u8>>, String)> {
    match config.tls_mode {
        TlsMode::Disabled => Ok((None, None, None, None, "disabled".to_string())),
        TlsMode::Manual => {
            log::warn!("TLS_MODE=manual is not fully implemented; falling back to AutoMTLS (§9)");
            configure_auto_mtls(config)
        }
        TlsMode::Auto => configure_auto_mtls(config),
    }
}

fn configure_auto_mtls(
    config: &ServerEnvConfig,
) -> Result<(Option<Identity>, Option<Certificate>, Option<String>, Option<Vec<u8>>, String)> {
    use crate::config::{Curve, KeyType};

    if config.tls_key_type == KeyType::Rsa {
        log::warn!("TLS_KEY_TYPE=rsa ignores TLS_CURVE; falling back to AutoMTLS default (§4.E)");
    }

    // The framework's nominal AutoMTLS default is P-521 (§3 "auto" curve
    // sentinel), but rcgen has no P-521 signature algorithm (§9, §4.A). This
    // implementation substitutes P-256 as its concrete default — which also
    // happens to match the client runtime's pre-spawn cert curve
    // (`runtime::generate_pre_spawn_cert`), so the common un-configured case
    // never needs a post-handshake regeneration round. P-521 remains
    // reachable via an explicit `TLS_CURVE=p-521` request, where it hits the
    // documented `CurveIncompatible` path instead (`compat::COMPATIBILITY_TABLE`).
    let curve = if config.tls_key_type == KeyType::Rsa {
        Curve::Auto
    } else if config.tls_curve == Curve::Auto {
        Curve::P256
    } else {
        config.tls_curve
    };

    let cert = crypto::generate(curve, config.tls_key_type, crypto::Role::Server)?;
    let identity = Identity::from_pem(cert.cert_pem.clone(), cert.key_pem.clone());

    let curve_label = match config.tls_key_type {
        KeyType::Rsa => "rsa".to_string(),
        KeyType::Ecdsa => cert.curve.canonical_name().to_string(),
    };

    // Full mTLS (§4.E "if env PLUGIN_CLIENT_CERT is set, require and verify
    // client cert"): whenever the client's pre-spawn cert PEM was handed
    // down, trust it as the sole client CA rather than accepting any peer.
    // This applies for both the canonical auto/auto case and an explicit
    // curve request — RSA is the only key type that skips it, since the
    // client never generates a pre-spawn RSA cert to hand down (§4.A, §9).
    let client_ca = config
        .plugin_client_cert
        .as_ref()
        .filter(|_| config.tls_key_type == KeyType::Ecdsa)
        .map(|pem| Certificate::from_pem(pem));

    Ok((
        Some(identity),
        client_ca,
        Some(curve_label),
        Some(cert.cert_der),
        "auto".to_string(),
    ))
}

fn emit_handshake(address: &HandshakeAddress, server_cert_der: Option<&[u8]>) -> Result<()> {
    let line = format_line(address, server_cert_der);
    let mut stdout = std::io::stdout();
    stdout.write_all(line.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Wait for SIGINT/SIGTERM (§4.E "SERVING: ... until SIGINT/SIGTERM received
/// or parent closes stdin").
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests;
