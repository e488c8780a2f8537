//! Curve matching and mTLS channel construction (§4.F steps 6-7).

use kv_plugin_shared::config::Curve;
use kv_plugin_shared::crypto::{self, DetectedKey, GeneratedCert};
use kv_plugin_shared::error::{Result, TlsError};
use kv_plugin_shared::handshake::{Handshake, HandshakeAddress};
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity, Uri};
use tower::service_fn;

/// The runtime identity reported in `CurveIncompatible` diagnostics; this
/// implementation's ECDSA cert generation is backed by `rcgen`, which has no
/// P-521 signature algorithm (§9).
const RUNTIME_ID: &str = "kv-plugin-client-rs (rcgen)";

/// Outcome of dialing: a ready channel plus the curve/TLS facts the caller
/// needs for manifests and `validate connection` diagnostics.
pub struct DialOutcome {
    pub channel: Channel,
    pub tls_mode: &'static str,
    pub negotiated_curve: Option<String>,
}

/// Given a parsed handshake and the client's pre-spawn certificate, pick a
/// matching client cert (regenerating on curve mismatch in `auto` mode) and
/// dial the advertised address.
pub async fn dial(
    handshake: &Handshake,
    pre_spawn_client_cert: &GeneratedCert,
    client_curve_preference: Curve,
) -> Result<DialOutcome> {
    let Some(server_cert_der) = handshake.server_cert_der.as_ref() else {
        let channel = connect_plaintext(&handshake.address).await?;
        return Ok(DialOutcome {
            channel,
            tls_mode: "disabled",
            negotiated_curve: None,
        });
    };

    let detected = crypto::detect_curve(server_cert_der)?;

    let client_cert = match (detected, client_curve_preference) {
        (DetectedKey::Ecdsa(server_curve), Curve::Auto) if server_curve == pre_spawn_client_cert.curve => {
            // Lucky path: the pre-spawn cert already matches.
            None
        }
        (DetectedKey::Ecdsa(Curve::P521), _) => {
            return Err(TlsError::CurveIncompatible {
                server_curve: Curve::P521.canonical_name().to_string(),
                client_runtime: RUNTIME_ID.to_string(),
            }
            .into());
        }
        (DetectedKey::Ecdsa(server_curve), Curve::Auto) => {
            // Regenerate the client cert on the matching curve (§4.F step 6,
            // §9 bootstrapping note).
            Some(crypto::generate(
                server_curve,
                kv_plugin_shared::config::KeyType::Ecdsa,
                crypto::Role::Client,
            )?)
        }
        (DetectedKey::Rsa, _) => None,
        (DetectedKey::Ecdsa(_), _) => None,
    };

    let client_cert = client_cert.as_ref().unwrap_or(pre_spawn_client_cert);

    let server_pem = pem_from_der(server_cert_der)?;
    let domain = preferred_server_name(&handshake.address);

    let tls_config = ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(server_pem))
        .identity(Identity::from_pem(
            client_cert.cert_pem.clone(),
            client_cert.key_pem.clone(),
        ))
        .domain_name(domain);

    let endpoint = Endpoint::from_shared(endpoint_uri(&handshake.address))
        .map_err(|e| TlsError::ConfigError {
            reason: e.to_string(),
        })?
        .tls_config(tls_config)
        .map_err(|e| TlsError::ConfigError {
            reason: e.to_string(),
        })?;

    let channel = connect_endpoint(endpoint, &handshake.address).await?;

    let negotiated_curve = match detected {
        DetectedKey::Ecdsa(c) => Some(c.canonical_name().to_string()),
        DetectedKey::Rsa => Some("rsa".to_string()),
    };

    Ok(DialOutcome {
        channel,
        tls_mode: "auto",
        negotiated_curve,
    })
}

async fn connect_plaintext(address: &HandshakeAddress) -> Result<Channel> {
    let endpoint = Endpoint::from_shared(endpoint_uri(address)).map_err(|e| TlsError::ConfigError {
        reason: e.to_string(),
    })?;
    connect_endpoint(endpoint, address).await
}

/// Dial `endpoint`, routing unix-socket addresses through a custom connector
/// since tonic's default connector only understands TCP (teacher precedent:
/// `transport_channel.rs`'s `tower::service_fn` connector for its VSOCK leg).
async fn connect_endpoint(endpoint: Endpoint, address: &HandshakeAddress) -> Result<Channel> {
    match address {
        HandshakeAddress::Tcp(_) => endpoint.connect().await.map_err(|e| {
            TlsError::HandshakeFailed {
                reason: e.to_string(),
            }
            .into()
        }),
        HandshakeAddress::Unix(path) => {
            let path = path.clone();
            let connector = service_fn(move |_: Uri| {
                let path = path.clone();
                async move { tokio::net::UnixStream::connect(path).await }
            });
            endpoint
                .connect_with_connector(connector)
                .await
                .map_err(|e| {
                    TlsError::HandshakeFailed {
                        reason: e.to_string(),
                    }
                    .into()
                })
        }
    }
}

/// tonic's `Endpoint` always needs a syntactically valid URI, even for unix
/// sockets where the actual path is threaded through the custom connector
/// in [`connect_endpoint`] instead of the URI itself.
fn endpoint_uri(address: &HandshakeAddress) -> String {
    match address {
        HandshakeAddress::Tcp(addr) => format!("http://{addr}"),
        HandshakeAddress::Unix(_) => "http://[::]:50051".to_string(),
    }
}

/// Prefer `localhost` when the address is `127.0.0.1`, because the emitted
/// cert's SAN is a DNS name, not an IP (§4.F step 6).
fn preferred_server_name(address: &HandshakeAddress) -> String {
    match address {
        HandshakeAddress::Tcp(addr) => {
            if addr.starts_with("127.0.0.1") || addr.starts_with("[::1]") {
                "localhost".to_string()
            } else {
                addr.split(':').next().unwrap_or("localhost").to_string()
            }
        }
        HandshakeAddress::Unix(_) => "localhost".to_string(),
    }
}

fn pem_from_der(der: &[u8]) -> Result<String> {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(der);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(chunk).unwrap());
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    Ok(pem)
}
