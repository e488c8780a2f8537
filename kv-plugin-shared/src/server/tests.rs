use super::*;
use crate::config::{Curve, KeyType, NetworkMode, ServerEnvConfig};
use std::time::Duration;

fn base_config() -> ServerEnvConfig {
    ServerEnvConfig {
        magic_cookie_key: "BASIC_PLUGIN".to_string(),
        magic_cookie_value: "hello".to_string(),
        storage_dir: std::env::temp_dir(),
        network: NetworkMode::Tcp,
        tls_mode: TlsMode::Auto,
        tls_curve: Curve::P256,
        tls_key_type: KeyType::Ecdsa,
        plugin_client_cert: None,
        plugin_server_cert: None,
        log_level: "info".to_string(),
        protocol_versions: "1".to_string(),
        lock_timeout: Duration::from_secs(1),
        shutdown_timeout: Duration::from_secs(1),
    }
}

#[test]
fn auto_mtls_ecdsa_reports_requested_curve() {
    let config = base_config();
    let (identity, client_ca, curve, cert_der, mode) = configure_tls(&config).expect("tls config");
    assert!(identity.is_some());
    assert!(client_ca.is_none());
    assert_eq!(curve.as_deref(), Some("P-256"));
    assert!(cert_der.is_some());
    assert_eq!(mode, "auto");
}

#[test]
fn disabled_mode_has_no_identity() {
    let mut config = base_config();
    config.tls_mode = TlsMode::Disabled;
    let (identity, client_ca, curve, cert_der, mode) = configure_tls(&config).expect("tls config");
    assert!(identity.is_none());
    assert!(client_ca.is_none());
    assert!(curve.is_none());
    assert!(cert_der.is_none());
    assert_eq!(mode, "disabled");
}

#[test]
fn manual_mode_falls_back_to_auto_mtls() {
    let mut config = base_config();
    config.tls_mode = TlsMode::Manual;
    let (identity, _client_ca, _curve, _cert_der, mode) = configure_tls(&config).expect("tls config");
    assert!(identity.is_some());
    assert_eq!(mode, "auto");
}

#[test]
fn rsa_ignores_requested_curve_and_warns() {
    let mut config = base_config();
    config.tls_key_type = KeyType::Rsa;
    config.tls_curve = Curve::P256;
    let (identity, _client_ca, curve, _cert_der, mode) = configure_tls(&config).expect("tls config");
    assert!(identity.is_some());
    assert_eq!(curve.as_deref(), Some("rsa"));
    assert_eq!(mode, "auto");
}

#[test]
fn client_cert_with_specific_curve_sets_client_ca() {
    let mut config = base_config();
    config.plugin_client_cert = Some(sample_client_cert_pem());
    let (identity, client_ca, _curve, _cert_der, _mode) = configure_tls(&config).expect("tls config");
    assert!(identity.is_some());
    assert!(client_ca.is_some());
}

#[test]
fn client_cert_sets_client_ca_in_canonical_auto_auto_case() {
    let mut config = base_config();
    config.tls_curve = Curve::Auto;
    config.plugin_client_cert = Some(sample_client_cert_pem());
    let (_identity, client_ca, _curve, _cert_der, _mode) = configure_tls(&config).expect("tls config");
    // §4.E: full mTLS is built whenever PLUGIN_CLIENT_CERT is present, including
    // the canonical auto/auto case — not just an explicit curve request.
    assert!(client_ca.is_some());
}

#[test]
fn client_cert_is_ignored_for_rsa() {
    let mut config = base_config();
    config.tls_key_type = KeyType::Rsa;
    config.plugin_client_cert = Some(sample_client_cert_pem());
    let (_identity, client_ca, _curve, _cert_der, _mode) = configure_tls(&config).expect("tls config");
    // The client never hands down a pre-spawn RSA cert, so there is nothing
    // to trust as a client CA here (§4.A, §9).
    assert!(client_ca.is_none());
}

fn sample_client_cert_pem() -> String {
    crate::crypto::generate(Curve::P256, KeyType::Ecdsa, crate::crypto::Role::Client)
        .expect("generate sample cert")
        .cert_pem
}

#[tokio::test]
async fn cookie_mismatch_fails_before_any_bind() {
    let mut config = base_config();
    config.magic_cookie_value = "does-not-match-actual-env".to_string();
    let err = run(config).await.unwrap_err();
    assert!(matches!(
        err,
        crate::error::Error::Handshake(HandshakeError::CookieMismatch { .. })
    ));
}
