use crate::config::{Curve, KeyType};
use crate::error::{CertError, Result};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384, PKCS_RSA_SHA256,
};
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// Which peer a generated certificate identifies (§3 "`<system>.rpc.server|client`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    fn common_name(&self) -> &'static str {
        match self {
            Role::Server => "kv-plugin.rpc.server",
            Role::Client => "kv-plugin.rpc.client",
        }
    }
}

/// A generated ephemeral certificate/key pair and the curve it was issued on.
pub struct GeneratedCert {
    /// DER encoding of the self-signed leaf certificate.
    pub cert_der: Vec<u8>,
    /// PEM encoding of the same certificate.
    pub cert_pem: String,
    /// PEM encoding of the matching private key.
    pub key_pem: String,
    pub curve: Curve,
    pub key_type: KeyType,
}

/// Generate a self-signed cert for the given curve (ECDSA) or RSA-2048 (§4.A).
///
/// `curve` is ignored when `key_type == KeyType::Rsa` — RSA key size is fixed
/// at 2048 bits, matching the `rsa_bits` contract in §4.A's signature, kept
/// to a single size since the spec's RSA scenarios never vary it. `role`
/// selects the CommonName (`kv-plugin.rpc.server` or `.client`, §3).
pub fn generate(curve: Curve, key_type: KeyType, role: Role) -> Result<GeneratedCert> {
    let (key_pair, resolved_curve) = match key_type {
        KeyType::Rsa => (generate_rsa_keypair()?, Curve::Auto),
        KeyType::Ecdsa => {
            let c = if curve == Curve::Auto { Curve::P521 } else { curve };
            (generate_ecdsa_keypair(c)?, c)
        }
    };

    let mut params = CertificateParams::default();
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, role.common_name());
    params.distinguished_name = dn;

    params.not_before = time::OffsetDateTime::now_utc();
    params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(365);

    params.subject_alt_names = vec![
        rcgen::SanType::DnsName("localhost".try_into().map_err(|e| {
            CertError::Generation {
                reason: format!("invalid DNS SAN: {e:?}"),
            }
        })?),
        rcgen::SanType::IpAddress(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
        rcgen::SanType::IpAddress(IpAddr::V6(Ipv6Addr::LOCALHOST)),
    ];

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertError::Generation {
            reason: e.to_string(),
        })?;

    let cert_der = cert.der().to_vec();
    let cert_pem = cert.pem();
    let key_pem = key_pair.serialize_pem();

    Ok(GeneratedCert {
        cert_der,
        cert_pem,
        key_pem,
        curve: resolved_curve,
        key_type,
    })
}

fn generate_ecdsa_keypair(curve: Curve) -> Result<KeyPair> {
    let alg = match curve {
        Curve::P256 => &PKCS_ECDSA_P256_SHA256,
        Curve::P384 => &PKCS_ECDSA_P384_SHA384,
        Curve::P521 | Curve::Auto => {
            // rcgen has no P-521 signature algorithm: this is the real
            // mechanism behind the spec's CurveIncompatible scenario (§9).
            return Err(CertError::UnsupportedCurve {
                curve: curve.canonical_name().to_string(),
            }
            .into());
        }
    };
    KeyPair::generate_for(alg).map_err(|e| {
        CertError::Generation {
            reason: e.to_string(),
        }
        .into()
    })
}

fn generate_rsa_keypair() -> Result<KeyPair> {
    let mut rng = rand::rngs::OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, 2048).map_err(|e| CertError::Generation {
        reason: format!("RSA key generation failed: {e}"),
    })?;
    let der = private_key
        .to_pkcs8_der()
        .map_err(|e| CertError::Generation {
            reason: format!("RSA key PKCS#8 encoding failed: {e}"),
        })?;
    KeyPair::from_pkcs8_der_and_sign_algo(&der.as_bytes().into(), &PKCS_RSA_SHA256).map_err(|e| {
        CertError::Generation {
            reason: e.to_string(),
        }
        .into()
    })
}

/// Default lock/handshake-adjacent timeout, re-exported for callers that
/// just want "the Cert Factory default" without importing `config`.
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(365 * 24 * 3600);
