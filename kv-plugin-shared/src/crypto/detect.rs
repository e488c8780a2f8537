use crate::config::Curve;
use crate::error::{CertError, Result};
use x509_parser::prelude::*;

// RFC 5480 named-curve OIDs carried in SubjectPublicKeyInfo algorithm parameters.
const OID_SECP256R1: &str = "1.2.840.10045.3.1.7";
const OID_SECP384R1: &str = "1.3.132.0.34";
const OID_SECP521R1: &str = "1.3.132.0.35";

const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";

/// The key family detected in a certificate's SubjectPublicKeyInfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedKey {
    Ecdsa(Curve),
    Rsa,
}

/// Detect the curve (or RSA) used by a certificate's public key, given its
/// DER encoding (§4.A "Curve detection from an existing certificate").
pub fn detect_curve(cert_der: &[u8]) -> Result<DetectedKey> {
    let (_, cert) = X509Certificate::from_der(cert_der).map_err(|e| CertError::Parse {
        reason: e.to_string(),
    })?;

    let spki = cert.public_key();
    let alg_oid = spki.algorithm.algorithm.to_string();

    if alg_oid == OID_EC_PUBLIC_KEY {
        let params_oid = spki
            .algorithm
            .parameters
            .as_ref()
            .and_then(|p| p.as_oid().ok())
            .map(|oid| oid.to_string());

        return match params_oid.as_deref() {
            Some(OID_SECP256R1) => Ok(DetectedKey::Ecdsa(Curve::P256)),
            Some(OID_SECP384R1) => Ok(DetectedKey::Ecdsa(Curve::P384)),
            Some(OID_SECP521R1) => Ok(DetectedKey::Ecdsa(Curve::P521)),
            other => Err(CertError::UnsupportedCurve {
                curve: other.unwrap_or("unknown").to_string(),
            }
            .into()),
        };
    }

    if alg_oid == OID_RSA_ENCRYPTION {
        return Ok(DetectedKey::Rsa);
    }

    Err(CertError::Parse {
        reason: format!("unrecognized public key algorithm OID {alg_oid}"),
    }
    .into())
}
