//! Error types shared by the plugin server and client runtimes.
//!
//! Categories follow the taxonomy of the handshake/TLS/storage contract:
//! handshake negotiation, certificate generation, TLS compatibility, and
//! file-backed storage each get their own sub-enum, wrapped by one
//! top-level [`Error`].

use thiserror::Error;

/// Top-level error type for the plugin core.
#[derive(Error, Debug)]
pub enum Error {
    /// Handshake line negotiation failures.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Certificate generation / parsing failures.
    #[error("certificate error: {0}")]
    Cert(#[from] CertError),

    /// TLS configuration / compatibility failures.
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// KV storage engine failures.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Plugin client spawn/reattach failures.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// gRPC transport-level errors surfaced from tonic.
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handshake codec errors (§4.B).
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// No handshake line arrived before the read deadline.
    #[error("handshake timed out after {timeout_ms}ms: {stderr}")]
    Timeout { timeout_ms: u64, stderr: String },

    /// The line could not be split into the expected fields.
    #[error("malformed handshake line {line:?}: {reason}")]
    Malformed { line: String, reason: String },

    /// `core_version` or `protocol` did not match what we support.
    #[error("unsupported protocol: core_version={core_version}, protocol={protocol}")]
    ProtocolUnsupported { core_version: String, protocol: String },

    /// The server exited before any handshake line was observed.
    #[error("magic cookie rejected by server: {stderr}")]
    CookieMismatch { stderr: String },
}

/// Cert Factory errors (§4.A).
#[derive(Error, Debug)]
pub enum CertError {
    /// Requested curve name isn't one of the supported three.
    #[error("unsupported curve: {curve}")]
    UnsupportedCurve { curve: String },

    /// rcgen failed to produce a certificate.
    #[error("certificate generation failed: {reason}")]
    Generation { reason: String },

    /// A DER blob couldn't be parsed as an X.509 certificate.
    #[error("certificate parse failed: {reason}")]
    Parse { reason: String },
}

/// TLS-layer errors (§4.E / §4.F).
#[derive(Error, Debug)]
pub enum TlsError {
    /// Client cannot match the curve the server advertised.
    #[error("curve incompatible: server advertised {server_curve}, client {client_runtime} cannot present a matching certificate")]
    CurveIncompatible {
        server_curve: String,
        client_runtime: String,
    },

    /// The mTLS handshake itself failed once dialed.
    #[error("TLS handshake failed: {reason}")]
    HandshakeFailed { reason: String },

    /// Bad TLS configuration (e.g. missing cert/key file in manual mode).
    #[error("TLS configuration error: {reason}")]
    ConfigError { reason: String },
}

/// KV Storage Engine errors (§4.C).
#[derive(Error, Debug)]
pub enum StorageError {
    /// A key was never written (or was deleted by an external process).
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// The bounded wait for a per-key file lock expired.
    #[error("lock timeout on key {key} after {timeout_ms}ms")]
    LockTimeout { key: String, timeout_ms: u64 },

    /// The key can't be used as a filesystem path fragment.
    #[error("key {key:?} is not a valid filename: {reason}")]
    FilesystemConstraint { key: String, reason: String },

    /// Any other I/O failure while reading/writing a KV file.
    #[error("I/O error on key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Plugin Client Runtime errors (§4.F).
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server binary doesn't exist, isn't a file, or isn't executable.
    #[error("cannot spawn server binary {path}: {reason}")]
    SpawnFailed { path: String, reason: String },

    /// A reattach address/handshake-line string couldn't be parsed or dialed.
    #[error("cannot reattach to {target}: {reason}")]
    ReattachFailed { target: String, reason: String },
}

/// Result type alias used throughout the plugin core.
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        // Enrichment failures are handled inline at the call site (§4.D);
        // this conversion only fires for genuinely unexpected (de)serialization
        // errors surfaced elsewhere, e.g. proof manifest writing.
        Error::Storage(StorageError::Io {
            key: "<json>".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        })
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Handshake(HandshakeError::Timeout {
            timeout_ms: 0,
            stderr: String::new(),
        })
    }
}
