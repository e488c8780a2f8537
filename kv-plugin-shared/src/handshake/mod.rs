//! Handshake Codec: emit/parse the single-line plugin handshake (§3, §4.B).

use crate::error::{HandshakeError, Result};
use base64::Engine;

const CORE_VERSION: &str = "1";
const PROTO_VERSION: &str = "1";
const PROTOCOL: &str = "grpc";

/// The address a handshake line advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeAddress {
    Tcp(String),
    Unix(String),
}

impl HandshakeAddress {
    pub fn as_str(&self) -> &str {
        match self {
            HandshakeAddress::Tcp(a) => a,
            HandshakeAddress::Unix(a) => a,
        }
    }

    fn network_token(&self) -> &'static str {
        match self {
            HandshakeAddress::Tcp(_) => "tcp",
            HandshakeAddress::Unix(_) => "unix",
        }
    }
}

/// A parsed (or about-to-be-emitted) handshake line.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub core_version: String,
    pub proto_version: String,
    pub address: HandshakeAddress,
    pub protocol: String,
    /// DER-encoded leaf certificate, when the server advertised one.
    pub server_cert_der: Option<Vec<u8>>,
}

/// Format the handshake line per §3, including the trailing `\n`.
///
/// The optional sixth field is the base64-standard encoding of the server's
/// leaf certificate DER with trailing `=` padding stripped.
pub fn format_line(address: &HandshakeAddress, server_cert_der: Option<&[u8]>) -> String {
    let mut line = format!(
        "{CORE_VERSION}|{PROTO_VERSION}|{}|{}|{PROTOCOL}",
        address.network_token(),
        address.as_str()
    );
    if let Some(der) = server_cert_der {
        let encoded = base64::engine::general_purpose::STANDARD.encode(der);
        line.push('|');
        line.push_str(encoded.trim_end_matches('='));
    }
    line.push('\n');
    line
}

/// Parse a single handshake line (without its trailing newline, though a
/// trailing `\n` or `\r\n` is tolerated and stripped).
///
/// Clients must accept both tcp and unix forms and tolerate an optional
/// trailing empty field (§6).
pub fn parse_line(line: &str) -> Result<Handshake> {
    let trimmed = line.trim_end_matches(['\n', '\r']);
    let mut fields: Vec<&str> = trimmed.split('|').collect();

    // Tolerate a trailing empty field produced by some emitters.
    if fields.last() == Some(&"") {
        fields.pop();
    }

    if fields.len() < 5 {
        return Err(HandshakeError::Malformed {
            line: trimmed.to_string(),
            reason: format!("expected at least 5 fields, got {}", fields.len()),
        }
        .into());
    }

    let core_version = fields[0].to_string();
    let proto_version = fields[1].to_string();
    let network = fields[2];
    let address = fields[3];
    let protocol = fields[4].to_string();

    if core_version != CORE_VERSION || protocol != PROTOCOL {
        return Err(HandshakeError::ProtocolUnsupported {
            core_version,
            protocol,
        }
        .into());
    }

    let address = match network {
        "tcp" => HandshakeAddress::Tcp(address.to_string()),
        "unix" => HandshakeAddress::Unix(address.to_string()),
        other => {
            return Err(HandshakeError::Malformed {
                line: trimmed.to_string(),
                reason: format!("unknown network {other:?}"),
            }
            .into())
        }
    };

    let server_cert_der = match fields.get(5) {
        Some(field) if !field.is_empty() => Some(decode_cert_field(field)?),
        _ => None,
    };

    Ok(Handshake {
        core_version,
        proto_version,
        address,
        protocol,
        server_cert_der,
    })
}

fn decode_cert_field(field: &str) -> Result<Vec<u8>> {
    let mut padded = field.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    base64::engine::general_purpose::STANDARD
        .decode(&padded)
        .map_err(|e| {
            HandshakeError::Malformed {
                line: field.to_string(),
                reason: format!("invalid base64 certificate field: {e}"),
            }
            .into()
        })
}

/// Read and parse one handshake line from an async reader within `timeout`
/// (§4.B: "read one line from the child's stdout within a bounded timeout").
pub async fn read_handshake<R>(reader: &mut R, timeout: std::time::Duration) -> Result<Handshake>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    use tokio::io::AsyncBufReadExt;

    let mut line = String::new();
    let read = tokio::time::timeout(timeout, reader.read_line(&mut line)).await;

    match read {
        Err(_) => Err(HandshakeError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
            stderr: String::new(),
        }
        .into()),
        Ok(Err(io_err)) => Err(io_err.into()),
        Ok(Ok(0)) => Err(HandshakeError::Malformed {
            line: String::new(),
            reason: "child closed stdout before emitting a handshake line".to_string(),
        }
        .into()),
        Ok(Ok(_)) => parse_line(&line),
    }
}

#[cfg(test)]
mod tests;
