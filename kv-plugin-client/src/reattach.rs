//! Reattach path (§4.F "Reattach path", SPEC_FULL §E).

use kv_plugin_shared::handshake::{parse_line, Handshake, HandshakeAddress};

/// Parse a reattach target: either a bare `host:port` (plaintext, §4.F) or a
/// full handshake line in the §3 wire format.
pub fn parse_reattach_target(target: &str) -> Handshake {
    if target.contains('|') {
        match parse_line(target) {
            Ok(handshake) => return handshake,
            Err(_) => {
                log::warn!("reattach target {target:?} looked like a handshake line but failed to parse; treating as a bare address");
            }
        }
    }

    Handshake {
        core_version: "1".to_string(),
        proto_version: "1".to_string(),
        address: HandshakeAddress::Tcp(target.to_string()),
        protocol: "grpc".to_string(),
        server_cert_der: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_host_port() {
        let handshake = parse_reattach_target("127.0.0.1:9999");
        assert_eq!(
            handshake.address,
            HandshakeAddress::Tcp("127.0.0.1:9999".to_string())
        );
        assert!(handshake.server_cert_der.is_none());
    }

    #[test]
    fn parses_full_handshake_line() {
        let handshake =
            parse_reattach_target("1|1|tcp|127.0.0.1:54321|grpc|AAEC");
        assert_eq!(
            handshake.address,
            HandshakeAddress::Tcp("127.0.0.1:54321".to_string())
        );
        assert!(handshake.server_cert_der.is_some());
    }
}
