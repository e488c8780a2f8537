use super::*;

#[test]
fn formats_tcp_line_with_cert() {
    let addr = HandshakeAddress::Tcp("127.0.0.1:54321".to_string());
    let line = format_line(&addr, Some(&[1, 2, 3, 4, 5]));
    assert!(line.starts_with("1|1|tcp|127.0.0.1:54321|grpc|"));
    assert!(line.ends_with('\n'));
    assert!(!line.trim_end().ends_with('='));
}

#[test]
fn formats_unix_line_without_cert() {
    let addr = HandshakeAddress::Unix("/tmp/plugin.sock".to_string());
    let line = format_line(&addr, None);
    assert_eq!(line, "1|1|unix|/tmp/plugin.sock|grpc\n");
}

#[test]
fn round_trips_tcp_with_cert() {
    let addr = HandshakeAddress::Tcp("127.0.0.1:54321".to_string());
    let cert_bytes = b"some der bytes, arbitrary length!!";
    let line = format_line(&addr, Some(cert_bytes));
    let parsed = parse_line(&line).expect("should parse");
    assert_eq!(parsed.address, addr);
    assert_eq!(parsed.server_cert_der.as_deref(), Some(cert_bytes.as_slice()));
}

#[test]
fn parses_unix_line_from_spec_example() {
    let parsed = parse_line("1|1|unix|/tmp/plugin.sock|grpc\n").expect("should parse");
    assert_eq!(
        parsed.address,
        HandshakeAddress::Unix("/tmp/plugin.sock".to_string())
    );
    assert!(parsed.server_cert_der.is_none());
}

#[test]
fn tolerates_trailing_empty_field() {
    let parsed = parse_line("1|1|tcp|127.0.0.1:1234|grpc|\n").expect("should parse");
    assert!(parsed.server_cert_der.is_none());
}

#[test]
fn rejects_malformed_line() {
    let result = parse_line("xyz\n");
    assert!(matches!(
        result,
        Err(crate::error::Error::Handshake(HandshakeError::Malformed { .. }))
    ));
}

#[test]
fn rejects_unsupported_core_version() {
    let result = parse_line("2|1|tcp|127.0.0.1:1234|grpc\n");
    assert!(matches!(
        result,
        Err(crate::error::Error::Handshake(
            HandshakeError::ProtocolUnsupported { .. }
        ))
    ));
}

#[tokio::test]
async fn read_handshake_times_out_on_silent_child() {
    let (_tx, rx) = tokio::io::duplex(64);
    let mut reader = tokio::io::BufReader::new(rx);
    let result = read_handshake(&mut reader, std::time::Duration::from_millis(50)).await;
    assert!(matches!(
        result,
        Err(crate::error::Error::Handshake(HandshakeError::Timeout { .. }))
    ));
}

#[tokio::test]
async fn read_handshake_parses_emitted_line() {
    let (mut tx, rx) = tokio::io::duplex(256);
    let mut reader = tokio::io::BufReader::new(rx);
    let addr = HandshakeAddress::Tcp("127.0.0.1:9999".to_string());
    let line = format_line(&addr, None);

    use tokio::io::AsyncWriteExt;
    tx.write_all(line.as_bytes()).await.unwrap();

    let parsed = read_handshake(&mut reader, std::time::Duration::from_secs(1))
        .await
        .expect("should parse emitted line");
    assert_eq!(parsed.address, addr);
}
