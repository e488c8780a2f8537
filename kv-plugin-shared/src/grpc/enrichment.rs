//! JSON enrichment applied to `Put` payloads (§3 "Enriched JSON", §4.D).

use serde_json::{json, Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Context injected into a `server_handshake` record at Put time.
#[derive(Debug, Clone)]
pub struct EnrichmentContext {
    pub endpoint: String,
    pub protocol_version: String,
    pub tls_mode: String,
    /// e.g. `{"curve": "P-256"}` when TLS is active; omitted otherwise.
    pub tls_config: Option<Value>,
    pub cert_fingerprint: Option<String>,
    /// Seconds since the server process started.
    pub received_at: u64,
}

/// Attempt the enrichment policy: if `value` parses as a JSON object, inject
/// `server_handshake` and re-serialize; otherwise return `value` unchanged.
///
/// Never fails the caller: any serialization error falls back to the
/// original bytes (§4.D).
pub fn enrich(value: &[u8], ctx: &EnrichmentContext) -> Vec<u8> {
    let Ok(parsed) = serde_json::from_slice::<Value>(value) else {
        return value.to_vec();
    };

    let Value::Object(mut map) = parsed else {
        return value.to_vec();
    };

    let handshake = build_handshake_record(ctx);
    map.insert("server_handshake".to_string(), handshake);

    match serde_json::to_vec(&Value::Object(map)) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("enrichment failed, storing original bytes: {e}");
            value.to_vec()
        }
    }
}

fn build_handshake_record(ctx: &EnrichmentContext) -> Value {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut record = Map::new();
    record.insert("endpoint".to_string(), json!(ctx.endpoint));
    record.insert("protocol_version".to_string(), json!(ctx.protocol_version));
    record.insert("tls_mode".to_string(), json!(ctx.tls_mode));
    if let Some(tls_config) = &ctx.tls_config {
        record.insert("tls_config".to_string(), tls_config.clone());
    }
    if let Some(fingerprint) = &ctx.cert_fingerprint {
        record.insert("cert_fingerprint".to_string(), json!(fingerprint));
    }
    record.insert("timestamp".to_string(), json!(timestamp));
    record.insert("received_at".to_string(), json!(ctx.received_at));

    Value::Object(record)
}

#[cfg(test)]
mod enrichment_tests {
    use super::*;

    fn ctx() -> EnrichmentContext {
        EnrichmentContext {
            endpoint: "127.0.0.1:54321".to_string(),
            protocol_version: "1".to_string(),
            tls_mode: "auto".to_string(),
            tls_config: Some(json!({"curve": "P-256"})),
            cert_fingerprint: Some("deadbeef".to_string()),
            received_at: 42,
        }
    }

    #[test]
    fn enriches_json_object() {
        let input = br#"{"test":"ecdsa","user_data":{"n":1}}"#;
        let out = enrich(input, &ctx());
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["test"], "ecdsa");
        assert_eq!(parsed["user_data"]["n"], 1);
        assert_eq!(parsed["server_handshake"]["tls_mode"], "auto");
        assert_eq!(parsed["server_handshake"]["received_at"], 42);
    }

    #[test]
    fn leaves_non_object_json_unchanged() {
        let input = br#"[1,2,3]"#;
        let out = enrich(input, &ctx());
        assert_eq!(out, input);
    }

    #[test]
    fn leaves_non_json_bytes_unchanged() {
        let input: &[u8] = &[0x01, 0x02, 0x03];
        let out = enrich(input, &ctx());
        assert_eq!(out, input);
    }

    #[test]
    fn leaves_empty_bytes_unchanged() {
        let input: &[u8] = &[];
        let out = enrich(input, &ctx());
        assert_eq!(out, input);
    }
}
