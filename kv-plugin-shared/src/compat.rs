//! Static client/server/curve compatibility table (§4.G, SPEC_FULL §E).
//!
//! Consulted up front by the harness matrix builder and by the CLI's
//! `validate connection` pre-flight check, so that known-incompatible cells
//! are skipped or rejected before a dial is even attempted.

use crate::config::Curve;

/// One documented incompatible `(client_impl, server_impl, curve)` triple.
/// `"*"` matches any implementation name.
pub struct IncompatibleEntry {
    pub client_impl: &'static str,
    pub server_impl: &'static str,
    pub curve: Curve,
    pub reason: &'static str,
}

/// The canonical compatibility table. The P-521 ECDSA limitation (rcgen has
/// no P-521 signature algorithm) is the entry every implementation of this
/// runtime hits; it's listed with a wildcard client/server so it applies
/// regardless of which binaries are under test.
pub static COMPATIBILITY_TABLE: &[IncompatibleEntry] = &[IncompatibleEntry {
    client_impl: "*",
    server_impl: "*",
    curve: Curve::P521,
    reason: "rcgen has no P-521 (secp521r1) signature algorithm; client cannot present a matching certificate",
}];

/// Look up whether a given `(client, server, curve)` triple is documented as
/// incompatible. Returns the reason string when it is.
pub fn known_incompatible(client_impl: &str, server_impl: &str, curve: Curve) -> Option<&'static str> {
    COMPATIBILITY_TABLE.iter().find_map(|entry| {
        let client_matches = entry.client_impl == "*" || entry.client_impl == client_impl;
        let server_matches = entry.server_impl == "*" || entry.server_impl == server_impl;
        if client_matches && server_matches && entry.curve == curve {
            Some(entry.reason)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_p521_regardless_of_impl_names() {
        assert!(known_incompatible("rust-client", "go-server", Curve::P521).is_some());
    }

    #[test]
    fn p256_is_not_flagged() {
        assert!(known_incompatible("rust-client", "go-server", Curve::P256).is_none());
    }
}
