//! Matrix construction: {client_impl} x {server_impl} x {tls_mode} x {curve}
//! x {key_type}, skipping documented-incompatible cells (§4.G).

use kv_plugin_shared::compat::known_incompatible;
use kv_plugin_shared::config::{Curve, KeyType, TlsMode};
use std::path::PathBuf;

/// A server binary under test, identified by the name reported in manifests
/// (e.g. `"go-server"`, `"kv-plugin-server-rs"`).
#[derive(Debug, Clone)]
pub struct ServerBinary {
    pub name: String,
    pub path: PathBuf,
}

/// One cell of the conformance matrix, fully resolved and ready to run.
#[derive(Debug, Clone)]
pub struct MatrixCell {
    pub client_impl: String,
    pub server_impl: String,
    pub server_path: PathBuf,
    pub tls_mode: TlsMode,
    pub curve: Curve,
    pub key_type: KeyType,
}

/// A cell the compatibility table ruled out before any subprocess was spawned.
#[derive(Debug, Clone)]
pub struct SkippedCell {
    pub client_impl: String,
    pub server_impl: String,
    pub curve: Curve,
    pub reason: String,
}

/// Build the full matrix against every server binary, skipping cells the
/// static compatibility table documents as incompatible (§4.G step 1's
/// "skipping documented-incompatible cells").
pub fn build_matrix(
    client_impl: &str,
    servers: &[ServerBinary],
    tls_modes: &[TlsMode],
    curves: &[Curve],
    key_types: &[KeyType],
) -> (Vec<MatrixCell>, Vec<SkippedCell>) {
    let mut cells = Vec::new();
    let mut skipped = Vec::new();

    for server in servers {
        for &tls_mode in tls_modes {
            for &curve in curves {
                for &key_type in key_types {
                    if tls_mode == TlsMode::Disabled && curve != Curve::Auto {
                        // Plaintext has no curve to negotiate; only the
                        // canonical `auto` cell is meaningful here.
                        continue;
                    }
                    if key_type == KeyType::Rsa && curve != Curve::Auto {
                        // RSA key size is fixed and TLS_CURVE is ignored
                        // server-side (§4.E, §9); only the canonical `auto`
                        // cell is meaningful, the rest would just be
                        // duplicates of it.
                        continue;
                    }
                    if key_type == KeyType::Ecdsa {
                        if let Some(reason) = known_incompatible(client_impl, &server.name, curve) {
                            skipped.push(SkippedCell {
                                client_impl: client_impl.to_string(),
                                server_impl: server.name.clone(),
                                curve,
                                reason: reason.to_string(),
                            });
                            continue;
                        }
                    }
                    cells.push(MatrixCell {
                        client_impl: client_impl.to_string(),
                        server_impl: server.name.clone(),
                        server_path: server.path.clone(),
                        tls_mode,
                        curve,
                        key_type,
                    });
                }
            }
        }
    }

    (cells, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str) -> ServerBinary {
        ServerBinary {
            name: name.to_string(),
            path: PathBuf::from(format!("/bin/{name}")),
        }
    }

    #[test]
    fn skips_p521_cells_via_compat_table() {
        let (cells, skipped) = build_matrix(
            "rust-client",
            &[server("go-server")],
            &[TlsMode::Auto],
            &[Curve::P256, Curve::P521],
            &[KeyType::Ecdsa],
        );
        assert!(cells.iter().all(|c| c.curve != Curve::P521));
        assert!(skipped.iter().any(|s| s.curve == Curve::P521));
    }

    #[test]
    fn disabled_tls_collapses_curve_dimension() {
        let (cells, _skipped) = build_matrix(
            "rust-client",
            &[server("go-server")],
            &[TlsMode::Disabled],
            &[Curve::P256, Curve::P384, Curve::Auto],
            &[KeyType::Ecdsa],
        );
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].curve, Curve::Auto);
    }

    #[test]
    fn one_cell_per_server_tls_curve_ecdsa_combination() {
        let (cells, _skipped) = build_matrix(
            "rust-client",
            &[server("go-server"), server("python-server")],
            &[TlsMode::Auto],
            &[Curve::P256, Curve::P384],
            &[KeyType::Ecdsa],
        );
        assert_eq!(cells.len(), 2 * 2);
    }

    #[test]
    fn rsa_collapses_curve_dimension() {
        let (cells, _skipped) = build_matrix(
            "rust-client",
            &[server("go-server")],
            &[TlsMode::Auto],
            &[Curve::P256, Curve::P384, Curve::Auto],
            &[KeyType::Rsa],
        );
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].curve, Curve::Auto);
    }
}
