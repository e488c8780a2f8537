//! Conformance Harness (§4.G): matrix construction, cell execution, and the
//! proof manifests that serve as the suite's authoritative test result.
//!
//! This crate treats server binaries as black boxes the way §4.G requires:
//! a cell only ever talks to a server through the Plugin Client Runtime
//! (`kv-plugin-client`), the same path any conforming client uses. Running
//! it against binaries from other language implementations — the "polyglot
//! matrix" §1 describes — is a matter of pointing `--server name=path` at
//! them; the harness itself has no Rust-specific assumptions about the far
//! side of the handshake.

pub mod manifest;
pub mod matrix;
pub mod runner;

pub use manifest::{ManifestStatus, ProofManifest};
pub use matrix::{build_matrix, MatrixCell, ServerBinary, SkippedCell};
pub use runner::{run_cell, CellResult};
