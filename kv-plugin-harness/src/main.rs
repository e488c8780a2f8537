//! Conformance Harness binary (§4.G): build the matrix against one or more
//! server binaries, run every cell, write proof manifests, and print a
//! summary. A matrix cell passes iff its manifest lands with `status =
//! success`; this binary's exit code reflects that across the whole run.

use clap::Parser;
use kv_plugin_harness::{build_matrix, run_cell, ManifestStatus, ServerBinary};
use kv_plugin_shared::config::{Curve, KeyType, TlsMode};
use std::path::PathBuf;

/// Runs the {client} x {server} x {tls_mode} x {curve} x {key_type} matrix
/// against one or more conforming plugin server binaries.
#[derive(Parser, Debug)]
#[command(name = "kv-plugin-harness")]
#[command(about = "Conformance Harness: run the matrix, write proof manifests")]
struct Args {
    /// A server binary under test, as `name=path`. May be repeated to build
    /// a true polyglot matrix across several implementations.
    #[arg(long = "server", required = true)]
    servers: Vec<String>,

    /// Directory proof manifests are written to (§6 "Proof manifest layout").
    #[arg(long, default_value = "proofs")]
    proof_dir: PathBuf,

    /// Directory each cell's KV storage directory is created under;
    /// defaults to a fresh subdirectory of the system temp directory.
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// Identity reported as `client_impl` in manifests.
    #[arg(long, default_value = "kv-plugin-client-rs")]
    client_impl: String,

    /// How many matrix cells to run concurrently.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let servers = args
        .servers
        .iter()
        .map(|spec| parse_server_spec(spec))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let tls_modes = [TlsMode::Disabled, TlsMode::Auto];
    let curves = [Curve::Auto, Curve::P256, Curve::P384, Curve::P521];
    let key_types = [KeyType::Ecdsa, KeyType::Rsa];

    let (cells, skipped) = build_matrix(&args.client_impl, &servers, &tls_modes, &curves, &key_types);

    for s in &skipped {
        log::info!(
            "skipping known-incompatible cell client={} server={} curve={:?}: {}",
            s.client_impl, s.server_impl, s.curve, s.reason
        );
    }

    let storage_root = args
        .storage_root
        .unwrap_or_else(|| std::env::temp_dir().join("kv-plugin-harness"));
    std::fs::create_dir_all(&storage_root)?;
    std::fs::create_dir_all(&args.proof_dir)?;

    log::info!(
        "running {} matrix cells ({} skipped) against {} server binaries",
        cells.len(),
        skipped.len(),
        servers.len()
    );

    let mut successes = 0usize;
    let mut failures = 0usize;
    let mut manifest_count = 0usize;
    let concurrency = args.concurrency.max(1);

    // §5: the harness "may parallelize across matrix cells, each cell
    // owning its own subprocess and its own process-local storage
    // directory." Cells run in bounded-size batches rather than all at once
    // so a large matrix doesn't fork every server simultaneously.
    for chunk in cells.chunks(concurrency) {
        let mut set = tokio::task::JoinSet::new();
        for cell in chunk.iter().cloned() {
            let proof_dir = args.proof_dir.clone();
            let storage_root = storage_root.clone();
            set.spawn(async move { run_cell(&cell, &proof_dir, &storage_root).await });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => {
                    match result.manifest.status {
                        ManifestStatus::Success => successes += 1,
                        ManifestStatus::Failure => failures += 1,
                        ManifestStatus::Pending => {}
                    }
                    manifest_count += 1;
                    log::info!(
                        "cell {} -> {:?} in {:?} ({})",
                        result.manifest.test_name,
                        result.manifest.status,
                        result.elapsed,
                        result.manifest_path.display()
                    );
                }
                Err(join_err) => {
                    failures += 1;
                    log::error!("matrix cell task panicked: {join_err}");
                }
            }
        }
    }

    log::info!(
        "conformance matrix complete: {successes} succeeded, {failures} failed, {} skipped, {manifest_count} manifests written to {}",
        skipped.len(),
        args.proof_dir.display(),
    );

    if failures > 0 {
        anyhow::bail!(
            "{failures} matrix cell(s) failed; see proof manifests in {}",
            args.proof_dir.display()
        );
    }

    Ok(())
}

fn parse_server_spec(spec: &str) -> anyhow::Result<ServerBinary> {
    let (name, path) = spec
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("--server expects NAME=PATH, got {spec:?}"))?;
    Ok(ServerBinary {
        name: name.to_string(),
        path: PathBuf::from(path),
    })
}
