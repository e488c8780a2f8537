//! Conforming plugin server binary.
//!
//! Flags exist for documentation/overriding purposes; the environment
//! contract (§6) is authoritative and is what `kv_plugin_shared::server::run`
//! actually reads, matching the go-plugin convention that a server is always
//! launched with its configuration in its environment.

use clap::Parser;
use kv_plugin_shared::config::ServerEnvConfig;

/// Command line arguments for the plugin server.
#[derive(Parser, Debug)]
#[command(name = "kv-plugin-server")]
#[command(about = "Conforming plugin server: handshake, AutoMTLS, KV gRPC surface")]
struct Args {
    /// TLS mode override (disabled | auto | manual); defaults to TLS_MODE.
    #[arg(long)]
    tls_mode: Option<String>,

    /// TLS curve override (p-256 | p-384 | p-521 | auto); defaults to TLS_CURVE.
    #[arg(long)]
    tls_curve: Option<String>,

    /// TLS key type override (ecdsa | rsa); defaults to TLS_KEY_TYPE.
    #[arg(long)]
    tls_key_type: Option<String>,

    /// Storage directory override; defaults to KV_STORAGE_DIR.
    #[arg(long)]
    storage_dir: Option<std::path::PathBuf>,

    /// Log level; defaults to LOG_LEVEL.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServerEnvConfig::from_env();
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    if let Some(mode) = &args.tls_mode {
        config.tls_mode = kv_plugin_shared::config::TlsMode::from_env_str(mode);
    }
    if let Some(curve) = args.tls_curve.as_deref().and_then(kv_plugin_shared::config::Curve::from_name) {
        config.tls_curve = curve;
    }
    if let Some(key_type) = &args.tls_key_type {
        config.tls_key_type = kv_plugin_shared::config::KeyType::from_env_str(key_type);
    }
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }

    log::info!("starting kv-plugin-server, storage_dir={:?}", config.storage_dir);

    kv_plugin_shared::server::run(config).await?;

    log::info!("kv-plugin-server shutdown complete");
    Ok(())
}
