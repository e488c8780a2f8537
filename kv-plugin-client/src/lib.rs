//! Plugin Client Runtime (§4.F): spawn or reattach to a conforming plugin
//! server, parse its handshake, derive a matching client certificate, build
//! the mTLS channel, and dispense a KV stub.

mod dial;
mod reattach;
mod spawn;

pub mod runtime;

pub use kv_plugin_shared::config::ClientSpawnConfig;
pub use kv_plugin_shared::error::{Error, Result};
pub use reattach::parse_reattach_target;
pub use runtime::PluginClient;
