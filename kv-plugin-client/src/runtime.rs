//! The Plugin Client Runtime object: spawn/reattach, handshake, dial, and
//! the KV operations themselves (§4.F).

use crate::dial::{dial, DialOutcome};
use crate::reattach::parse_reattach_target;
use crate::spawn::{read_child_handshake, spawn_server, SpawnedServer};
use kv_plugin_shared::config::ClientSpawnConfig;
use kv_plugin_shared::crypto::{self, GeneratedCert};
use kv_plugin_shared::error::{ClientError, Result};
use kv_plugin_shared::grpc::proto::kv_client::KvClient;
use kv_plugin_shared::grpc::{GetRequest, PutRequest};
use kv_plugin_shared::handshake::Handshake;
use tonic::transport::Channel;

/// A live connection to a conforming KV plugin server: either a spawned
/// child process, or a reattached address with no owned child.
pub struct PluginClient {
    child: Option<SpawnedServer>,
    stub: KvClient<Channel>,
    config: ClientSpawnConfig,
    pub handshake: Handshake,
    pub tls_mode: &'static str,
    pub negotiated_curve: Option<String>,
}

impl PluginClient {
    /// Spawn path (§4.F steps 1-8): validate the binary, assemble the child
    /// environment with a pre-spawn client cert, spawn, read the handshake,
    /// match curves, dial.
    pub async fn start(config: ClientSpawnConfig) -> Result<Self> {
        let pre_spawn_cert = generate_pre_spawn_cert(&config)?;

        let mut spawned = spawn_server(&config, &pre_spawn_cert)?;
        let handshake = read_child_handshake(&mut spawned, config.handshake_timeout).await?;

        let outcome = match dial(&handshake, &pre_spawn_cert, config.curve).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let _ = spawned.child.start_kill();
                return Err(err);
            }
        };

        Ok(Self {
            child: Some(spawned),
            stub: KvClient::new(outcome.channel),
            tls_mode: outcome.tls_mode,
            negotiated_curve: outcome.negotiated_curve,
            handshake,
            config,
        })
    }

    /// Reattach path: no subprocess, just dial an existing server (§4.F
    /// "Reattach path").
    pub async fn reattach(target: &str, config: ClientSpawnConfig) -> Result<Self> {
        let handshake = parse_reattach_target(target);
        let pre_spawn_cert = generate_pre_spawn_cert(&config)?;

        let outcome = dial(&handshake, &pre_spawn_cert, config.curve)
            .await
            .map_err(|e| ClientError::ReattachFailed {
                target: target.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            child: None,
            stub: KvClient::new(outcome.channel),
            tls_mode: outcome.tls_mode,
            negotiated_curve: outcome.negotiated_curve,
            handshake,
            config,
        })
    }

    /// `Put(key, value)` with the client call deadline applied (§5).
    pub async fn put(&mut self, key: String, value: Vec<u8>) -> Result<()> {
        let request = tonic::Request::new(PutRequest { key, value });
        tokio::time::timeout(self.config.call_timeout, self.stub.put(request))
            .await??;
        Ok(())
    }

    /// `Get(key)`, surfacing storage `NotFound` as a typed gRPC status
    /// (already mapped server-side) through to the caller (§4.D, §7).
    pub async fn get(&mut self, key: String) -> Result<Vec<u8>> {
        let request = tonic::Request::new(GetRequest { key });
        let response = tokio::time::timeout(self.config.call_timeout, self.stub.get(request))
            .await??;
        Ok(response.into_inner().value)
    }

    /// Terminate the spawned child (SIGTERM then SIGKILL after a grace
    /// period) and drop the channel; reattached clients just drop the
    /// channel (§4.F "Shutdown").
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(mut spawned) = self.child.take() {
            #[cfg(unix)]
            {
                if let Some(pid) = spawned.child.id() {
                    // SAFETY: signaling our own child by its reported pid.
                    unsafe {
                        libc::kill(pid as i32, libc::SIGTERM);
                    }
                }
            }
            match tokio::time::timeout(self.config.shutdown_grace, spawned.child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    let _ = spawned.child.start_kill();
                    let _ = spawned.child.wait().await;
                }
            }
        }
        Ok(())
    }
}

fn generate_pre_spawn_cert(config: &ClientSpawnConfig) -> Result<GeneratedCert> {
    let curve = if config.curve == kv_plugin_shared::config::Curve::Auto {
        kv_plugin_shared::config::Curve::P256
    } else {
        config.curve
    };
    crypto::generate(curve, config.key_type, crypto::Role::Client)
}
