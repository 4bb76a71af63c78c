//! # Pre-Setup Collaborator Seam
//!
//! Optional per-proposal preparation that runs after deployment and before
//! the governance sequence: deploying prerequisite contracts, funding
//! accounts, seeding state. Registered per proposal identifier; absence is
//! normal and failure is downgraded to a warning.

use crate::rpc::ChainRpcClient;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// One unit of preparatory on-chain work for a specific proposal
#[async_trait]
pub trait PreSetup: Send + Sync {
    async fn run(&self, rpc: &ChainRpcClient) -> anyhow::Result<()>;
}

/// Registry of pre-setup routines keyed by proposal identifier
#[derive(Default)]
pub struct PreSetupRegistry {
    routines: HashMap<String, Arc<dyn PreSetup>>,
}

impl PreSetupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, igp_id: impl Into<String>, routine: Arc<dyn PreSetup>) {
        self.routines.insert(igp_id.into(), routine);
    }

    pub fn get(&self, igp_id: &str) -> Option<&Arc<dyn PreSetup>> {
        self.routines.get(igp_id)
    }

    /// Run the routine for this proposal if one exists. Failures are caught
    /// and downgraded to a warning; the simulation continues without the
    /// preparation.
    pub async fn run_for(&self, igp_id: &str, rpc: &ChainRpcClient) {
        let Some(routine) = self.get(igp_id) else {
            info!(igp_id, "No pre-setup routine registered, skipping");
            return;
        };

        match routine.run(rpc).await {
            Ok(()) => info!(igp_id, "Pre-setup completed"),
            Err(e) => warn!(igp_id, error = %e, "Pre-setup failed, continuing without it"),
        }
    }
}

impl std::fmt::Debug for PreSetupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreSetupRegistry")
            .field("registered", &self.routines.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Failing(Arc<AtomicBool>);

    #[async_trait]
    impl PreSetup for Failing {
        async fn run(&self, _rpc: &ChainRpcClient) -> anyhow::Result<()> {
            self.0.store(true, Ordering::SeqCst);
            anyhow::bail!("setup exploded")
        }
    }

    #[tokio::test]
    async fn failure_is_swallowed() {
        let invoked = Arc::new(AtomicBool::new(false));
        let mut registry = PreSetupRegistry::new();
        registry.register("110", Arc::new(Failing(invoked.clone())));

        let rpc = ChainRpcClient::new("http://localhost:1").unwrap();
        registry.run_for("110", &rpc).await;

        assert!(invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unregistered_id_is_a_quiet_skip() {
        let registry = PreSetupRegistry::new();
        let rpc = ChainRpcClient::new("http://localhost:1").unwrap();
        registry.run_for("999", &rpc).await;
    }
}
