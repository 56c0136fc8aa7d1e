use std::sync::Arc;

use tokio::sync::RwLock;

use crate::api::{self, ApiState};
use crate::broker::{JobStore, LeaseSweeper, SharedStore};
use crate::config::BrokerConfig;
use crate::shutdown::shutdown_token;

/// The broker process: one shared store, the HTTP API, and the optional
/// lease sweep task.
pub struct Broker {
    config: BrokerConfig,
    store: SharedStore,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            store: Arc::new(RwLock::new(JobStore::new())),
        }
    }

    /// Handle to the shared store, mainly for tests and embedding.
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    /// Run the broker until SIGINT/SIGTERM.
    ///
    /// Spawns the lease sweeper when a sweep interval is configured, then
    /// serves the HTTP API with graceful shutdown. Lazy reclaim in the claim
    /// path keeps the broker correct even with the sweeper disabled.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let shutdown = shutdown_token();

        if let Some(interval) = self.config.sweep_interval() {
            let sweeper = LeaseSweeper::new(self.store.clone(), interval);
            let sweeper_shutdown = shutdown.clone();
            tokio::spawn(async move {
                sweeper.run(sweeper_shutdown).await;
            });
        }

        let state = ApiState {
            store: self.store.clone(),
            lease: self.config.lease(),
        };
        let app = api::router(state);

        tracing::info!(
            addr = %self.config.listen_addr,
            lease_secs = self.config.lease_secs,
            sweep_interval_secs = self.config.sweep_interval_secs,
            "starting broker"
        );

        let listener = tokio::net::TcpListener::bind(self.config.listen_addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        Ok(())
    }
}
