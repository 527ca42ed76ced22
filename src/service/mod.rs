//! The assembled Stagehand service.
//!
//! [`Stagehand`] wires one [`LifecycleController`] to a
//! [`CommandDispatcher`] and a [`SessionGateway`], and owns the shutdown
//! sequence that takes them down in order.

mod error;

#[cfg(test)]
mod tests;

pub use error::ServiceError;

use crate::capability::CapabilityRegistry;
use crate::config::StagehandConfig;
use crate::lifecycle::{ports::ProcessLauncher, services::LifecycleController};
use crate::protocol::{CommandDispatcher, SessionGateway};
use crate::provisioning::adapters::FsArtifactCache;
use mockable::Clock;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// A running server management service.
pub struct Stagehand<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    controller: LifecycleController<L, C>,
    dispatcher: CommandDispatcher<L, C>,
    gateway: SessionGateway<L, C>,
}

impl<L, C> Clone for Stagehand<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            dispatcher: self.dispatcher.clone(),
            gateway: self.gateway.clone(),
        }
    }
}

impl<L, C> Stagehand<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Wraps `controller` with a worker pool of `max_concurrent_commands`
    /// and a gateway advertising the standard capabilities.
    #[must_use]
    pub fn new(controller: LifecycleController<L, C>, max_concurrent_commands: usize) -> Self {
        let dispatcher = CommandDispatcher::new(controller.clone(), max_concurrent_commands);
        let gateway = SessionGateway::new(
            dispatcher.clone(),
            Arc::new(CapabilityRegistry::standard()),
        );
        Self {
            controller,
            dispatcher,
            gateway,
        }
    }

    /// Assembles a service from `config`.
    ///
    /// Builds the catalog, opens the artifact cache when one is configured
    /// and defines every configured server.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the catalog cannot be built, the cache
    /// cannot be opened or a server definition is rejected.
    pub fn from_config(
        config: &StagehandConfig,
        launcher: Arc<L>,
        clock: Arc<C>,
    ) -> Result<Self, ServiceError> {
        let catalog = Arc::new(config.catalog()?);
        let mut controller = LifecycleController::new(catalog, launcher, clock);
        if let Some(cache) = &config.artifact_cache {
            let artifacts = FsArtifactCache::open(&cache.root)?;
            info!(root = %artifacts.root(), "artifact cache opened");
            controller = controller.with_artifact_cache(Arc::new(artifacts));
        }

        for definition in config.server_definitions() {
            let server_id = definition.id.clone();
            controller
                .create_server(definition)
                .map_err(|source| ServiceError::DefineServer { server_id, source })?;
        }
        info!(
            server_types = controller.catalog().len(),
            servers = config.servers.len(),
            "configuration applied"
        );
        Ok(Self::new(controller, config.gateway.max_concurrent_commands))
    }

    /// Returns the lifecycle controller.
    #[must_use]
    pub const fn controller(&self) -> &LifecycleController<L, C> {
        &self.controller
    }

    /// Serves control sessions on `listener` until [`Self::shutdown`].
    pub async fn serve(&self, listener: TcpListener) {
        self.gateway.serve(listener).await;
    }

    /// Shuts the service down.
    ///
    /// Stops accepting connections, shuts the controller down (stopping
    /// running servers when `stop_servers` is set), waits for in-flight
    /// commands and finally closes every open session.
    pub async fn shutdown(&self, stop_servers: bool) {
        info!(stop_servers, "stagehand shutting down");
        self.gateway.stop_accepting();
        self.controller.shutdown(stop_servers).await;
        self.dispatcher.close();
        self.dispatcher.wait().await;
        self.gateway.close_sessions().await;
        info!("stagehand stopped");
    }
}
