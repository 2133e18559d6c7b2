use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chatwire_auth::JwtAuthenticator;
use chatwire_config::AppConfig;
use chatwire_database::{initialize_database, Pool};
use chatwire_delivery::{Coordinator, CoordinatorHandle, DeliveryService, SqliteMessageStore};
use chatwire_gateway::GatewayState;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COORDINATOR_STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::TRACE)
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Everything the server needs, wired from one [`AppConfig`].
pub struct BackendServices {
    pub config: AppConfig,
    pub db_pool: Pool,
    pub authenticator: JwtAuthenticator,
    pub delivery: DeliveryService,
    coordinator_task: JoinHandle<()>,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to initialise database")?;

        let authenticator = JwtAuthenticator::from_config(&config.auth);

        let (coordinator, coordinator_task) = Coordinator::spawn(&config.realtime);
        let store = Arc::new(SqliteMessageStore::new(db_pool.clone()));
        let delivery = DeliveryService::new(store, coordinator);

        info!(
            queue_capacity = config.realtime.outbound_queue_capacity,
            inbox_capacity = config.realtime.coordinator_inbox_capacity,
            "delivery coordinator ready"
        );

        Ok(Self {
            config: config.clone(),
            db_pool,
            authenticator,
            delivery,
            coordinator_task,
        })
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        self.delivery.coordinator()
    }

    pub fn gateway_state(&self) -> GatewayState {
        GatewayState::new(
            self.db_pool.clone(),
            Arc::new(self.authenticator.clone()),
            self.delivery.clone(),
            self.config.realtime.clone(),
        )
    }

    /// Close every live connection, stop the coordinator and the pool.
    pub async fn shutdown(self) {
        if let Err(error) = self.delivery.coordinator().shutdown().await {
            debug!(%error, "coordinator was already stopped");
        }

        let mut task = self.coordinator_task;
        match tokio::time::timeout(COORDINATOR_STOP_TIMEOUT, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(%error, "coordinator task failed"),
            Err(_) => {
                warn!("coordinator did not stop in time");
                task.abort();
            }
        }

        self.db_pool.close().await;
        info!("backend services stopped");
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
