//! Broker Worker Service
//!
//! Consumes a single queue from the configured broker and resumes consumption
//! after every reconnection.
//!
//! ## Architecture
//!
//! ```text
//! BROKER_TYPE / RABBITMQ_URL
//!   ↓
//! ConnectionManager::open_connection (retry with backoff, fatal on failure)
//!   ↓
//! consumer(BROKER_QUEUE) ──connection lost──▶ reconnect supervisor
//!   ▲                                              │
//!   └────────────── resume consumer ◀──────────────┘
//! ```

use core_config::{env_or_default, env_parse, Environment};
use eyre::{Result, WrapErr};
use messaging::{
    always_reconnect, check_health, reconnect_channel, ConnectionHandle, ConnectionManager,
    Delivery, MessageHandler, ReconnectNotifier,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Worker settings that are not part of the broker connection itself.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue to consume (`BROKER_QUEUE`)
    pub queue: String,

    /// Interval between health log lines (`BROKER_HEALTH_INTERVAL_SECS`)
    pub health_interval: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        let secs: u64 = env_parse("BROKER_HEALTH_INTERVAL_SECS", 30)
            .wrap_err("Invalid BROKER_HEALTH_INTERVAL_SECS")?;

        Ok(Self {
            queue: env_or_default("BROKER_QUEUE", "broker-worker"),
            health_interval: Duration::from_secs(secs.max(1)),
        })
    }
}

fn log_delivery(delivery: Delivery) {
    info!(
        queue = %delivery.queue,
        bytes = delivery.body.len(),
        delivery_tag = ?delivery.delivery_tag,
        "Message received"
    );
}

/// Subscribe `queue` on `handle` and report future connection loss to `notifier`.
pub async fn start_consumer(
    handle: &ConnectionHandle,
    queue: &str,
    notifier: ReconnectNotifier,
) -> messaging::BrokerResult<()> {
    if let Some(client) = &handle.client {
        client.watch_connection(notifier);
    }

    let handler: MessageHandler = Arc::new(log_delivery);
    handle.consumer().consume(queue, handler).await?;

    info!(queue = %queue, broker_type = ?handle.broker_type, "Consumer started");
    Ok(())
}

/// Run the broker worker
///
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Opens the broker connection, retrying with backoff
/// 3. Starts the consumer and the reconnect supervisor
/// 4. Waits for SIGINT/SIGTERM, then stops the supervisor and closes the connection
///
/// # Errors
///
/// Returns an error if:
/// - Broker or worker configuration is invalid
/// - The initial connection fails after every retry
/// - The initial consumer cannot be started
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting broker worker"
    );
    info!("Environment: {:?}", environment);

    let worker_config = WorkerConfig::from_env()?;
    let manager = Arc::new(
        ConnectionManager::from_env().wrap_err("Failed to load broker configuration")?,
    );
    info!(
        broker_type = %manager.config().broker_type,
        max_retries = manager.config().retry.max_retries,
        queue = %worker_config.queue,
        "Worker configuration loaded"
    );

    info!("Connecting to broker...");
    let handle = manager
        .open_connection()
        .await
        .wrap_err("Failed to connect to broker")?;
    info!("Connected to broker successfully");

    let (notifier, receiver) = reconnect_channel(1);
    start_consumer(&handle, &worker_config.queue, notifier.clone())
        .await
        .wrap_err("Failed to start consumer")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let queue = worker_config.queue.clone();
    let supervisor = always_reconnect(
        manager.clone(),
        receiver,
        &notifier,
        move |handle, notifier| {
            let queue = queue.clone();
            tokio::spawn(async move {
                if let Err(e) = start_consumer(&handle, &queue, notifier).await {
                    error!(error = %e, "Failed to resume consumer after reconnect");
                }
            });
        },
        shutdown_rx.clone(),
    );

    report_health(&manager, worker_config.health_interval, shutdown_rx).await;

    if let Err(e) = supervisor.await {
        warn!(error = %e, "Reconnect supervisor task failed");
    }
    drop(notifier);

    manager
        .close()
        .await
        .wrap_err("Failed to close broker connection")?;

    info!("Broker worker stopped");
    Ok(())
}

/// Log broker health periodically until shutdown.
async fn report_health(
    manager: &ConnectionManager,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = check_health(manager).await;
                if status.healthy {
                    debug!(state = %status.state, "Broker healthy");
                } else {
                    warn!(
                        state = %status.state,
                        message = ?status.message,
                        "Broker unhealthy"
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .wrap_err("Failed to install Ctrl+C handler")
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install signal handler")?
            .recv()
            .await;
        Ok::<(), eyre::Report>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        res = ctrl_c => {
            res?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        res = terminate => {
            res?;
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
