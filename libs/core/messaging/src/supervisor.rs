//! Reconnection supervisor.
//!
//! A single background task waits for connection-loss notifications, reopens
//! the connection through the [`ConnectionManager`] and hands the new handle
//! to a caller callback so consumption can resume.
//!
//! ```text
//! consumer ──notify(err)──▶ ReconnectReceiver ──▶ open_connection() ──▶ callback(handle, notifier)
//!     ▲                                                                        │
//!     └──────────────────────── watch_connection(notifier) ◀───────────────────┘
//! ```

use crate::client::{ReconnectNotifier, ReconnectReceiver, WeakReconnectNotifier};
use crate::error::BrokerError;
use crate::manager::{ConnectionHandle, ConnectionManager};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Callback run after every successful reconnection.
///
/// Runs on the supervisor task and must return promptly: spawn long-running
/// work instead of blocking here. Panics are caught and logged.
pub type ReconnectCallback = Arc<dyn Fn(ConnectionHandle, ReconnectNotifier) + Send + Sync>;

/// Supervised reconnection loop.
///
/// The supervisor only keeps a weak reference to the notifier, so the loop
/// ends on its own once every consumer has dropped theirs.
pub struct ReconnectSupervisor {
    manager: Arc<ConnectionManager>,
    receiver: ReconnectReceiver,
    notifier: WeakReconnectNotifier,
    callback: ReconnectCallback,
}

impl ReconnectSupervisor {
    /// `notifier` must be the sending half of `receiver`'s channel; it is
    /// handed to `callback` so the resumed consumer can report the next
    /// disconnect.
    pub fn new(
        manager: Arc<ConnectionManager>,
        receiver: ReconnectReceiver,
        notifier: &ReconnectNotifier,
        callback: ReconnectCallback,
    ) -> Self {
        Self {
            manager,
            receiver,
            notifier: notifier.downgrade(),
            callback,
        }
    }

    /// Run the loop on a new task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run the loop until `shutdown` flips to `true` (or its sender is
    /// dropped) or every notifier is gone.
    ///
    /// Notifications are handled one at a time: the next one is not read
    /// until the current reconnection, retries included, and its callback
    /// have finished. Shutdown still wins over an in-flight reconnection: the
    /// attempt is dropped mid-backoff and the callback is not invoked.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Reconnect supervisor started");

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping reconnect supervisor");
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped, stopping reconnect supervisor");
                        break;
                    }
                }
                reason = self.receiver.recv() => {
                    let Some(reason) = reason else {
                        debug!("All reconnect notifiers dropped");
                        break;
                    };
                    tokio::select! {
                        _ = self.handle_notification(reason) => {}
                        _ = shutdown.wait_for(|stop| *stop) => {
                            info!("Shutdown during reconnection, abandoning attempt");
                            self.manager.mark_disconnected();
                            break;
                        }
                    }
                }
            }
        }

        info!("Reconnect supervisor stopped");
    }

    async fn handle_notification(&self, reason: BrokerError) {
        warn!(error = %reason, "Broker connection lost, reconnecting");
        self.manager.mark_disconnected();

        let handle = match self.manager.open_connection().await {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "Reconnection failed, waiting for next notification");
                return;
            }
        };

        let Some(notifier) = self.notifier.upgrade() else {
            debug!("Reconnected after every notifier was dropped, skipping callback");
            return;
        };

        info!(broker_type = ?handle.broker_type, "Broker reconnected, resuming consumers");
        if catch_unwind(AssertUnwindSafe(|| (self.callback)(handle, notifier))).is_err() {
            error!("Reconnect callback panicked");
        }
    }
}

/// Start a reconnection supervisor on a new task.
///
/// # Example
///
/// ```ignore
/// let (notifier, receiver) = reconnect_channel(1);
/// handle.client.as_ref().unwrap().watch_connection(notifier.clone());
///
/// let supervisor = always_reconnect(manager, receiver, &notifier, |handle, notifier| {
///     tokio::spawn(resume_consumers(handle, notifier));
/// }, shutdown_rx);
/// ```
pub fn always_reconnect<F>(
    manager: Arc<ConnectionManager>,
    receiver: ReconnectReceiver,
    notifier: &ReconnectNotifier,
    callback: F,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    F: Fn(ConnectionHandle, ReconnectNotifier) + Send + Sync + 'static,
{
    ReconnectSupervisor::new(manager, receiver, notifier, Arc::new(callback)).spawn(shutdown)
}
