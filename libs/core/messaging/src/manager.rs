//! Connection manager: resolves the configured backend and connects it under
//! a bounded exponential-backoff policy.

use crate::client::BrokerClient;
use crate::config::{BrokerConfig, BrokerType};
use crate::error::{BrokerError, BrokerResult};
use crate::registry::BackendRegistry;
use crate::retry::{retry_with_backoff, SharedObserver, TracingObserver};
use crate::wrappers::{ConsumerClient, PublisherClient};
use core_config::FromEnv;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, instrument, warn};

/// Connectivity of a [`ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The last connection attempt spent its whole retry budget.
    Exhausted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// A broker type paired with its client and retry budget.
///
/// Handles are cheap to clone and are replaced, never mutated, on reconnect.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    pub broker_type: Option<BrokerType>,
    pub client: Option<Arc<dyn BrokerClient>>,
    pub max_retries: u32,
}

impl ConnectionHandle {
    pub fn new(broker_type: BrokerType, client: Arc<dyn BrokerClient>, max_retries: u32) -> Self {
        Self {
            broker_type: Some(broker_type),
            client: Some(client),
            max_retries,
        }
    }

    /// Handle with no client attached.
    pub fn empty(max_retries: u32) -> Self {
        Self {
            broker_type: None,
            client: None,
            max_retries,
        }
    }

    /// Consume-only view of this handle's client.
    pub fn consumer(&self) -> ConsumerClient {
        ConsumerClient::from_parts(self.broker_type, self.client.clone())
    }

    /// Publish-only view of this handle's client.
    pub fn publisher(&self) -> PublisherClient {
        PublisherClient::from_parts(self.broker_type, self.client.clone())
    }
}

/// Owns the active broker connection.
///
/// # Example
///
/// ```ignore
/// let manager = Arc::new(ConnectionManager::from_env()?);
/// let handle = manager.open_connection().await?;
/// handle.publisher().publish("orders", b"{}").await?;
/// ```
pub struct ConnectionManager {
    config: BrokerConfig,
    registry: BackendRegistry,
    observer: SharedObserver,
    active: RwLock<Option<ConnectionHandle>>,
    state: watch::Sender<ConnectionState>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("broker_type", &self.config.broker_type)
            .field("max_retries", &self.config.retry.max_retries)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl ConnectionManager {
    /// Manager using the builtin backends and tracing-based retry logging.
    pub fn new(config: BrokerConfig) -> Self {
        let registry = BackendRegistry::from_config(&config);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: BrokerConfig, registry: BackendRegistry) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            registry,
            observer: Arc::new(TracingObserver),
            active: RwLock::new(None),
            state,
        }
    }

    /// Load [`BrokerConfig`] from the environment.
    pub fn from_env() -> BrokerResult<Self> {
        Ok(Self::new(BrokerConfig::from_env()?))
    }

    /// Report retry attempts to `observer` instead of the log.
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Resolve the configured backend and connect it.
    ///
    /// An unrecognized broker type fails immediately with
    /// [`BrokerError::ClientNotRecognized`]; no retry is attempted. On success
    /// the returned handle becomes the active one.
    #[instrument(skip(self), fields(broker_type = %self.config.broker_type))]
    pub async fn open_connection(&self) -> BrokerResult<ConnectionHandle> {
        let max_retries = self.config.retry.max_retries;
        let resolved = self
            .config
            .resolved_type()
            .and_then(|broker_type| Some((broker_type, self.registry.resolve(broker_type)?)));

        let Some((broker_type, client)) = resolved else {
            warn!("Broker type not recognized, no client available");
            return Err(BrokerError::not_recognized(self.config.broker_type.clone()));
        };

        let handle = ConnectionHandle::new(broker_type, client, max_retries);
        self.connect_client(&handle).await?;

        // Readers observing `Connected` must already see the new handle
        *self.active.write().await = Some(handle.clone());
        self.state.send_replace(ConnectionState::Connected);
        Ok(handle)
    }

    /// Connect `handle`'s client, retrying with exponential backoff.
    ///
    /// Makes at most `handle.max_retries + 1` attempts and returns the last
    /// error once they are spent. A handle without a client fails immediately.
    /// The active handle is left untouched.
    pub async fn connect(&self, handle: ConnectionHandle) -> BrokerResult<ConnectionHandle> {
        self.connect_client(&handle).await?;
        self.state.send_replace(ConnectionState::Connected);
        Ok(handle)
    }

    /// Retry `handle`'s client until connected. Leaves the state at
    /// `Connecting` on success so the caller decides when to publish it.
    async fn connect_client(&self, handle: &ConnectionHandle) -> BrokerResult<()> {
        let Some(client) = handle.client.clone() else {
            return Err(BrokerError::not_recognized(
                handle
                    .broker_type
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "no client attached".to_string()),
            ));
        };

        let policy = self.config.retry.clone().with_max_retries(handle.max_retries);

        self.state.send_replace(ConnectionState::Connecting);
        debug!(backend = client.name(), max_retries = policy.max_retries, "Connecting to broker");

        match retry_with_backoff(|| client.connect(), &policy, self.observer.as_ref()).await {
            Ok(()) => {
                info!(backend = client.name(), "Broker connection established");
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(ConnectionState::Exhausted);
                warn!(backend = client.name(), error = %e, "Giving up on broker connection");
                Err(e)
            }
        }
    }

    /// The active handle, if a connection has been opened.
    ///
    /// Fetch it right before use: the supervisor may swap it at any time.
    pub async fn current(&self) -> Option<ConnectionHandle> {
        self.active.read().await.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Record that the active connection was lost.
    pub fn mark_disconnected(&self) {
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Close and drop the active connection.
    pub async fn close(&self) -> BrokerResult<()> {
        let handle = self.active.write().await.take();
        self.mark_disconnected();

        match handle.and_then(|h| h.client) {
            Some(client) => {
                info!(backend = client.name(), "Closing broker connection");
                client.close_connection().await
            }
            None => Ok(()),
        }
    }
}
