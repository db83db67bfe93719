//! Broker connectivity for services: pick a backend, connect it with bounded
//! exponential backoff, and keep long-lived consumers alive across
//! disconnects.
//!
//! # Architecture
//!
//! ```text
//! BrokerConfig ──▶ BackendRegistry ──▶ ConnectionManager ──▶ ConnectionHandle
//!  (BROKER_TYPE)    (rabbitmq, sqs,     (retry + backoff)      ├─ consumer()
//!                    kafka, mock)              ▲               └─ publisher()
//!                                              │
//!                     ReconnectSupervisor ─────┘
//!                     (notification channel + callback)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use messaging::{always_reconnect, reconnect_channel, ConnectionManager};
//!
//! let manager = Arc::new(ConnectionManager::from_env()?);
//! let handle = manager.open_connection().await?; // fatal on error
//!
//! let (notifier, receiver) = reconnect_channel(1);
//! start_consumers(&handle, notifier.clone()).await?;
//!
//! let supervisor = always_reconnect(manager, receiver, &notifier, |handle, notifier| {
//!     tokio::spawn(async move { start_consumers(&handle, notifier).await });
//! }, shutdown_rx);
//! ```

mod backends;
mod client;
mod config;
mod error;
mod health;
mod manager;
mod registry;
mod retry;
mod supervisor;
mod wrappers;

pub use backends::{ConnectSpan, KafkaClient, MockClient, SqsClient};
#[cfg(feature = "rabbitmq")]
pub use backends::RabbitMqClient;
pub use client::{
    reconnect_channel, BrokerClient, Delivery, MessageHandler, ReconnectNotifier,
    ReconnectReceiver, WeakReconnectNotifier,
};
pub use config::{
    BrokerConfig, BrokerType, RetryPolicy, DEFAULT_AMQP_URL, DEFAULT_MAX_CONNECTION_RETRIES,
};
pub use error::{BrokerError, BrokerResult, ErrorCategory};
pub use health::{check_health, HealthStatus};
pub use manager::{ConnectionHandle, ConnectionManager, ConnectionState};
pub use registry::{BackendRegistry, ClientFactory};
pub use retry::{retry_with_backoff, RetryAttempt, RetryObserver, SharedObserver, TracingObserver};
pub use supervisor::{always_reconnect, ReconnectCallback, ReconnectSupervisor};
pub use wrappers::{ConsumerClient, PublisherClient};
