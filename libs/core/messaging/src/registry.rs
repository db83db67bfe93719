//! Maps a broker type to a freshly constructed client.

use crate::backends::{KafkaClient, MockClient, SqsClient};
use crate::client::BrokerClient;
use crate::config::{BrokerConfig, BrokerType, DEFAULT_AMQP_URL};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Constructor for one backend.
pub type ClientFactory = Arc<dyn Fn() -> Arc<dyn BrokerClient> + Send + Sync>;

/// Backend registry.
///
/// Resolution never opens a connection. Factories can be overridden per
/// broker type, which is how tests swap a real backend for a [`MockClient`].
#[derive(Clone)]
pub struct BackendRegistry {
    amqp_url: String,
    overrides: HashMap<BrokerType, ClientFactory>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_AMQP_URL)
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("amqp_url", &self.amqp_url)
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackendRegistry {
    /// Registry with the builtin backends; RabbitMQ clients use `amqp_url`.
    pub fn new(amqp_url: impl Into<String>) -> Self {
        Self {
            amqp_url: amqp_url.into(),
            overrides: HashMap::new(),
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(config.amqp_url.clone())
    }

    /// Replace the constructor used for `broker_type`.
    pub fn with_factory<F>(mut self, broker_type: BrokerType, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn BrokerClient> + Send + Sync + 'static,
    {
        self.overrides.insert(broker_type, Arc::new(factory));
        self
    }

    /// Always hand out the same client for `broker_type`.
    pub fn with_client(self, broker_type: BrokerType, client: Arc<dyn BrokerClient>) -> Self {
        self.with_factory(broker_type, move || client.clone())
    }

    /// Construct the client for `broker_type`.
    ///
    /// Returns `None` when the backend is compiled out (e.g. RabbitMQ without
    /// the `rabbitmq` feature).
    pub fn resolve(&self, broker_type: BrokerType) -> Option<Arc<dyn BrokerClient>> {
        if let Some(factory) = self.overrides.get(&broker_type) {
            return Some(factory());
        }

        match broker_type {
            BrokerType::RabbitMq => self.rabbitmq(),
            BrokerType::Sqs => Some(Arc::new(SqsClient::new())),
            BrokerType::Kafka => Some(Arc::new(KafkaClient::new())),
            BrokerType::Mock => Some(Arc::new(MockClient::new())),
        }
    }

    /// Resolve a broker name, matched case-insensitively.
    ///
    /// Unrecognized names yield `None`.
    pub fn resolve_name(&self, name: &str) -> Option<Arc<dyn BrokerClient>> {
        BrokerType::parse(name).and_then(|broker_type| self.resolve(broker_type))
    }

    #[cfg(feature = "rabbitmq")]
    fn rabbitmq(&self) -> Option<Arc<dyn BrokerClient>> {
        Some(Arc::new(crate::backends::RabbitMqClient::new(
            self.amqp_url.clone(),
        )))
    }

    #[cfg(not(feature = "rabbitmq"))]
    fn rabbitmq(&self) -> Option<Arc<dyn BrokerClient>> {
        tracing::warn!("RabbitMQ backend requested but the `rabbitmq` feature is disabled");
        None
    }
}
