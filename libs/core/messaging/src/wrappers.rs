//! Consume-only and publish-only client handles.
//!
//! Callers that should not connect or close the broker get one of these
//! instead of the full [`BrokerClient`].

use crate::client::{BrokerClient, MessageHandler};
use crate::config::BrokerType;
use crate::error::{BrokerError, BrokerResult};
use crate::registry::BackendRegistry;
use std::sync::Arc;

fn missing_client(broker_type: Option<BrokerType>) -> BrokerError {
    BrokerError::not_recognized(
        broker_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "no client attached".to_string()),
    )
}

/// Consume-only handle.
///
/// Built from an unrecognized broker name it carries no client, and every
/// call fails fast with [`BrokerError::ClientNotRecognized`].
#[derive(Clone, Debug, Default)]
pub struct ConsumerClient {
    broker_type: Option<BrokerType>,
    client: Option<Arc<dyn BrokerClient>>,
}

impl ConsumerClient {
    pub fn new(registry: &BackendRegistry, broker_type: &str) -> Self {
        let broker_type = BrokerType::parse(broker_type);
        let client = broker_type.and_then(|t| registry.resolve(t));
        Self::from_parts(broker_type, client)
    }

    pub(crate) fn from_parts(
        broker_type: Option<BrokerType>,
        client: Option<Arc<dyn BrokerClient>>,
    ) -> Self {
        Self {
            broker_type: client.as_ref().and(broker_type),
            client,
        }
    }

    pub fn broker_type(&self) -> Option<BrokerType> {
        self.broker_type
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    pub async fn consume(&self, queue: &str, handler: MessageHandler) -> BrokerResult<()> {
        match &self.client {
            Some(client) => client.consume(queue, handler).await,
            None => Err(missing_client(self.broker_type)),
        }
    }
}

/// Publish-only handle.
///
/// Same zero-value behaviour as [`ConsumerClient`].
#[derive(Clone, Debug, Default)]
pub struct PublisherClient {
    broker_type: Option<BrokerType>,
    client: Option<Arc<dyn BrokerClient>>,
}

impl PublisherClient {
    pub fn new(registry: &BackendRegistry, broker_type: &str) -> Self {
        let broker_type = BrokerType::parse(broker_type);
        let client = broker_type.and_then(|t| registry.resolve(t));
        Self::from_parts(broker_type, client)
    }

    pub(crate) fn from_parts(
        broker_type: Option<BrokerType>,
        client: Option<Arc<dyn BrokerClient>>,
    ) -> Self {
        Self {
            broker_type: client.as_ref().and(broker_type),
            client,
        }
    }

    pub fn broker_type(&self) -> Option<BrokerType> {
        self.broker_type
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    pub async fn publish(&self, queue: &str, body: &[u8]) -> BrokerResult<()> {
        match &self.client {
            Some(client) => client.publish(queue, body).await,
            None => Err(missing_client(self.broker_type)),
        }
    }
}
