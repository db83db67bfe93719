//! Kafka backend.
//!
//! Placeholder client with the same contract as the SQS one: operations log
//! at debug level and report success.

use crate::client::{BrokerClient, MessageHandler};
use crate::error::BrokerResult;
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct KafkaClient;

impl KafkaClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrokerClient for KafkaClient {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn connect(&self) -> BrokerResult<()> {
        debug!("Kafka connect is a no-op");
        Ok(())
    }

    async fn close_connection(&self) -> BrokerResult<()> {
        debug!("Kafka close is a no-op");
        Ok(())
    }

    async fn consume(&self, topic: &str, _handler: MessageHandler) -> BrokerResult<()> {
        debug!(topic = %topic, "Kafka consume is a no-op");
        Ok(())
    }

    async fn publish(&self, topic: &str, body: &[u8]) -> BrokerResult<()> {
        debug!(topic = %topic, bytes = body.len(), "Kafka publish is a no-op");
        Ok(())
    }
}
