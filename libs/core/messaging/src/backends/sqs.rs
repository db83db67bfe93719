//! Amazon SQS backend.
//!
//! Placeholder client: every operation logs and succeeds without touching
//! AWS, so services can select `sqs` before a real client lands.

use crate::client::{BrokerClient, MessageHandler};
use crate::error::BrokerResult;
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct SqsClient;

impl SqsClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrokerClient for SqsClient {
    fn name(&self) -> &'static str {
        "sqs"
    }

    async fn connect(&self) -> BrokerResult<()> {
        debug!("SQS connect is a no-op");
        Ok(())
    }

    async fn close_connection(&self) -> BrokerResult<()> {
        debug!("SQS close is a no-op");
        Ok(())
    }

    async fn consume(&self, queue: &str, _handler: MessageHandler) -> BrokerResult<()> {
        debug!(queue = %queue, "SQS consume is a no-op");
        Ok(())
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> BrokerResult<()> {
        debug!(queue = %queue, bytes = body.len(), "SQS publish is a no-op");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Delivery;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_operations_succeed() {
        let client = SqsClient::new();
        client.connect().await.unwrap();
        client.publish("jobs", b"payload").await.unwrap();
        client.consume("jobs", Arc::new(|_: Delivery| {})).await.unwrap();
        client.close_connection().await.unwrap();
    }
}
