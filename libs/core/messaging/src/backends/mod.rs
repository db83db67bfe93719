//! Concrete broker clients.

mod kafka;
mod mock;
#[cfg(feature = "rabbitmq")]
mod rabbitmq;
mod sqs;

pub use kafka::KafkaClient;
pub use mock::{ConnectSpan, MockClient};
#[cfg(feature = "rabbitmq")]
pub use rabbitmq::RabbitMqClient;
pub use sqs::SqsClient;
