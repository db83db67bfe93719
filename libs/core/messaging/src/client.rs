//! The capability set every broker backend implements.

use crate::error::{BrokerError, BrokerResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A message handed to a consume handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Queue the message was consumed from
    pub queue: String,

    /// Raw message body
    pub body: Vec<u8>,

    /// Backend delivery tag, when the backend has one
    pub delivery_tag: Option<u64>,
}

impl Delivery {
    pub fn new(queue: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            queue: queue.into(),
            body: body.into(),
            delivery_tag: None,
        }
    }
}

/// Callback invoked for every consumed message.
pub type MessageHandler = Arc<dyn Fn(Delivery) + Send + Sync>;

/// Broker client capability set.
///
/// Implementations own their backend connection state. `connect` must be safe
/// to call repeatedly after a failure; the connection manager retries it.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Establish the backend connection.
    async fn connect(&self) -> BrokerResult<()>;

    /// Close the backend connection and any channels opened on it.
    async fn close_connection(&self) -> BrokerResult<()>;

    /// Start consuming `queue`, delivering each message to `handler`.
    ///
    /// Returns once the subscription is set up; delivery happens in the
    /// background.
    async fn consume(&self, queue: &str, handler: MessageHandler) -> BrokerResult<()>;

    /// Publish `body` to `queue`.
    async fn publish(&self, queue: &str, body: &[u8]) -> BrokerResult<()>;

    /// Report future connection loss on `notifier`.
    ///
    /// Backends without connection-level error events keep the default no-op.
    fn watch_connection(&self, _notifier: ReconnectNotifier) {}
}

impl fmt::Debug for dyn BrokerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerClient")
            .field("backend", &self.name())
            .finish()
    }
}

/// Sending half of the reconnection channel.
///
/// Consumers report a dropped connection by calling [`ReconnectNotifier::notify`];
/// the reconnection supervisor receives it and restores connectivity.
#[derive(Debug, Clone)]
pub struct ReconnectNotifier {
    tx: mpsc::Sender<BrokerError>,
}

impl ReconnectNotifier {
    /// Queue a reconnection request without waiting.
    ///
    /// Fails with [`BrokerError::ChannelClosed`] when the supervisor is gone.
    /// A full channel already holds a pending request, so the new one is
    /// dropped.
    pub fn notify(&self, error: BrokerError) -> BrokerResult<()> {
        match self.tx.try_send(error) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::debug!(error = %dropped, "Reconnect already pending, dropping notification");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(BrokerError::ChannelClosed),
        }
    }

    /// Send a reconnection request, waiting for capacity.
    pub async fn send(&self, error: BrokerError) -> BrokerResult<()> {
        self.tx
            .send(error)
            .await
            .map_err(|_| BrokerError::ChannelClosed)
    }

    /// Whether both notifiers feed the same supervisor channel.
    pub fn same_channel(&self, other: &ReconnectNotifier) -> bool {
        self.tx.same_channel(&other.tx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// A handle that does not keep the channel open.
    pub fn downgrade(&self) -> WeakReconnectNotifier {
        WeakReconnectNotifier {
            tx: self.tx.downgrade(),
        }
    }
}

/// Non-owning [`ReconnectNotifier`].
#[derive(Debug, Clone)]
pub struct WeakReconnectNotifier {
    tx: mpsc::WeakSender<BrokerError>,
}

impl WeakReconnectNotifier {
    /// Returns `None` once every strong notifier has been dropped.
    pub fn upgrade(&self) -> Option<ReconnectNotifier> {
        self.tx.upgrade().map(|tx| ReconnectNotifier { tx })
    }
}

/// Receiving half of the reconnection channel, owned by the supervisor.
#[derive(Debug)]
pub struct ReconnectReceiver {
    rx: mpsc::Receiver<BrokerError>,
}

impl ReconnectReceiver {
    /// Wait for the next reconnection request.
    ///
    /// Returns `None` once every notifier has been dropped.
    pub async fn recv(&mut self) -> Option<BrokerError> {
        self.rx.recv().await
    }
}

/// Create a reconnection channel holding up to `capacity` pending requests.
pub fn reconnect_channel(capacity: usize) -> (ReconnectNotifier, ReconnectReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ReconnectNotifier { tx }, ReconnectReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_and_receive() {
        let (notifier, mut receiver) = reconnect_channel(4);
        notifier.notify(BrokerError::connection("dropped")).unwrap();

        let received = receiver.recv().await.unwrap();
        assert!(matches!(received, BrokerError::Connection(msg) if msg == "dropped"));
    }

    #[tokio::test]
    async fn test_notify_after_receiver_dropped() {
        let (notifier, receiver) = reconnect_channel(1);
        drop(receiver);

        assert!(notifier.is_closed());
        let err = notifier.notify(BrokerError::connection("dropped")).unwrap_err();
        assert!(matches!(err, BrokerError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_full_channel_drops_notification() {
        let (notifier, mut receiver) = reconnect_channel(1);
        notifier.notify(BrokerError::connection("first")).unwrap();
        notifier.notify(BrokerError::connection("second")).unwrap();

        let received = receiver.recv().await.unwrap();
        assert!(matches!(received, BrokerError::Connection(msg) if msg == "first"));
    }

    #[tokio::test]
    async fn test_receiver_ends_when_notifiers_dropped() {
        let (notifier, mut receiver) = reconnect_channel(1);
        drop(notifier);
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_weak_notifier_does_not_keep_channel_open() {
        let (notifier, mut receiver) = reconnect_channel(1);
        let weak = notifier.downgrade();

        let upgraded = weak.upgrade().unwrap();
        assert!(upgraded.same_channel(&notifier));
        drop(upgraded);

        drop(notifier);
        assert!(weak.upgrade().is_none());
        assert!(receiver.recv().await.is_none());
    }

    #[test]
    fn test_same_channel() {
        let (a, _rx_a) = reconnect_channel(1);
        let (b, _rx_b) = reconnect_channel(1);

        assert!(a.same_channel(&a.clone()));
        assert!(!a.same_channel(&b));
    }
}
