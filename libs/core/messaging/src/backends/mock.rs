//! In-memory broker used by tests and local runs.
//!
//! Publishing delivers synchronously to every handler consuming the queue.
//! Connection behaviour can be scripted: fail the next `k` connects, delay
//! each attempt, or simulate a dropped connection.

use crate::client::{BrokerClient, Delivery, MessageHandler, ReconnectNotifier};
use crate::error::{BrokerError, BrokerResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Start and end of one `connect` call.
#[derive(Debug, Clone, Copy)]
pub struct ConnectSpan {
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
struct MockState {
    handlers: HashMap<String, Vec<MessageHandler>>,
    published: Vec<Delivery>,
    notifier: Option<ReconnectNotifier>,
    spans: Vec<ConnectSpan>,
    connect_delay: Duration,
}

/// In-memory broker client.
#[derive(Clone, Default)]
pub struct MockClient {
    state: Arc<Mutex<MockState>>,
    connected: Arc<AtomicBool>,
    fail_next: Arc<AtomicU32>,
    connect_attempts: Arc<AtomicU32>,
    next_tag: Arc<AtomicU64>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `connect` fail.
    pub fn fail_next_connects(&self, count: u32) -> &Self {
        self.fail_next.store(count, Ordering::SeqCst);
        self
    }

    /// Sleep for `delay` inside every `connect` call.
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.lock().connect_delay = delay;
        self
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Timeline of every `connect` call, in call order.
    pub fn connect_spans(&self) -> Vec<ConnectSpan> {
        self.lock().spans.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Every message published so far.
    pub fn published(&self) -> Vec<Delivery> {
        self.lock().published.clone()
    }

    /// Mark the connection as dropped and report it to the watching notifier.
    ///
    /// Consumers die with the connection and must subscribe again after the
    /// next `connect`. Returns `false` when nothing is watching the connection.
    pub fn simulate_disconnect(&self, error: BrokerError) -> bool {
        self.connected.store(false, Ordering::SeqCst);
        let notifier = {
            let mut state = self.lock();
            state.handlers.clear();
            state.notifier.clone()
        };
        match notifier {
            Some(notifier) => notifier.notify(error).is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A poisoned mock only happens after a test already panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BrokerClient for MockClient {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self) -> BrokerResult<()> {
        let started = Instant::now();
        let attempt = self.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = self.lock().connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        self.lock().spans.push(ConnectSpan {
            started,
            finished: Instant::now(),
        });

        if should_fail {
            debug!(attempt, "Mock connect failing as scripted");
            return Err(BrokerError::connection(format!(
                "mock connect failure on attempt {}",
                attempt
            )));
        }

        self.connected.store(true, Ordering::SeqCst);
        debug!(attempt, "Mock broker connected");
        Ok(())
    }

    async fn close_connection(&self) -> BrokerResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.lock().handlers.clear();
        Ok(())
    }

    async fn consume(&self, queue: &str, handler: MessageHandler) -> BrokerResult<()> {
        if !self.is_connected() {
            return Err(BrokerError::Consume(format!(
                "mock broker not connected, cannot consume {}",
                queue
            )));
        }
        self.lock()
            .handlers
            .entry(queue.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> BrokerResult<()> {
        if !self.is_connected() {
            return Err(BrokerError::Publish(format!(
                "mock broker not connected, cannot publish to {}",
                queue
            )));
        }

        let delivery = Delivery {
            queue: queue.to_string(),
            body: body.to_vec(),
            delivery_tag: Some(self.next_tag.fetch_add(1, Ordering::SeqCst) + 1),
        };

        // Run handlers outside the lock so they may publish in turn
        let handlers = {
            let mut state = self.lock();
            state.published.push(delivery.clone());
            state.handlers.get(queue).cloned().unwrap_or_default()
        };
        for handler in handlers {
            handler(delivery.clone());
        }
        Ok(())
    }

    fn watch_connection(&self, notifier: ReconnectNotifier) {
        self.lock().notifier = Some(notifier);
    }
}
