//! Readiness snapshot of a connection manager.

use crate::config::BrokerType;
use crate::manager::{ConnectionManager, ConnectionState};
use tracing::debug;

/// Broker connectivity snapshot for readiness probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    /// Whether the broker connection is usable
    pub healthy: bool,

    pub state: ConnectionState,

    /// Broker type of the active handle, if any
    pub broker_type: Option<BrokerType>,

    /// Optional explanation when unhealthy
    pub message: Option<String>,
}

/// Check broker connectivity.
///
/// Healthy only while the manager reports [`ConnectionState::Connected`].
///
/// # Example
/// ```ignore
/// let status = messaging::check_health(&manager).await;
/// if !status.healthy {
///     return StatusCode::SERVICE_UNAVAILABLE;
/// }
/// ```
pub async fn check_health(manager: &ConnectionManager) -> HealthStatus {
    let state = manager.state();
    let broker_type = manager.current().await.and_then(|h| h.broker_type);

    let message = match state {
        ConnectionState::Connected => None,
        ConnectionState::Connecting => Some("broker connection in progress".to_string()),
        ConnectionState::Disconnected => Some("broker not connected".to_string()),
        ConnectionState::Exhausted => Some("broker connection retries exhausted".to_string()),
    };

    debug!(state = %state, "Broker health check");
    HealthStatus {
        healthy: state == ConnectionState::Connected,
        state,
        broker_type,
        message,
    }
}
