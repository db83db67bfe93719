//! Broker Worker Service - Entry Point
//!
//! Long-running consumer that keeps its broker subscription alive across
//! connection drops.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    broker_worker::run().await
}
