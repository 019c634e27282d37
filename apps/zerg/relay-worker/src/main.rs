//! Relay Worker Service (NATS JetStream)
//!
//! Binary entry point for the NATS-based relay worker.

#[tokio::main]
async fn main() {
    if let Err(e) = zerg_relay_worker::run().await {
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}
