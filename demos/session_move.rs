//! Open a session, publish one `text/plain` sample, release everything.
//!
//! Run with `RUST_LOG=debug cargo run --example session_move` to see each step.

use std::time::Duration;

use mom_pubsub::{Config, Encoding, PublisherOptions, PublisherPutOptions, Result};

const KEY: &str = "demo/example/session_move_test";

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    let config = Config::default();

    println!("Opening session...");
    let session = mom_pubsub::open(config).await?;

    println!("Declaring publisher for '{KEY}'...");
    let publisher = session
        .declare_publisher(KEY, PublisherOptions::default())
        .await?;

    let payload = "Session Move!";
    println!("Putting data ('{KEY}': '{payload}')...");
    publisher
        .put(
            payload,
            PublisherPutOptions {
                encoding: Encoding::TEXT_PLAIN,
            },
        )
        .await?;

    tokio::time::sleep(Duration::from_secs(1)).await;

    publisher.undeclare().await?;
    session.close().await?;

    Ok(())
}
