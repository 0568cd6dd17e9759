//! A router and two clients over loopback TCP.
//!
//! The router listens on an ephemeral port; each client connects to it and
//! the router forwards samples between them.

use std::time::Duration;

use mom_pubsub::{
    Config, Encoding, PutOptions, Result, Sample, SubscriberOptions, WhatAmI,
};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    let router = mom_pubsub::open(
        Config::default()
            .with_mode(WhatAmI::Router)
            .with_listen("tcp/127.0.0.1:0"),
    )
    .await?;

    let info = router.info().await?;
    let locator = info
        .locators
        .first()
        .cloned()
        .unwrap_or_else(|| "tcp/127.0.0.1:7447".to_string());
    println!("Router {} listening on {locator}", info.zid);

    let receiver = mom_pubsub::open(Config::client([locator.clone()])).await?;
    let _sub = receiver
        .declare_subscriber(
            "demo/tcp/**",
            |sample: Sample| {
                println!(
                    ">> [Subscriber] ('{}': '{}')",
                    sample.key_expr,
                    sample.payload_str()
                );
            },
            SubscriberOptions::default(),
        )
        .await?;

    let sender = mom_pubsub::open(Config::client([locator])).await?;

    // Give the router time to register both links.
    tokio::time::sleep(Duration::from_millis(200)).await;

    for i in 0..3 {
        sender
            .put(
                format!("demo/tcp/{i}"),
                format!("hello #{i}"),
                PutOptions {
                    encoding: Encoding::TEXT_PLAIN,
                    ..PutOptions::default()
                },
            )
            .await?;
    }

    tokio::time::sleep(Duration::from_millis(500)).await;

    sender.close().await?;
    receiver.close().await?;
    router.close().await?;
    Ok(())
}
