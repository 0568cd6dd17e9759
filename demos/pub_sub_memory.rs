//! Two sessions on the same in-process hub: one publishes, one subscribes
//! with a wildcard and also answers queries.

use std::time::Duration;

use mom_pubsub::{
    Config, Encoding, GetOptions, PublisherOptions, PublisherPutOptions, Query, QueryableOptions,
    Result, Sample, SubscriberOptions,
};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    let config = Config::default().with_connect("mem/demo");

    let listener = mom_pubsub::open(config.clone()).await?;
    let _subscriber = listener
        .declare_subscriber(
            "demo/**",
            |sample: Sample| {
                println!(
                    ">> [Subscriber] Received {:?} ('{}': '{}') [{}]",
                    sample.kind,
                    sample.key_expr,
                    sample.payload_str(),
                    sample.encoding
                );
            },
            SubscriberOptions::default(),
        )
        .await?;
    let _queryable = listener
        .declare_queryable(
            "demo/status",
            |query: Query| async move {
                println!(">> [Queryable] Received query '{}'", query.selector());
                query.reply("demo/status", "up", Encoding::TEXT_PLAIN).await
            },
            QueryableOptions::default(),
        )
        .await?;

    let talker = mom_pubsub::open(config).await?;
    let publisher = talker
        .declare_publisher("demo/counter", PublisherOptions::default())
        .await?;

    for i in 0..5 {
        publisher
            .put(
                format!("[{i:4}] Pub from Rust!"),
                PublisherPutOptions {
                    encoding: Encoding::TEXT_PLAIN,
                },
            )
            .await?;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    publisher.delete().await?;

    let mut replies = talker
        .get(
            "demo/status",
            GetOptions {
                timeout: Some(Duration::from_millis(500)),
            },
        )
        .await?;
    while let Some(reply) = replies.recv().await {
        println!(
            ">> Reply from {}: '{}'",
            reply.replier,
            reply.sample.payload_str()
        );
    }

    publisher.undeclare().await?;
    talker.close().await?;
    listener.close().await?;
    Ok(())
}
