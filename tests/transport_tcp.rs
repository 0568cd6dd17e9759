// tests/transport_tcp.rs

use std::time::Duration;

use tokio::time::timeout;

use mom_pubsub::{
    // ---
    Config,
    Encoding,
    Error,
    GetOptions,
    PutOptions,
    Query,
    QueryableOptions,
    RetryConfig,
    Session,
    SubscriberOptions,
    WhatAmI,
};

async fn listener(mode: WhatAmI) -> (Session, String) {
    // ---
    let config = Config::default()
        .with_mode(mode)
        .with_listen("tcp/127.0.0.1:0");
    let session = Session::open(config).await.expect("listen");
    let locator = session.info().await.unwrap().locators[0].clone();
    (session, locator)
}

/// Poll until `session` reports `n` links.
async fn wait_for_links(session: &Session, n: usize) {
    timeout(Duration::from_secs(5), async {
        loop {
            let info = session.info().await.unwrap();
            if info.peers_zid.len() + info.routers_zid.len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("links did not come up");
}

#[tokio::test]
async fn tcp_peer_delivers_to_listener() {
    // ---
    let (server, locator) = listener(WhatAmI::Peer).await;
    assert!(locator.starts_with("tcp/127.0.0.1:"));

    let mut sub = server
        .declare_subscriber_channel("demo/**", SubscriberOptions::default())
        .await
        .unwrap();

    let client = Session::open(Config::client([locator])).await.unwrap();
    wait_for_links(&server, 1).await;

    let info = client.info().await.unwrap();
    assert_eq!(info.peers_zid, vec![server.zid()]);

    client
        .put(
            "demo/example/session_move_test",
            "Session Move!",
            PutOptions {
                encoding: Encoding::TEXT_PLAIN,
                ..PutOptions::default()
            },
        )
        .await
        .unwrap();

    let sample = timeout(Duration::from_secs(2), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sample.payload_str(), "Session Move!");
    assert_eq!(sample.encoding, Encoding::TEXT_PLAIN);

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn router_forwards_between_clients() {
    // ---
    let (router, locator) = listener(WhatAmI::Router).await;

    let receiver = Session::open(Config::client([locator.clone()])).await.unwrap();
    let mut sub = receiver
        .declare_subscriber_channel("fanout/*", SubscriberOptions::default())
        .await
        .unwrap();

    let sender = Session::open(Config::client([locator])).await.unwrap();
    wait_for_links(&router, 2).await;

    assert_eq!(sender.info().await.unwrap().routers_zid, vec![router.zid()]);

    sender
        .put("fanout/1", "via router", PutOptions::default())
        .await
        .unwrap();

    let sample = timeout(Duration::from_secs(2), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sample.key_expr.as_str(), "fanout/1");
    assert_eq!(sample.payload_str(), "via router");

    sender.close().await.unwrap();
    receiver.close().await.unwrap();
    router.close().await.unwrap();
}

#[tokio::test]
async fn query_crosses_router() {
    // ---
    let (router, locator) = listener(WhatAmI::Router).await;

    let answering = Session::open(Config::client([locator.clone()])).await.unwrap();
    let _queryable = answering
        .declare_queryable(
            "sensors/**",
            |query: Query| async move {
                query
                    .reply("sensors/temp", "21.5", Encoding::APP_FLOAT)
                    .await
            },
            QueryableOptions::default(),
        )
        .await
        .unwrap();

    let asking = Session::open(Config::client([locator])).await.unwrap();
    wait_for_links(&router, 2).await;

    let replies = asking
        .get(
            "sensors/**",
            GetOptions {
                timeout: Some(Duration::from_millis(500)),
            },
        )
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].replier, answering.zid());
    assert_eq!(replies[0].sample.key_expr.as_str(), "sensors/temp");
    assert_eq!(replies[0].sample.encoding, Encoding::APP_FLOAT);

    asking.close().await.unwrap();
    answering.close().await.unwrap();
    router.close().await.unwrap();
}

#[tokio::test]
async fn client_fails_when_nobody_listens() {
    // ---
    // Grab a free port, then release it so the connect is refused.
    let port = {
        let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap().port()
    };

    let config = Config::client([format!("tcp/127.0.0.1:{port}")]).with_connect_retry(RetryConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(10),
        ..RetryConfig::default()
    });

    assert!(matches!(
        Session::open(config).await,
        Err(Error::TransportRetryable(_))
    ));
}

#[tokio::test]
async fn peer_tolerates_missing_endpoint() {
    // ---
    let port = {
        let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap().port()
    };

    let config = Config::default()
        .with_connect(format!("tcp/127.0.0.1:{port}"))
        .with_connect_retry(RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        });

    let session = Session::open(config).await.unwrap();
    assert!(session.info().await.unwrap().peers_zid.is_empty());
    session.close().await.unwrap();
}

#[tokio::test]
async fn oversized_put_is_refused_and_link_survives() {
    // ---
    let (server, locator) = listener(WhatAmI::Peer).await;
    let mut sub = server
        .declare_subscriber_channel("big/*", SubscriberOptions::default())
        .await
        .unwrap();

    let client = Session::open(Config::client([locator])).await.unwrap();
    wait_for_links(&server, 1).await;

    // 5 MiB fits in one frame
    let five_mib = vec![200u8; 5 * 1024 * 1024];
    client
        .put("big/a", five_mib.clone(), PutOptions::default())
        .await
        .unwrap();
    let sample = timeout(Duration::from_secs(5), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sample.payload.len(), five_mib.len());

    let too_big = vec![200u8; 16 * 1024 * 1024];
    assert!(matches!(
        client.put("big/b", too_big, PutOptions::default()).await,
        Err(Error::FrameTooLarge(_))
    ));

    client.put("big/c", "small", PutOptions::default()).await.unwrap();
    let sample = timeout(Duration::from_secs(2), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sample.key_expr.as_str(), "big/c");
    assert_eq!(client.info().await.unwrap().peers_zid, vec![server.zid()]);

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn negative_retry_multiplier_fails_open() {
    // ---
    let mut config = Config::client(["tcp/127.0.0.1:1"]);
    config.connect.retry.multiplier = -1.0;

    assert!(matches!(
        Session::open(config).await,
        Err(Error::InvalidConfig(_))
    ));
}
