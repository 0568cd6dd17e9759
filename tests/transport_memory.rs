// tests/transport_memory.rs

use bytes::Bytes;
use tokio::time::{timeout, Duration};

use mom_pubsub::{
    // ---
    create_memory_transport,
    Body,
    CongestionControl,
    Encoding,
    Interest,
    KeyExpr,
    MemoryHub,
    Message,
    Priority,
    Reliability,
    TransportBase,
    WhatAmI,
    ZenohId,
    DEFAULT_QUEUE_SIZE,
};

fn base() -> TransportBase {
    TransportBase::new(ZenohId::generate(), WhatAmI::Peer, DEFAULT_QUEUE_SIZE)
}

fn put(source: ZenohId, key: &str, payload: &'static [u8]) -> Message {
    Message {
        source,
        key_expr: KeyExpr::new(key).unwrap(),
        timestamp: None,
        congestion_control: CongestionControl::Block,
        priority: Priority::Data,
        body: Body::Put {
            payload: Bytes::from_static(payload),
            encoding: Encoding::APP_OCTET_STREAM,
        },
    }
}

#[tokio::test]
async fn memory_subscribe_then_publish_delivers() {
    // ---
    // Arrange
    // ---
    let hub = MemoryHub::named("mstpd");

    let publisher = create_memory_transport(base(), hub.clone())
        .await
        .expect("failed to create memory transport");
    let subscriber = create_memory_transport(base(), hub)
        .await
        .expect("failed to create memory transport");

    let mut sub = subscriber
        .subscribe(
            KeyExpr::new("test/**").unwrap(),
            Interest::Subscriber,
            Reliability::Reliable,
        )
        .await
        .expect("subscribe failed");

    let msg = put(publisher.zid(), "test/address", b"hello");

    // ---
    // Act
    // ---
    publisher.publish(msg.clone()).await.expect("publish failed");

    // ---
    // Assert
    // ---
    let received = timeout(Duration::from_millis(100), sub.inbox.recv())
        .await
        .expect("timed out waiting for message")
        .expect("subscription channel closed unexpectedly");

    assert_eq!(received, msg);
    assert_eq!(received.source, publisher.zid());

    publisher.close().await.unwrap();
    subscriber.close().await.unwrap();
}

#[tokio::test]
async fn memory_unsubscribe_stops_delivery() {
    // ---
    // Arrange
    // ---
    let transport = create_memory_transport(base(), MemoryHub::new())
        .await
        .unwrap();

    let mut sub = transport
        .subscribe(
            KeyExpr::new("a/*").unwrap(),
            Interest::Subscriber,
            Reliability::Reliable,
        )
        .await
        .unwrap();

    // ---
    // Act
    // ---
    assert!(transport.unsubscribe(sub.id).await.unwrap());
    assert!(!transport.unsubscribe(sub.id).await.unwrap());
    transport
        .publish(put(transport.zid(), "a/b", b"late"))
        .await
        .unwrap();

    // ---
    // Assert
    // ---
    assert!(sub.inbox.recv().await.is_none());

    transport.close().await.unwrap();
}

#[tokio::test]
async fn memory_close_only_removes_own_routes() {
    // ---
    // Arrange
    // ---
    let hub = MemoryHub::new();
    let staying = create_memory_transport(base(), hub.clone()).await.unwrap();
    let leaving = create_memory_transport(base(), hub.clone()).await.unwrap();

    let key = KeyExpr::new("shared").unwrap();
    let mut kept = staying
        .subscribe(key.clone(), Interest::Subscriber, Reliability::Reliable)
        .await
        .unwrap();
    let mut closed = leaving
        .subscribe(key, Interest::Subscriber, Reliability::Reliable)
        .await
        .unwrap();
    assert_eq!(hub.member_count().await, 2);

    // ---
    // Act
    // ---
    leaving.close().await.unwrap();
    staying
        .publish(put(staying.zid(), "shared", b"still here"))
        .await
        .unwrap();

    // ---
    // Assert
    // ---
    assert!(closed.inbox.recv().await.is_none());
    assert_eq!(
        kept.inbox.recv().await.map(|m| m.body),
        Some(Body::Put {
            payload: Bytes::from_static(b"still here"),
            encoding: Encoding::APP_OCTET_STREAM,
        })
    );
    assert_eq!(hub.member_count().await, 1);
    assert!(staying.links().await.is_empty());

    staying.close().await.unwrap();
}
