// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the domain-level transport interface used by the
//! session layer to exchange messages. It intentionally avoids any reference
//! to concrete sockets, hubs, or framing.
//!
//! The transport layer is responsible only for delivering [`Message`]s to the
//! local routes whose key expression intersects the message key and whose
//! [`Interest`] matches the message body. Higher-level semantics such as
//! samples, query correlation and timeouts are handled by the session.
//!
//! Concrete implementations of this interface live under `src/transport/`.
use crate::{Config, Encoding, KeyExpr, Result, Timestamp, WhatAmI, ZenohId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// What kind of traffic a local route receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interest {
    /// Puts and deletes.
    Subscriber,
    /// Queries.
    Queryable,
    /// Replies addressed to this session.
    Reply,
}

/// Delivery guarantee requested by a subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reliability {
    /// Samples may be dropped when the subscriber falls behind.
    BestEffort,
    /// Publishers wait for inbox space instead of dropping samples, unless
    /// they were declared with [`CongestionControl::Drop`].
    #[default]
    Reliable,
}

/// What a publisher does when a receiving inbox is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CongestionControl {
    /// Wait for space.
    Block,
    /// Drop the message for that receiver.
    #[default]
    Drop,
}

/// Message priority, highest first.
///
/// Carried end to end and exposed to receivers; the bundled transports
/// deliver in publication order regardless of priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Priority {
    RealTime = 1,
    InteractiveHigh = 2,
    InteractiveLow = 3,
    DataHigh = 4,
    #[default]
    Data = 5,
    DataLow = 6,
    Background = 7,
}

/// Message body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Body {
    /// New value for the message key.
    Put {
        #[serde(with = "payload_base64")]
        payload: Bytes,
        encoding: Encoding,
    },

    /// Removal of the message key.
    Delete,

    /// Query on the message key.
    ///
    /// `reply_to` is the reply inbox of the querying session; every reply
    /// carries `qid` back so the caller can route it to the pending `get`.
    Query {
        qid: u64,
        parameters: Arc<str>,
        reply_to: KeyExpr,
    },

    /// Answer to query `qid`, published on the querier's reply inbox.
    Reply {
        qid: u64,
        key_expr: KeyExpr,
        #[serde(with = "payload_base64")]
        payload: Bytes,
        encoding: Encoding,
    },
}

/// Payloads are carried as base64 strings so serialized messages stay close
/// to the payload size.
mod payload_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(payload: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(payload))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD
            .decode(text.as_bytes())
            .map(Bytes::from)
            .map_err(|e| serde::de::Error::custom(format!("invalid base64 payload: {e}")))
    }
}

/// The unit exchanged between sessions.
///
/// The transport routes on `key_expr` and on the [`Interest`] implied by the
/// body; it never interprets the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Session that emitted the message.
    pub source: ZenohId,
    /// Routing key.
    pub key_expr: KeyExpr,
    /// Emission time.
    pub timestamp: Option<Timestamp>,
    /// Behavior on full inboxes.
    pub congestion_control: CongestionControl,
    /// Priority requested by the publisher.
    pub priority: Priority,
    /// Payload and kind.
    pub body: Body,
}

impl Message {
    /// Which routes this message is delivered to.
    pub fn interest(&self) -> Interest {
        match self.body {
            Body::Put { .. } | Body::Delete => Interest::Subscriber,
            Body::Query { .. } => Interest::Queryable,
            Body::Reply { .. } => Interest::Reply,
        }
    }
}

/// Remote session reachable from a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Remote session id.
    pub zid: ZenohId,
    /// Remote role.
    pub whatami: WhatAmI,
}

/// Shared base state for all transport implementations.
///
/// Embeds common fields so that default `Transport` trait implementations
/// can delegate to this struct rather than repeating logic in each transport.
///
/// # Usage
///
/// Each concrete transport embeds this as a field named `base`:
///
/// ```ignore
/// struct TcpTransport {
///     base: TransportBase,
///     // ... tcp specific fields
/// }
///
/// impl Transport for TcpTransport {
///     fn base(&self) -> &TransportBase { &self.base }
/// }
/// ```
#[derive(Clone, Debug)]
pub struct TransportBase {
    /// Id of the owning session.
    pub zid: ZenohId,
    /// Role of the owning session.
    pub mode: WhatAmI,
    /// Capacity of each route inbox.
    pub queue_size: usize,
}

impl TransportBase {
    /// Create a new TransportBase.
    pub fn new(zid: ZenohId, mode: WhatAmI, queue_size: usize) -> Self {
        Self {
            zid,
            mode,
            queue_size,
        }
    }

    /// Base state for `config`, generating a session id if the config has none.
    pub fn from_config(config: &Config) -> Self {
        // ---
        Self::new(
            config.id.unwrap_or_else(ZenohId::generate),
            config.mode,
            config.queue_size.max(1),
        )
    }
}

/// Handle returned from a successful subscription.
///
/// The route remains active until either:
/// - [`Transport::unsubscribe`] is called with `id`
/// - The inbox receiver is dropped (the route is pruned on the next dispatch)
/// - The transport is closed
pub struct SubscriptionHandle {
    // ---
    /// Route identifier, unique within the transport.
    pub id: u64,
    /// Receiver channel for delivered messages matching this route.
    pub inbox: mpsc::Receiver<Message>,
}

/// Transport abstraction.
///
/// A `Transport` delivers messages between the sessions it links, with
/// stronger semantics provided by higher layers.
///
/// Implementations must ensure that:
/// - Once `subscribe()` returns successfully, messages published *after* that
///   point and matching the route are deliverable, including messages
///   published by the same transport.
/// - Messages from one publisher reach one route in publication order.
/// - A route whose inbox is full drops the message when either the route is
///   [`Reliability::BestEffort`] or the message is
///   [`CongestionControl::Drop`]; otherwise `publish()` waits for space.
///
/// The in-memory transport serves as the reference implementation of these
/// semantics.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. This is an implementation detail; consumers
/// should treat methods as normal `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Id of the owning session.
    fn zid(&self) -> ZenohId {
        self.base().zid
    }

    /// Role of the owning session.
    fn mode(&self) -> WhatAmI {
        self.base().mode
    }

    /// Deliver `msg` to every matching local route and to linked sessions.
    async fn publish(&self, msg: Message) -> Result<()>;

    /// Register a route and return a handle for receiving messages.
    async fn subscribe(
        &self,
        key_expr: KeyExpr,
        interest: Interest,
        reliability: Reliability,
    ) -> Result<SubscriptionHandle>;

    /// Remove a route. Returns `false` if it was already gone.
    async fn unsubscribe(&self, id: u64) -> Result<bool>;

    /// Remote sessions currently reachable.
    async fn links(&self) -> Vec<Link>;

    /// Endpoints this transport accepts connections on.
    fn locators(&self) -> Vec<String>;

    /// Close the transport and release any associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// This is an `Arc<dyn Transport>`, which means:
/// - `.clone()` is cheap (only increments a reference count)
/// - Multiple clones share the same underlying links
/// - Used to erase concrete transport types behind a stable domain interface.
pub type TransportPtr = Arc<dyn Transport>;
