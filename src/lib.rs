//! Publish/subscribe sessions over pluggable transports
//!
//! This library provides sessions that publish samples on key expressions,
//! subscribe to key expressions (with `*` and `**` wildcards), and answer or
//! issue queries. Sessions exchange messages through an in-process memory
//! hub or over TCP links.
//!
//! ```no_run
//! use mom_pubsub::{Config, Encoding, PublisherOptions, PublisherPutOptions};
//!
//! # async fn demo() -> mom_pubsub::Result<()> {
//! let session = mom_pubsub::open(Config::default()).await?;
//! let publisher = session
//!     .declare_publisher("demo/example/session_move_test", PublisherOptions::default())
//!     .await?;
//! publisher
//!     .put("Session Move!", PublisherPutOptions { encoding: Encoding::TEXT_PLAIN })
//!     .await?;
//! publisher.undeclare().await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod macros;

mod domain;
mod publisher;
mod query;
mod session;
mod subscriber;
mod transport;

mod config;
mod encoding;
mod error;
mod keyexpr;
mod retry;
mod sample;
mod zid;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use session::{open, Session, SessionInfo};

pub use publisher::{DeleteOptions, Publisher, PublisherOptions, PublisherPutOptions, PutOptions};
pub use subscriber::{ChannelSubscriber, PullSubscriber, Subscriber, SubscriberOptions};

pub use query::{GetOptions, Query, Queryable, QueryableOptions, Reply, ReplyReceiver, Selector};

pub use config::{
    //
    Config,
    EndpointConfig,
    WhatAmI,
    DEFAULT_QUERY_TIMEOUT_MS,
    DEFAULT_QUEUE_SIZE,
};
pub use retry::{Backoff, RetryConfig};

pub use encoding::{Encoding, KnownEncoding};
pub use error::{Error, Result};
pub use keyexpr::{canonize, is_canon, KeyExpr};
pub use sample::{Sample, SampleKind, Timestamp};
pub use zid::ZenohId;

pub use macros::init_logger;

pub use transport::{create_memory_transport, MemoryHub, DEFAULT_HUB};

// --- public re-exports
pub use domain::{
    //
    Body,
    CongestionControl,
    Interest,
    Link,
    Message,
    Priority,
    Reliability,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
};
