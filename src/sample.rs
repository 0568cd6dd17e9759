//! Samples and timestamps.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::{Body, Message};
use crate::{Encoding, KeyExpr, ZenohId};

/// What a sample represents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleKind {
    /// A new value for the key.
    #[default]
    Put,
    /// The key's value was removed.
    Delete,
}

/// Point in time stamped by a session.
///
/// Ordered first by time, then by the id of the session that produced it,
/// so timestamps from different sessions never compare equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Nanoseconds since the UNIX epoch.
    pub time: u64,
    /// Session that produced the timestamp.
    pub id: ZenohId,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.time, self.id)
    }
}

/// Monotonic timestamp source owned by a session.
///
/// Each timestamp is strictly greater than the previous one, even if the
/// wall clock stalls or steps backwards.
#[derive(Debug)]
pub(crate) struct Clock {
    id: ZenohId,
    last: AtomicU64,
}

impl Clock {
    pub(crate) fn new(id: ZenohId) -> Self {
        Self {
            id,
            last: AtomicU64::new(0),
        }
    }

    pub(crate) fn new_timestamp(&self) -> Timestamp {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    return Timestamp {
                        time: next,
                        id: self.id,
                    }
                }
                Err(actual) => prev = actual,
            }
        }
    }
}

/// A value delivered to subscribers and query callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    /// Key the value was published on.
    pub key_expr: KeyExpr,
    /// Raw payload; empty for [`SampleKind::Delete`].
    pub payload: Bytes,
    /// Content type declared by the publisher.
    pub encoding: Encoding,
    /// Put or delete.
    pub kind: SampleKind,
    /// When the publisher emitted the sample.
    pub timestamp: Option<Timestamp>,
}

impl Sample {
    /// Payload as UTF-8 text, replacing invalid sequences.
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// The sample carried by a put or delete message; `None` for queries
    /// and replies.
    pub(crate) fn from_message(msg: Message) -> Option<Self> {
        let (payload, encoding, kind) = match msg.body {
            Body::Put { payload, encoding } => (payload, encoding, SampleKind::Put),
            Body::Delete => (Bytes::new(), Encoding::EMPTY, SampleKind::Delete),
            Body::Query { .. } | Body::Reply { .. } => return None,
        };
        Some(Self {
            key_expr: msg.key_expr,
            payload,
            encoding,
            kind,
            timestamp: msg.timestamp,
        })
    }
}
