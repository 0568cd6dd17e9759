//! Queries and replies.
//!
//! A `get` publishes a query message carrying a per-session query id and the
//! querier's reply key (`@/session/<zid>/reply`). Every queryable whose key
//! expression intersects the query runs its handler, which may send any
//! number of replies back to that reply key. The querier's reply task
//! matches replies to pending queries by id.
//!
//! There is no final-reply marker: a reply stream ends when the query
//! timeout elapses or the querying session closes.

pub(crate) mod pending;
mod queryable;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::keyexpr::resolve;
use crate::session::SessionInner;
use crate::transport::lock_ignore_poison;
use crate::transport::runner::MessageConsumer;
use crate::{
    // ---
    log_debug,
    Body,
    CongestionControl,
    Encoding,
    Error,
    KeyExpr,
    Message,
    Priority,
    Result,
    Sample,
    SampleKind,
    ZenohId,
};
use pending::PendingQueries;

pub use queryable::{Queryable, QueryableOptions};

/// A key expression with optional parameters, written `key?params`.
///
/// Parameters are `&`-separated `name=value` pairs; a bare `name` has an
/// empty value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    pub key_expr: KeyExpr,
    pub parameters: String,
}

impl Selector {
    /// Iterate over the `name=value` pairs of the parameters.
    pub fn parameter_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        parse_parameters(&self.parameters)
    }

    /// Parameters as a map; later duplicates win.
    pub fn parameters_map(&self) -> HashMap<&str, &str> {
        self.parameter_pairs().collect()
    }
}

fn parse_parameters(parameters: &str) -> impl Iterator<Item = (&str, &str)> {
    parameters
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| p.split_once('=').unwrap_or((p, "")))
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (key, parameters) = s.split_once('?').unwrap_or((s, ""));
        Ok(Self {
            key_expr: KeyExpr::new(key)?,
            parameters: parameters.to_string(),
        })
    }
}

impl TryFrom<&str> for Selector {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        s.parse()
    }
}

impl TryFrom<String> for Selector {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<KeyExpr> for Selector {
    fn from(key_expr: KeyExpr) -> Self {
        Self {
            key_expr,
            parameters: String::new(),
        }
    }
}

impl From<&KeyExpr> for Selector {
    fn from(key_expr: &KeyExpr) -> Self {
        key_expr.clone().into()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parameters.is_empty() {
            write!(f, "{}", self.key_expr)
        } else {
            write!(f, "{}?{}", self.key_expr, self.parameters)
        }
    }
}

/// Options for [`Session::get`](crate::Session::get).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// How long to collect replies; defaults to the session's
    /// `queries_default_timeout_ms`.
    pub timeout: Option<Duration>,
}

/// A query received by a queryable.
pub struct Query {
    // ---
    session: Arc<SessionInner>,
    key_expr: KeyExpr,
    parameters: Arc<str>,
    qid: u64,
    querier: ZenohId,
    reply_to: KeyExpr,
}

impl Query {
    pub fn key_expr(&self) -> &KeyExpr {
        &self.key_expr
    }

    pub fn parameters(&self) -> &str {
        &self.parameters
    }

    /// Iterate over the `name=value` pairs of the parameters.
    pub fn parameter_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        parse_parameters(&self.parameters)
    }

    /// Id of the querying session.
    pub fn querier(&self) -> ZenohId {
        self.querier
    }

    pub fn selector(&self) -> Selector {
        Selector {
            key_expr: self.key_expr.clone(),
            parameters: self.parameters.to_string(),
        }
    }

    /// Send one reply to the querier.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidKeyExpr`] if `key_expr` does not intersect the
    ///   queried key expression.
    /// - [`Error::SessionClosed`] if the replying session was closed.
    pub async fn reply<K>(&self, key_expr: K, payload: impl Into<Bytes>, encoding: Encoding) -> Result<()>
    where
        K: TryInto<KeyExpr>,
        K::Error: Into<Error>,
    {
        // ---
        let key_expr = resolve(key_expr)?;
        if !key_expr.intersects(&self.key_expr) {
            return Err(Error::InvalidKeyExpr {
                expr: key_expr.to_string(),
                reason: "reply key does not intersect the query",
            });
        }

        let body = Body::Reply {
            qid: self.qid,
            key_expr,
            payload: payload.into(),
            encoding,
        };
        self.session
            .send(
                self.reply_to.clone(),
                body,
                CongestionControl::Block,
                Priority::Data,
            )
            .await
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("selector", &self.selector().to_string())
            .field("querier", &self.querier)
            .finish()
    }
}

/// One answer to a `get`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// Session that sent the reply.
    pub replier: ZenohId,
    pub sample: Sample,
}

/// Stream of replies to one `get`.
#[derive(Debug)]
pub struct ReplyReceiver {
    rx: mpsc::Receiver<Reply>,
}

impl ReplyReceiver {
    /// Wait for the next reply.
    ///
    /// Returns `None` once the query timed out or the session closed.
    pub async fn recv(&mut self) -> Option<Reply> {
        self.rx.recv().await
    }

    /// Wait for the end of the stream and return every reply.
    pub async fn collect(mut self) -> Vec<Reply> {
        let mut replies = Vec::new();
        while let Some(reply) = self.rx.recv().await {
            replies.push(reply);
        }
        replies
    }
}

/// Routes replies arriving on the session's reply key to pending queries.
pub(crate) struct ReplyConsumer {
    zid: ZenohId,
    pending: Arc<Mutex<PendingQueries>>,
}

impl ReplyConsumer {
    pub(crate) fn new(zid: ZenohId, pending: Arc<Mutex<PendingQueries>>) -> Self {
        Self { zid, pending }
    }
}

#[async_trait::async_trait]
impl MessageConsumer for ReplyConsumer {
    async fn handle_message(&self, msg: Message) -> Result<()> {
        // ---
        let Body::Reply {
            qid,
            key_expr,
            payload,
            encoding,
        } = msg.body
        else {
            return Ok(());
        };

        let reply = Reply {
            replier: msg.source,
            sample: Sample {
                key_expr,
                payload,
                encoding,
                kind: SampleKind::Put,
                timestamp: msg.timestamp,
            },
        };

        if !lock_ignore_poison(&self.pending).deliver(qid, reply) {
            log_debug!("{}: dropped reply to query {qid} (finished or full)", self.zid);
        }
        Ok(())
    }
}

/// Send `selector` as a query and register its reply stream.
pub(crate) async fn get(
    session: &Arc<SessionInner>,
    selector: Selector,
    opts: GetOptions,
) -> Result<ReplyReceiver> {
    // ---
    session.ensure_open()?;

    let qid = session.next_qid();
    let timeout = opts
        .timeout
        .unwrap_or_else(|| session.config.queries_default_timeout());

    let rx = lock_ignore_poison(&session.pending).register(qid, session.queue_size());

    let body = Body::Query {
        qid,
        parameters: selector.parameters.as_str().into(),
        reply_to: session.reply_key.clone(),
    };
    let sent = session
        .send(selector.key_expr.clone(), body, CongestionControl::Block, Priority::Data)
        .await;
    if let Err(err) = sent {
        lock_ignore_poison(&session.pending).remove(qid);
        return Err(err);
    }

    log_debug!("{}: query {qid} on {selector}, timeout {timeout:?}", session.zid);

    let pending = session.pending.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        lock_ignore_poison(&pending).remove(qid);
    });

    Ok(ReplyReceiver { rx })
}
