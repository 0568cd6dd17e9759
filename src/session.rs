//! Sessions.
//!
//! A [`Session`] is the entry point of the library: it owns one transport
//! and every entity (publisher, subscriber, queryable, pending query)
//! declared through it.
//!
//! ```no_run
//! use mom_pubsub::{Config, PublisherOptions, PublisherPutOptions, Encoding};
//!
//! # async fn demo() -> mom_pubsub::Result<()> {
//! let session = mom_pubsub::open(Config::default()).await?;
//! let publisher = session
//!     .declare_publisher("demo/example/session_move_test", PublisherOptions::default())
//!     .await?;
//! publisher
//!     .put(
//!         "Session Move!",
//!         PublisherPutOptions {
//!             encoding: Encoding::TEXT_PLAIN,
//!         },
//!     )
//!     .await?;
//! publisher.undeclare().await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! `Session` is a cheap handle: clones share one session. Closing it through
//! any clone closes it for all of them, after which every operation on the
//! session or on its entities returns [`Error::SessionClosed`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::task::AbortHandle;

use crate::keyexpr::resolve;
use crate::query::pending::PendingQueries;
use crate::query::{self, ReplyConsumer};
use crate::sample::Clock;
use crate::transport::{create_transport, lock_ignore_poison, runner};
use crate::{
    // ---
    create_memory_transport,
    init_logger,
    log_debug,
    log_error,
    log_info,
    Body,
    ChannelSubscriber,
    CongestionControl,
    Config,
    DeleteOptions,
    Error,
    GetOptions,
    Interest,
    KeyExpr,
    MemoryHub,
    Message,
    Priority,
    Publisher,
    PublisherOptions,
    PullSubscriber,
    PutOptions,
    Query,
    Queryable,
    QueryableOptions,
    Reliability,
    ReplyReceiver,
    Result,
    Sample,
    Selector,
    Subscriber,
    SubscriberOptions,
    TransportBase,
    TransportPtr,
    WhatAmI,
    ZenohId,
};

/// Open a session with `config`.
///
/// Shorthand for [`Session::open`].
pub async fn open(config: Config) -> Result<Session> {
    Session::open(config).await
}

/// Identity and connectivity of a session, as returned by [`Session::info`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    /// This session's id.
    pub zid: ZenohId,
    /// Ids of the reachable peers (and clients).
    pub peers_zid: Vec<ZenohId>,
    /// Ids of the reachable routers.
    pub routers_zid: Vec<ZenohId>,
    /// Endpoints this session accepts connections on.
    pub locators: Vec<String>,
}

/// State shared by a session, its clones and its entities.
pub(crate) struct SessionInner {
    pub(crate) zid: ZenohId,
    pub(crate) config: Config,
    pub(crate) transport: TransportPtr,
    pub(crate) reply_key: KeyExpr,
    pub(crate) pending: Arc<Mutex<PendingQueries>>,
    clock: Clock,
    closed: AtomicBool,
    next_qid: AtomicU64,
    /// Receive loops of callback entities, keyed by route id.
    tasks: Mutex<HashMap<u64, AbortHandle>>,
}

impl SessionInner {
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    pub(crate) fn queue_size(&self) -> usize {
        self.config.queue_size.max(1)
    }

    pub(crate) fn next_qid(&self) -> u64 {
        self.next_qid.fetch_add(1, Ordering::Relaxed)
    }

    /// Stamp `body` and publish it on `key_expr`.
    pub(crate) async fn send(
        &self,
        key_expr: KeyExpr,
        body: Body,
        congestion_control: CongestionControl,
        priority: Priority,
    ) -> Result<()> {
        // ---
        self.ensure_open()?;

        let msg = Message {
            source: self.zid,
            key_expr,
            timestamp: Some(self.clock.new_timestamp()),
            congestion_control,
            priority,
            body,
        };
        self.transport.publish(msg).await
    }

    /// Remember the receive loop of route `route` so close can stop it.
    pub(crate) fn track(&self, route: u64, task: AbortHandle) {
        lock_ignore_poison(&self.tasks).insert(route, task);
    }

    pub(crate) fn forget(&self, route: u64) {
        lock_ignore_poison(&self.tasks).remove(&route);
    }

    /// Remove route `route` from the transport.
    pub(crate) async fn undeclare_route(&self, route: u64) -> Result<()> {
        // ---
        self.ensure_open()?;
        self.forget(route);

        if !self.transport.unsubscribe(route).await? {
            log_debug!("{}: route {route} was already gone", self.zid);
        }
        Ok(())
    }

    fn abort_tasks(&self) {
        for (_, task) in lock_ignore_poison(&self.tasks).drain() {
            task.abort();
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        // ---
        self.abort_tasks();

        // Last handle dropped without close(): release the transport if a
        // runtime is still around to run the async close.
        if !self.closed.swap(true, Ordering::AcqRel) {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let transport = self.transport.clone();
                let _zid = self.zid;
                handle.spawn(async move {
                    if let Err(_err) = transport.close().await {
                        log_error!("{_zid}: closing dropped session failed: {_err}");
                    }
                });
            }
        }
    }
}

/// A session.
///
/// Cheap to clone; every clone refers to the same session.
#[derive(Clone)]
pub struct Session {
    // ---
    inner: Arc<SessionInner>,
}

impl Session {
    /// Open a session with `config`.
    ///
    /// The transport is chosen from the configured endpoints: none joins the
    /// process-wide default memory hub, `mem/<hub>` joins that hub and
    /// `tcp/<host>:<port>` listens and connects over TCP. Installs the
    /// `RUST_LOG` driven logger on first use when the `logging` feature is
    /// enabled.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidLocator`] or [`Error::InvalidConfig`] for bad
    ///   endpoints or retry policies.
    /// - Transport errors (bind failures, client connection failures).
    pub async fn open(config: Config) -> Result<Self> {
        // ---
        init_logger();

        let transport = create_transport(&config).await?;
        Self::with_transport(config, transport).await
    }

    /// Open a session on a caller-provided memory hub.
    ///
    /// Lets tests run isolated buses without naming them. `config` must
    /// not carry endpoints.
    pub async fn open_on_hub(config: Config, hub: Arc<MemoryHub>) -> Result<Self> {
        // ---
        init_logger();

        if !config.connect.endpoints.is_empty() || !config.listen.endpoints.is_empty() {
            return Err(Error::InvalidConfig(
                "open_on_hub expects a config without endpoints".into(),
            ));
        }
        config.validate()?;

        let transport = create_memory_transport(TransportBase::from_config(&config), hub).await?;
        Self::with_transport(config, transport).await
    }

    async fn with_transport(config: Config, transport: TransportPtr) -> Result<Self> {
        // ---
        let zid = transport.zid();
        let pending = Arc::new(Mutex::new(PendingQueries::new()));

        let declared = async {
            let reply_key = KeyExpr::new(format!("@/session/{zid}/reply"))?;
            let route = transport
                .subscribe(reply_key.clone(), Interest::Reply, Reliability::Reliable)
                .await?;
            Ok::<_, Error>((reply_key, route))
        }
        .await;

        let (reply_key, route) = match declared {
            Ok(declared) => declared,
            Err(err) => {
                let _ = transport.close().await;
                return Err(err);
            }
        };

        let task = runner::run(route.inbox, ReplyConsumer::new(zid, pending.clone()));

        let inner = SessionInner {
            zid,
            config,
            transport,
            reply_key,
            pending,
            clock: Clock::new(zid),
            closed: AtomicBool::new(false),
            next_qid: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        };
        inner.track(route.id, task.abort_handle());

        log_info!("{zid}: session open as {}", inner.config.mode);

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// This session's id.
    pub fn zid(&self) -> ZenohId {
        self.inner.zid
    }

    /// The configuration the session was opened with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// `true` once [`Session::close`] ran through any clone.
    pub fn is_closed(&self) -> bool {
        self.inner.ensure_open().is_err()
    }

    /// Identity, reachable sessions and listening endpoints.
    pub async fn info(&self) -> Result<SessionInfo> {
        // ---
        self.inner.ensure_open()?;

        let (routers, peers): (Vec<_>, Vec<_>) = self
            .inner
            .transport
            .links()
            .await
            .into_iter()
            .partition(|link| link.whatami == WhatAmI::Router);

        Ok(SessionInfo {
            zid: self.inner.zid,
            peers_zid: peers.into_iter().map(|l| l.zid).collect(),
            routers_zid: routers.into_iter().map(|l| l.zid).collect(),
            locators: self.inner.transport.locators(),
        })
    }

    /// Publish `payload` on `key_expr` without declaring a publisher.
    pub async fn put<K>(&self, key_expr: K, payload: impl Into<Bytes>, opts: PutOptions) -> Result<()>
    where
        K: TryInto<KeyExpr>,
        K::Error: Into<Error>,
    {
        // ---
        let key_expr = resolve(key_expr)?;
        let body = Body::Put {
            payload: payload.into(),
            encoding: opts.encoding,
        };
        self.inner
            .send(key_expr, body, opts.congestion_control, opts.priority)
            .await
    }

    /// Publish a deletion of `key_expr`.
    pub async fn delete<K>(&self, key_expr: K, opts: DeleteOptions) -> Result<()>
    where
        K: TryInto<KeyExpr>,
        K::Error: Into<Error>,
    {
        // ---
        let key_expr = resolve(key_expr)?;
        self.inner
            .send(key_expr, Body::Delete, opts.congestion_control, opts.priority)
            .await
    }

    /// Declare a publisher on `key_expr`.
    pub async fn declare_publisher<K>(&self, key_expr: K, opts: PublisherOptions) -> Result<Publisher>
    where
        K: TryInto<KeyExpr>,
        K::Error: Into<Error>,
    {
        // ---
        self.inner.ensure_open()?;
        let key_expr = resolve(key_expr)?;

        log_debug!("{}: declared publisher on {key_expr}", self.inner.zid);
        Ok(Publisher::new(self.inner.clone(), key_expr, opts))
    }

    /// Declare a subscriber calling `callback` for every matching sample.
    ///
    /// Samples are delivered one at a time, in arrival order, on a task
    /// owned by the subscriber.
    pub async fn declare_subscriber<K, F>(
        &self,
        key_expr: K,
        callback: F,
        opts: SubscriberOptions,
    ) -> Result<Subscriber>
    where
        K: TryInto<KeyExpr>,
        K::Error: Into<Error>,
        F: Fn(Sample) + Send + Sync + 'static,
    {
        // ---
        let key_expr = resolve(key_expr)?;
        Subscriber::declare(self.inner.clone(), key_expr, Arc::new(callback), opts).await
    }

    /// Declare a subscriber whose samples are read with
    /// [`ChannelSubscriber::recv`].
    pub async fn declare_subscriber_channel<K>(
        &self,
        key_expr: K,
        opts: SubscriberOptions,
    ) -> Result<ChannelSubscriber>
    where
        K: TryInto<KeyExpr>,
        K::Error: Into<Error>,
    {
        // ---
        let key_expr = resolve(key_expr)?;
        ChannelSubscriber::declare(self.inner.clone(), key_expr, opts).await
    }

    /// Declare a subscriber that queues samples until
    /// [`PullSubscriber::pull`] hands them to `callback`.
    pub async fn declare_pull_subscriber<K, F>(
        &self,
        key_expr: K,
        callback: F,
        opts: SubscriberOptions,
    ) -> Result<PullSubscriber>
    where
        K: TryInto<KeyExpr>,
        K::Error: Into<Error>,
        F: Fn(Sample) + Send + Sync + 'static,
    {
        // ---
        let key_expr = resolve(key_expr)?;
        PullSubscriber::declare(self.inner.clone(), key_expr, Arc::new(callback), opts).await
    }

    /// Declare a queryable answering queries on `key_expr` with `handler`.
    ///
    /// Queries are handled one at a time. A handler error is logged and the
    /// queryable keeps serving.
    pub async fn declare_queryable<K, F, Fut>(
        &self,
        key_expr: K,
        handler: F,
        opts: QueryableOptions,
    ) -> Result<Queryable>
    where
        K: TryInto<KeyExpr>,
        K::Error: Into<Error>,
        F: Fn(Query) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        // ---
        let key_expr = resolve(key_expr)?;
        Queryable::declare(self.inner.clone(), key_expr, handler, opts).await
    }

    /// Query `selector` and stream the replies.
    ///
    /// The returned receiver ends when the timeout elapses or the session
    /// closes.
    pub async fn get<S>(&self, selector: S, opts: GetOptions) -> Result<ReplyReceiver>
    where
        S: TryInto<Selector>,
        S::Error: Into<Error>,
    {
        // ---
        let selector = selector.try_into().map_err(Into::into)?;
        query::get(&self.inner, selector, opts).await
    }

    /// Close the session.
    ///
    /// Stops every receive loop, ends pending queries and closes the
    /// transport, which removes all routes of this session.
    ///
    /// # Errors
    ///
    /// [`Error::SessionClosed`] if the session was already closed through
    /// another clone. Transport close errors are passed through.
    pub async fn close(self) -> Result<()> {
        // ---
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::SessionClosed);
        }

        log_debug!("{}: closing session...", self.inner.zid);

        self.inner.abort_tasks();
        lock_ignore_poison(&self.inner.pending).clear();
        self.inner.transport.close().await?;

        log_info!("{}: session closed", self.inner.zid);
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("zid", &self.inner.zid)
            .field("mode", &self.inner.config.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    async fn isolated() -> Session {
        Session::open_on_hub(Config::default(), MemoryHub::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_uses_configured_id() {
        // ---
        let id = ZenohId::generate();
        let session = Session::open_on_hub(Config::default().with_id(id), MemoryHub::new())
            .await
            .unwrap();
        assert_eq!(session.zid(), id);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_on_hub_rejects_endpoints() {
        // ---
        let config = Config::default().with_connect("mem/elsewhere");
        assert!(matches!(
            Session::open_on_hub(config, MemoryHub::new()).await,
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_close_through_clone() {
        // ---
        let session = isolated().await;
        let clone = session.clone();

        clone.close().await.unwrap();
        assert!(session.is_closed());
        assert!(matches!(
            session.put("a", "x", PutOptions::default()).await,
            Err(Error::SessionClosed)
        ));
        assert!(matches!(session.close().await, Err(Error::SessionClosed)));
    }

    #[tokio::test]
    async fn test_timestamps_increase() {
        // ---
        let session = isolated().await;
        let a = session.inner.clock.new_timestamp();
        let b = session.inner.clock.new_timestamp();
        assert!(b > a);
        assert_eq!(a.id, session.zid());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_info_lists_hub_members() {
        // ---
        let hub = MemoryHub::new();
        let peer = Session::open_on_hub(Config::default(), hub.clone())
            .await
            .unwrap();
        let router = Session::open_on_hub(Config::default().with_mode(WhatAmI::Router), hub)
            .await
            .unwrap();

        let info = peer.info().await.unwrap();
        assert_eq!(info.zid, peer.zid());
        assert_eq!(info.routers_zid, vec![router.zid()]);
        assert!(info.peers_zid.is_empty());
        assert_eq!(info.locators, vec!["mem/anonymous"]);

        router.close().await.unwrap();
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_key_expr_is_reported() {
        // ---
        let session = isolated().await;
        assert!(matches!(
            session.put("a//b", "x", PutOptions::default()).await,
            Err(Error::InvalidKeyExpr { .. })
        ));
        session.close().await.unwrap();
    }
}
