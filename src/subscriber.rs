//! Subscribers.
//!
//! Three delivery styles share one route mechanism:
//!
//! - [`Subscriber`]: a callback runs for each sample on a task owned by the
//!   subscriber.
//! - [`ChannelSubscriber`]: samples are read with [`ChannelSubscriber::recv`].
//! - [`PullSubscriber`]: samples wait in the route inbox until
//!   [`PullSubscriber::pull`] hands them to the callback.
//!
//! In every case the route inbox holds at most `queue_size` samples;
//! overflow follows the [`Reliability`] of the subscriber and the
//! congestion control of the publisher.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::session::SessionInner;
use crate::transport::runner::{self, MessageConsumer};
use crate::{log_debug, Interest, KeyExpr, Message, Reliability, Result, Sample};

pub(crate) type SampleCallback = Arc<dyn Fn(Sample) + Send + Sync>;

/// Options for every kind of subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubscriberOptions {
    /// Defaults to [`Reliability::Reliable`].
    pub reliability: Reliability,
}

struct SampleConsumer {
    callback: SampleCallback,
}

#[async_trait::async_trait]
impl MessageConsumer for SampleConsumer {
    async fn handle_message(&self, msg: Message) -> Result<()> {
        if let Some(sample) = Sample::from_message(msg) {
            (self.callback)(sample);
        }
        Ok(())
    }
}

/// Callback subscriber.
///
/// Dropping the subscriber stops delivery; [`Subscriber::undeclare`] also
/// removes the route right away.
pub struct Subscriber {
    // ---
    session: Arc<SessionInner>,
    key_expr: KeyExpr,
    route: u64,
    task: JoinHandle<()>,
}

impl Subscriber {
    pub(crate) async fn declare(
        session: Arc<SessionInner>,
        key_expr: KeyExpr,
        callback: SampleCallback,
        opts: SubscriberOptions,
    ) -> Result<Self> {
        // ---
        session.ensure_open()?;

        let handle = session
            .transport
            .subscribe(key_expr.clone(), Interest::Subscriber, opts.reliability)
            .await?;
        let task = runner::run(handle.inbox, SampleConsumer { callback });
        session.track(handle.id, task.abort_handle());

        log_debug!("{}: declared subscriber on {key_expr}", session.zid);

        Ok(Self {
            session,
            key_expr,
            route: handle.id,
            task,
        })
    }

    pub fn key_expr(&self) -> &KeyExpr {
        &self.key_expr
    }

    /// Stop delivery and remove the subscription.
    pub async fn undeclare(self) -> Result<()> {
        // ---
        self.task.abort();
        self.session.undeclare_route(self.route).await
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.task.abort();
        self.session.forget(self.route);
    }
}

/// Subscriber read as a stream of samples.
pub struct ChannelSubscriber {
    // ---
    session: Arc<SessionInner>,
    key_expr: KeyExpr,
    route: u64,
    inbox: mpsc::Receiver<Message>,
}

impl ChannelSubscriber {
    pub(crate) async fn declare(
        session: Arc<SessionInner>,
        key_expr: KeyExpr,
        opts: SubscriberOptions,
    ) -> Result<Self> {
        // ---
        session.ensure_open()?;

        let handle = session
            .transport
            .subscribe(key_expr.clone(), Interest::Subscriber, opts.reliability)
            .await?;

        log_debug!("{}: declared channel subscriber on {key_expr}", session.zid);

        Ok(Self {
            session,
            key_expr,
            route: handle.id,
            inbox: handle.inbox,
        })
    }

    pub fn key_expr(&self) -> &KeyExpr {
        &self.key_expr
    }

    /// Wait for the next sample.
    ///
    /// Returns `None` once the session is closed.
    pub async fn recv(&mut self) -> Option<Sample> {
        // ---
        while let Some(msg) = self.inbox.recv().await {
            if let Some(sample) = Sample::from_message(msg) {
                return Some(sample);
            }
        }
        None
    }

    /// The next queued sample, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<Sample> {
        // ---
        while let Ok(msg) = self.inbox.try_recv() {
            if let Some(sample) = Sample::from_message(msg) {
                return Some(sample);
            }
        }
        None
    }

    /// Remove the subscription.
    pub async fn undeclare(self) -> Result<()> {
        self.session.undeclare_route(self.route).await
    }
}

/// Subscriber whose samples are delivered on demand.
pub struct PullSubscriber {
    // ---
    session: Arc<SessionInner>,
    key_expr: KeyExpr,
    route: u64,
    inbox: mpsc::Receiver<Message>,
    callback: SampleCallback,
}

impl PullSubscriber {
    pub(crate) async fn declare(
        session: Arc<SessionInner>,
        key_expr: KeyExpr,
        callback: SampleCallback,
        opts: SubscriberOptions,
    ) -> Result<Self> {
        // ---
        session.ensure_open()?;

        let handle = session
            .transport
            .subscribe(key_expr.clone(), Interest::Subscriber, opts.reliability)
            .await?;

        log_debug!("{}: declared pull subscriber on {key_expr}", session.zid);

        Ok(Self {
            session,
            key_expr,
            route: handle.id,
            inbox: handle.inbox,
            callback,
        })
    }

    pub fn key_expr(&self) -> &KeyExpr {
        &self.key_expr
    }

    /// Hand every queued sample to the callback; returns how many were
    /// delivered.
    pub async fn pull(&mut self) -> Result<usize> {
        // ---
        self.session.ensure_open()?;

        let mut delivered = 0;
        while let Ok(msg) = self.inbox.try_recv() {
            if let Some(sample) = Sample::from_message(msg) {
                (self.callback)(sample);
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Remove the subscription, discarding queued samples.
    pub async fn undeclare(self) -> Result<()> {
        self.session.undeclare_route(self.route).await
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{Config, Error, MemoryHub, PutOptions, Session};
    use std::sync::Mutex;
    use std::time::Duration;

    async fn isolated() -> Session {
        Session::open_on_hub(Config::default(), MemoryHub::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_pull_drains_queue() {
        // ---
        let session = isolated().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut sub = session
            .declare_pull_subscriber(
                "pull/**",
                move |s: Sample| sink.lock().unwrap().push(s.payload_str().into_owned()),
                SubscriberOptions::default(),
            )
            .await
            .unwrap();

        for i in 0..3 {
            session
                .put(format!("pull/{i}"), i.to_string(), PutOptions::default())
                .await
                .unwrap();
        }

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(sub.pull().await.unwrap(), 3);
        assert_eq!(*seen.lock().unwrap(), vec!["0", "1", "2"]);
        assert_eq!(sub.pull().await.unwrap(), 0);

        sub.undeclare().await.unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_ends_on_close() {
        // ---
        let session = isolated().await;
        let mut sub = session
            .declare_subscriber_channel("chan", SubscriberOptions::default())
            .await
            .unwrap();
        assert!(sub.try_recv().is_none());

        session.clone().close().await.unwrap();

        let next = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap();
        assert!(next.is_none());
        assert!(matches!(sub.undeclare().await, Err(Error::SessionClosed)));
    }

    #[tokio::test]
    async fn test_undeclared_subscriber_gets_nothing() {
        // ---
        let session = isolated().await;
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();

        let sub = session
            .declare_subscriber(
                "quiet",
                move |_| *counter.lock().unwrap() += 1,
                SubscriberOptions::default(),
            )
            .await
            .unwrap();
        sub.undeclare().await.unwrap();

        session.put("quiet", "x", PutOptions::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*count.lock().unwrap(), 0);

        session.close().await.unwrap();
    }
}
