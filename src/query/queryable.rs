use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::Query;
use crate::session::SessionInner;
use crate::transport::runner::{self, MessageConsumer};
use crate::{log_debug, Body, Interest, KeyExpr, Message, Reliability, Result};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Type-erased async query handler
///
/// Wrapped in Arc so the receive loop can own it.
type QueryHandler = Arc<dyn Fn(Query) -> BoxFuture<Result<()>> + Send + Sync>;

fn wrap_handler<F, Fut>(handler: F) -> QueryHandler
where
    F: Fn(Query) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    // ---
    Arc::new(move |query: Query| Box::pin(handler(query)) as BoxFuture<Result<()>>)
}

/// Options for [`Session::declare_queryable`](crate::Session::declare_queryable).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryableOptions {
    /// With [`Reliability::BestEffort`], queries arriving while the
    /// queryable's inbox is full are dropped instead of making the querier
    /// wait.
    pub reliability: Reliability,
}

struct QueryConsumer {
    session: Arc<SessionInner>,
    handler: QueryHandler,
}

#[async_trait::async_trait]
impl MessageConsumer for QueryConsumer {
    async fn handle_message(&self, msg: Message) -> Result<()> {
        // ---
        let Body::Query {
            qid,
            parameters,
            reply_to,
        } = msg.body
        else {
            return Ok(());
        };

        let query = Query {
            session: self.session.clone(),
            key_expr: msg.key_expr,
            parameters,
            qid,
            querier: msg.source,
            reply_to,
        };
        (self.handler)(query).await
    }
}

/// A declared queryable.
///
/// Dropping the queryable stops answering; [`Queryable::undeclare`] also
/// removes the route right away.
pub struct Queryable {
    // ---
    session: Arc<SessionInner>,
    key_expr: KeyExpr,
    route: u64,
    task: JoinHandle<()>,
}

impl Queryable {
    pub(crate) async fn declare<F, Fut>(
        session: Arc<SessionInner>,
        key_expr: KeyExpr,
        handler: F,
        opts: QueryableOptions,
    ) -> Result<Self>
    where
        F: Fn(Query) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        // ---
        session.ensure_open()?;

        let handle = session
            .transport
            .subscribe(key_expr.clone(), Interest::Queryable, opts.reliability)
            .await?;

        let consumer = QueryConsumer {
            session: session.clone(),
            handler: wrap_handler(handler),
        };
        let task = runner::run(handle.inbox, consumer);
        session.track(handle.id, task.abort_handle());

        log_debug!("{}: declared queryable on {key_expr}", session.zid);

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

    /// Stop answering and remove the route.
    pub async fn undeclare(self) -> Result<()> {
        // ---
        self.task.abort();
        self.session.undeclare_route(self.route).await
    }
}

impl Drop for Queryable {
    fn drop(&mut self) {
        self.task.abort();
        self.session.forget(self.route);
    }
}
