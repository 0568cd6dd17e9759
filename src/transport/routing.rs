//! Local routing table.
//!
//! Every transport keeps the routes declared by the sessions it serves in a
//! [`Routes`] table and hands inbound and locally published messages to
//! [`Routes::dispatch`]. Matching is the reference semantics for the whole
//! crate: a route receives a message when the route's [`Interest`] equals
//! the interest implied by the message body and the two key expressions
//! intersect.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;

use crate::domain::{
    //
    CongestionControl,
    Interest,
    Message,
    Reliability,
    SubscriptionHandle,
};
use crate::{log_debug, KeyExpr, ZenohId};

/// Route ids are unique per process, so a hub shared by several sessions
/// never hands out the same id twice.
static NEXT_ROUTE_ID: AtomicU64 = AtomicU64::new(1);

struct Route {
    id: u64,
    owner: ZenohId,
    key_expr: KeyExpr,
    interest: Interest,
    reliability: Reliability,
    tx: mpsc::Sender<Message>,
}

/// Routes declared on one transport (or one shared hub).
pub(crate) struct Routes {
    // ---
    table: RwLock<Vec<Route>>,
}

impl Routes {
    pub(crate) fn new() -> Self {
        Self {
            table: RwLock::new(Vec::new()),
        }
    }

    /// Register a route owned by `owner`.
    ///
    /// Once this returns, any subsequent matching dispatch is delivered to
    /// the returned inbox.
    pub(crate) async fn insert(
        &self,
        owner: ZenohId,
        key_expr: KeyExpr,
        interest: Interest,
        reliability: Reliability,
        capacity: usize,
    ) -> SubscriptionHandle {
        // ---
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = NEXT_ROUTE_ID.fetch_add(1, Ordering::Relaxed);

        log_debug!("{owner}: route {id} {interest:?} on {key_expr}");

        self.table.write().await.push(Route {
            id,
            owner,
            key_expr,
            interest,
            reliability,
            tx,
        });

        SubscriptionHandle { id, inbox: rx }
    }

    /// Remove route `id` if it belongs to `owner`.
    pub(crate) async fn remove(&self, owner: ZenohId, id: u64) -> bool {
        let mut table = self.table.write().await;
        let before = table.len();
        table.retain(|r| !(r.id == id && r.owner == owner));
        before != table.len()
    }

    /// Remove every route owned by `owner`; returns how many were removed.
    pub(crate) async fn remove_owner(&self, owner: ZenohId) -> usize {
        let mut table = self.table.write().await;
        let before = table.len();
        table.retain(|r| r.owner != owner);
        before - table.len()
    }

    /// Remove every route.
    pub(crate) async fn clear(&self) {
        self.table.write().await.clear();
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    /// Deliver `msg` to every matching route; returns the number of inboxes
    /// that accepted it.
    ///
    /// Senders are collected under the read lock and the lock is released
    /// before any send is awaited, so a receiver that declares or removes
    /// routes from its callback cannot deadlock a blocked publisher.
    pub(crate) async fn dispatch(&self, msg: &Message) -> usize {
        // ---
        let interest = msg.interest();

        let (targets, saw_closed) = {
            let table = self.table.read().await;
            let mut saw_closed = false;
            let targets: Vec<(u64, Reliability, mpsc::Sender<Message>)> = table
                .iter()
                .filter(|r| {
                    if r.tx.is_closed() {
                        saw_closed = true;
                        return false;
                    }
                    r.interest == interest && r.key_expr.intersects(&msg.key_expr)
                })
                .map(|r| (r.id, r.reliability, r.tx.clone()))
                .collect();
            (targets, saw_closed)
        };

        let mut delivered = 0;

        for (_id, reliability, tx) in targets {
            let may_drop = reliability == Reliability::BestEffort
                || msg.congestion_control == CongestionControl::Drop;

            if may_drop {
                match tx.try_send(msg.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        log_debug!("route {_id}: inbox full, dropped message on {}", msg.key_expr);
                    }
                    Err(TrySendError::Closed(_)) => {}
                }
            } else if tx.send(msg.clone()).await.is_ok() {
                delivered += 1;
            }
        }

        if saw_closed {
            // A closed inbox means the handle was dropped without unsubscribe.
            self.table.write().await.retain(|r| !r.tx.is_closed());
        }

        delivered
    }
}
