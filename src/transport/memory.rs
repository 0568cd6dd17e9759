//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait. It is intended for single-process applications, for
//! testing, and as a reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! The in-memory transport defines the **reference behavior** for the transport
//! layer. The TCP transport is expected to approximate this behavior as
//! closely as the network allows and to document any unavoidable deviations.
//!
//! In particular, the in-memory transport establishes the following expectations:
//!
//! - Once `subscribe()` returns successfully, messages published *after* that
//!   point and matching the route are deliverable.
//! - Message delivery is deterministic within a single process.
//! - No messages are dropped due to timing, scheduling, or background IO;
//!   only the full-inbox policy of [`Routes::dispatch`] drops messages.
//!
//! ## Non-Goals
//!
//! This transport does not attempt to emulate network failure modes,
//! persistence, or delivery latency. It exists to provide a clear,
//! deterministic baseline against which higher-level behavior can be validated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::RwLock;

use super::lock_ignore_poison;
use super::routing::Routes;
use crate::{
    // ---
    log_debug,
    Interest,
    KeyExpr,
    Link,
    Message,
    Reliability,
    Result,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
    WhatAmI,
    ZenohId,
};

/// Name of the hub joined by sessions configured without endpoints.
pub const DEFAULT_HUB: &str = "default";

/// Shared message bus for the in-memory transport.
///
/// Simulates a network within a single process. All sessions that join the
/// same `MemoryHub` can publish and receive each other's messages, exactly
/// as peers on a real network would.
///
/// Hubs are usually obtained by name through a `mem/<name>` endpoint. Tests
/// that need isolation from other sessions in the process can construct an
/// anonymous hub with [`MemoryHub::new`] and open sessions on it with
/// [`Session::open_on_hub`](crate::Session::open_on_hub).
pub struct MemoryHub {
    // ---
    name: String,
    routes: Routes,
    members: RwLock<HashMap<ZenohId, WhatAmI>>,
}

impl MemoryHub {
    /// Create a new, empty, anonymous hub.
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self::with_name("anonymous"))
    }

    /// The process-wide hub called `name`, created on first use.
    pub fn named(name: &str) -> Arc<Self> {
        // ---
        let mut hubs = lock_ignore_poison(hub_registry());
        hubs.entry(name.to_string())
            .or_insert_with(|| Arc::new(Self::with_name(name)))
            .clone()
    }

    fn with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            routes: Routes::new(),
            members: RwLock::new(HashMap::new()),
        }
    }

    /// Hub name (`anonymous` for hubs created with [`MemoryHub::new`]).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of sessions currently attached.
    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    async fn join(&self, zid: ZenohId, whatami: WhatAmI) {
        log_debug!("{zid}: joined hub {}", self.name);
        self.members.write().await.insert(zid, whatami);
    }

    async fn publish(&self, _zid: ZenohId, msg: Message) -> Result<()> {
        // ---
        let _delivered = self.routes.dispatch(&msg).await;
        log_debug!(
            "{_zid}: publish on {} delivered to {_delivered} route(s)",
            msg.key_expr
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        zid: ZenohId,
        key_expr: KeyExpr,
        interest: Interest,
        reliability: Reliability,
        capacity: usize,
    ) -> Result<SubscriptionHandle> {
        // ---
        Ok(self
            .routes
            .insert(zid, key_expr, interest, reliability, capacity)
            .await)
    }

    async fn links(&self, zid: ZenohId) -> Vec<Link> {
        self.members
            .read()
            .await
            .iter()
            .filter(|(member, _)| **member != zid)
            .map(|(member, whatami)| Link {
                zid: *member,
                whatami: *whatami,
            })
            .collect()
    }

    async fn leave(&self, zid: ZenohId) -> Result<()> {
        // ---
        let _removed = self.routes.remove_owner(zid).await;
        self.members.write().await.remove(&zid);
        log_debug!("{zid}: left hub {} ({_removed} route(s) removed)", self.name);
        Ok(())
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        // ---
        Self::with_name("anonymous")
    }
}

fn hub_registry() -> &'static Mutex<HashMap<String, Arc<MemoryHub>>> {
    static HUBS: OnceLock<Mutex<HashMap<String, Arc<MemoryHub>>>> = OnceLock::new();
    HUBS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// In-memory transport.
///
/// Routes messages through a shared [`MemoryHub`]. Multiple transports
/// sharing the same hub can publish and receive each other's messages.
struct MemoryTransport {
    // ---
    base: TransportBase,
    hub: Arc<MemoryHub>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn publish(&self, msg: Message) -> Result<()> {
        self.hub.publish(self.zid(), msg).await
    }

    async fn subscribe(
        &self,
        key_expr: KeyExpr,
        interest: Interest,
        reliability: Reliability,
    ) -> Result<SubscriptionHandle> {
        self.hub
            .subscribe(
                self.zid(),
                key_expr,
                interest,
                reliability,
                self.base.queue_size,
            )
            .await
    }

    async fn unsubscribe(&self, id: u64) -> Result<bool> {
        Ok(self.hub.routes.remove(self.zid(), id).await)
    }

    async fn links(&self) -> Vec<Link> {
        self.hub.links(self.zid()).await
    }

    fn locators(&self) -> Vec<String> {
        vec![format!("mem/{}", self.hub.name)]
    }

    /// Close the transport.
    ///
    /// Removes this session's routes and membership; other sessions on the
    /// hub are unaffected.
    async fn close(&self) -> Result<()> {
        self.hub.leave(self.zid()).await
    }
}

/// Create a new in-memory transport attached to `hub`.
///
/// # Errors
///
/// Currently infallible; always returns `Ok`.
pub async fn create_memory_transport(
    base: TransportBase,
    hub: Arc<MemoryHub>,
) -> Result<TransportPtr> {
    // ---
    log_debug!("{}: create memory transport on hub {}", base.zid, hub.name);

    hub.join(base.zid, base.mode).await;

    let transport = MemoryTransport { base, hub };

    Ok(Arc::new(transport))
}
