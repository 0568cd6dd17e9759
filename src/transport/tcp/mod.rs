// src/transport/tcp/mod.rs

//! TCP transport implementation.
//!
//! Sessions listen on `tcp/<host>:<port>` endpoints and connect to the
//! endpoints of other sessions. Each TCP connection is a *link* carrying
//! length-prefixed JSON frames in both directions.
//!
//! ## Topology
//!
//! - Peers and clients deliver what they receive to their local routes only.
//! - Routers also forward every received message to their other links whose
//!   remote side is not a router. A client can therefore reach every other
//!   client of the same router, while router meshes do not loop.
//!
//! ## Differences from the in-memory transport
//!
//! - Delivery to remote routes happens after the message crossed the
//!   network; `publish()` returns once the message is queued on each link.
//! - A link that fails is dropped; there is no reconnection.

mod frame;
mod transport;

pub(crate) use transport::create_tcp_transport;
