//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Transport` trait and picks one for a [`Config`] based on its endpoints.
//!
//! Domain code must not depend on transport-specific types.

mod memory;
mod routing;
pub(crate) mod runner;
mod tcp;

use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::{Config, Error, Result, TransportBase, TransportPtr};

pub use memory::{create_memory_transport, MemoryHub, DEFAULT_HUB};

/// A parsed endpoint string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Locator {
    /// `mem/<hub>`
    Memory(String),
    /// `tcp/<host>:<port>`
    Tcp(String),
}

impl FromStr for Locator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some(("mem", hub)) if !hub.is_empty() => Ok(Locator::Memory(hub.to_string())),
            Some(("tcp", addr)) if addr.contains(':') => Ok(Locator::Tcp(addr.to_string())),
            _ => Err(Error::InvalidLocator(format!(
                "`{s}`, expected mem/<hub> or tcp/<host>:<port>"
            ))),
        }
    }
}

/// Acquire mutex guard, ignoring poisoning
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Create the transport described by `config`.
///
/// - No endpoints: the process-wide [`DEFAULT_HUB`] memory hub.
/// - Only `mem/` endpoints: the named hub (all must name the same hub).
/// - Only `tcp/` endpoints: a TCP transport.
///
/// # Errors
///
/// Returns [`Error::InvalidLocator`] for unparsable endpoints and
/// [`Error::InvalidConfig`] when schemes are mixed, several hubs are
/// named or [`Config::validate`] fails. Transport creation errors are passed through.
pub(crate) async fn create_transport(config: &Config) -> Result<TransportPtr> {
    // ---
    config.validate()?;

    let locators = config
        .connect
        .endpoints
        .iter()
        .chain(config.listen.endpoints.iter())
        .map(|e| e.parse::<Locator>())
        .collect::<Result<Vec<_>>>()?;

    let mut hubs: Vec<&str> = Vec::new();
    let mut has_tcp = false;
    for locator in &locators {
        match locator {
            Locator::Memory(hub) if !hubs.contains(&hub.as_str()) => hubs.push(hub),
            Locator::Memory(_) => {}
            Locator::Tcp(_) => has_tcp = true,
        }
    }

    let base = TransportBase::from_config(config);

    match (hubs.as_slice(), has_tcp) {
        ([], false) => create_memory_transport(base, MemoryHub::named(DEFAULT_HUB)).await,
        ([hub], false) => create_memory_transport(base, MemoryHub::named(hub)).await,
        ([], true) => tcp::create_tcp_transport(base, config).await,
        (_, true) => Err(Error::InvalidConfig(
            "cannot mix mem/ and tcp/ endpoints in one session".into(),
        )),
        (_, false) => Err(Error::InvalidConfig(format!(
            "a session joins exactly one memory hub, got {}",
            hubs.join(", ")
        ))),
    }
}
