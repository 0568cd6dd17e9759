//! Session configuration.
//!
//! A [`Config`] is plain serde data. It can be built in code with the
//! `with_*` helpers, parsed from JSON, loaded from a file, or edited one key
//! at a time with [`Config::insert_json`] using `/`-separated key paths:
//!
//! ```
//! use mom_pubsub::{Config, WhatAmI};
//!
//! let mut config = Config::default();
//! config.insert_json("mode", r#""client""#).unwrap();
//! config
//!     .insert_json("connect/endpoints", r#"["tcp/127.0.0.1:7447"]"#)
//!     .unwrap();
//!
//! assert_eq!(config.mode, WhatAmI::Client);
//! assert_eq!(config.get_json("connect/endpoints").unwrap(), r#"["tcp/127.0.0.1:7447"]"#);
//! ```
//!
//! Endpoints name the transport a session uses:
//!
//! - `mem/<hub>` joins the in-process hub called `<hub>`.
//! - `tcp/<host>:<port>` listens on, or connects to, a TCP socket.
//!
//! A config without endpoints joins the process-wide `default` hub.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result, RetryConfig, ZenohId};

/// Default timeout applied to [`Session::get`](crate::Session::get).
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 10_000;

/// Default capacity of each subscription inbox.
pub const DEFAULT_QUEUE_SIZE: usize = 64;

/// Role a session plays in the topology.
///
/// Routers forward data they receive from one link to their other
/// non-router links; peers and clients never forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhatAmI {
    Router,
    #[default]
    Peer,
    Client,
}

impl fmt::Display for WhatAmI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WhatAmI::Router => "router",
            WhatAmI::Peer => "peer",
            WhatAmI::Client => "client",
        })
    }
}

/// A list of endpoints plus the retry policy used when connecting to them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Endpoint strings (`mem/<hub>` or `tcp/<host>:<port>`).
    pub endpoints: Vec<String>,
    /// Backoff policy for connection attempts.
    pub retry: RetryConfig,
}

/// Session configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fixed session id; a random one is generated when absent.
    pub id: Option<ZenohId>,

    /// Role of the session.
    pub mode: WhatAmI,

    /// Endpoints to connect to.
    pub connect: EndpointConfig,

    /// Endpoints to listen on.
    pub listen: EndpointConfig,

    /// Timeout for queries issued without an explicit one, in milliseconds.
    pub queries_default_timeout_ms: u64,

    /// Capacity of each subscriber, queryable and reply inbox.
    pub queue_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: None,
            mode: WhatAmI::Peer,
            connect: EndpointConfig::default(),
            listen: EndpointConfig::default(),
            queries_default_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl Config {
    /// Default peer configuration.
    pub fn peer() -> Self {
        Self::default()
    }

    /// Client configuration connecting to the given endpoints.
    pub fn client<I, S>(peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: WhatAmI::Client,
            connect: EndpointConfig {
                endpoints: peers.into_iter().map(Into::into).collect(),
                ..EndpointConfig::default()
            },
            ..Self::default()
        }
    }

    /// Parse a JSON document. Missing fields take their default value.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot be used.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] for an unusable connect or listen retry
    /// policy.
    pub fn validate(&self) -> Result<()> {
        // ---
        self.connect.retry.validate()?;
        self.listen.retry.validate()
    }

    /// Load a JSON document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serialize to a JSON document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Set the value at `key` (a `/`-separated path) from a JSON fragment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the path does not exist or the
    /// resulting document no longer deserializes into a valid `Config`; in
    /// every case `self` is left unchanged.
    pub fn insert_json(&mut self, key: &str, value: &str) -> Result<()> {
        let value: Value = serde_json::from_str(value)?;
        let mut doc = serde_json::to_value(&*self)?;

        let slot = lookup_mut(&mut doc, key)?;
        *slot = value;

        let updated: Self = serde_json::from_value(doc)
            .map_err(|e| Error::InvalidConfig(format!("{key}: {e}")))?;
        updated.validate()?;

        *self = updated;
        Ok(())
    }

    /// JSON fragment stored at `key` (a `/`-separated path).
    pub fn get_json(&self, key: &str) -> Result<String> {
        let mut doc = serde_json::to_value(self)?;
        let slot = lookup_mut(&mut doc, key)?;
        Ok(serde_json::to_string(slot)?)
    }

    /// Set the role.
    pub fn with_mode(mut self, mode: WhatAmI) -> Self {
        self.mode = mode;
        self
    }

    /// Add an endpoint to connect to.
    pub fn with_connect(mut self, endpoint: impl Into<String>) -> Self {
        self.connect.endpoints.push(endpoint.into());
        self
    }

    /// Add an endpoint to listen on.
    pub fn with_listen(mut self, endpoint: impl Into<String>) -> Self {
        self.listen.endpoints.push(endpoint.into());
        self
    }

    /// Use a fixed session id.
    pub fn with_id(mut self, id: ZenohId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the connect retry policy.
    pub fn with_connect_retry(mut self, retry: RetryConfig) -> Self {
        self.connect.retry = retry;
        self
    }

    /// Set the default query timeout.
    pub fn with_queries_default_timeout(mut self, timeout: Duration) -> Self {
        self.queries_default_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Default query timeout as a `Duration`.
    pub fn queries_default_timeout(&self) -> Duration {
        Duration::from_millis(self.queries_default_timeout_ms)
    }
}

fn lookup_mut<'a>(doc: &'a mut Value, key: &str) -> Result<&'a mut Value> {
    let mut slot = doc;
    for part in key.split('/').filter(|p| !p.is_empty()) {
        slot = slot
            .get_mut(part)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown key `{key}`")))?;
    }
    Ok(slot)
}
