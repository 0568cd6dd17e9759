//! Publishers and publication options.

use std::sync::Arc;

use bytes::Bytes;

use crate::session::SessionInner;
use crate::{log_debug, Body, CongestionControl, Encoding, KeyExpr, Priority, Result};

/// Options for [`Session::put`](crate::Session::put).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub encoding: Encoding,
    pub congestion_control: CongestionControl,
    pub priority: Priority,
}

/// Options for [`Session::delete`](crate::Session::delete).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub congestion_control: CongestionControl,
    pub priority: Priority,
}

/// Options fixed for the lifetime of a [`Publisher`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublisherOptions {
    /// Defaults to [`CongestionControl::Drop`].
    pub congestion_control: CongestionControl,
    /// Defaults to [`Priority::Data`].
    pub priority: Priority,
}

/// Options for a single [`Publisher::put`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublisherPutOptions {
    pub encoding: Encoding,
}

/// A publisher bound to one key expression.
///
/// Releasing the publisher with [`Publisher::undeclare`] consumes it, so it
/// cannot be used afterwards.
pub struct Publisher {
    // ---
    session: Arc<SessionInner>,
    key_expr: KeyExpr,
    options: PublisherOptions,
}

impl Publisher {
    pub(crate) fn new(session: Arc<SessionInner>, key_expr: KeyExpr, options: PublisherOptions) -> Self {
        Self {
            session,
            key_expr,
            options,
        }
    }

    /// The key expression samples are published on.
    pub fn key_expr(&self) -> &KeyExpr {
        &self.key_expr
    }

    pub fn congestion_control(&self) -> CongestionControl {
        self.options.congestion_control
    }

    pub fn priority(&self) -> Priority {
        self.options.priority
    }

    /// Publish `payload` with the encoding from `opts`.
    ///
    /// # Errors
    ///
    /// [`Error::SessionClosed`](crate::Error::SessionClosed) once the
    /// session is closed; transport errors are passed through.
    pub async fn put(&self, payload: impl Into<Bytes>, opts: PublisherPutOptions) -> Result<()> {
        // ---
        let body = Body::Put {
            payload: payload.into(),
            encoding: opts.encoding,
        };
        self.send(body).await
    }

    /// Publish a deletion of the publisher's key expression.
    pub async fn delete(&self) -> Result<()> {
        self.send(Body::Delete).await
    }

    async fn send(&self, body: Body) -> Result<()> {
        self.session
            .send(
                self.key_expr.clone(),
                body,
                self.options.congestion_control,
                self.options.priority,
            )
            .await
    }

    /// Release the publisher.
    ///
    /// # Errors
    ///
    /// [`Error::SessionClosed`](crate::Error::SessionClosed) if the session
    /// was closed first.
    pub async fn undeclare(self) -> Result<()> {
        // ---
        self.session.ensure_open()?;
        log_debug!("{}: undeclared publisher on {}", self.session.zid, self.key_expr);
        Ok(())
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("key_expr", &self.key_expr)
            .field("options", &self.options)
            .finish()
    }
}
