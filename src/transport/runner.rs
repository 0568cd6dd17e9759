//! Route execution runner.
//!
//! This module provides the glue between a route's inbox and the
//! session-level entities that consume it (callback subscribers, queryables
//! and the reply dispatcher).
//!
//! The runner is responsible for:
//! - driving a receive loop over the route inbox
//! - dispatching received [`Message`]s to consumer-defined logic
//! - consolidating logging and error handling for inbound messages
//!
//! It does **not** subscribe on the consumer's behalf: the caller declares
//! the route first (so it can keep the route id for undeclaration) and then
//! hands the inbox over.
//!
//! ### Receive loop
//!
//! [`run`] spawns a long-running asynchronous task that waits for incoming
//! messages. When the route is removed or the transport closes, the inbox
//! closes and the loop exits naturally. Aborting the returned task drops the
//! inbox, which removes the route on the next dispatch.
//!
//! ### Error handling
//!
//! Errors returned by [`MessageConsumer::handle_message`] are best-effort
//! failures: they are logged but do not terminate the receive loop. A
//! single bad message must not bring down the consumer.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{Message, Result};

/// A consumer of route-delivered messages.
///
/// Implementations should assume:
/// - messages from different publishers may interleave
/// - messages may be missing when the route is best-effort or the inbox
///   overflowed under `CongestionControl::Drop`
#[async_trait::async_trait]
pub(crate) trait MessageConsumer: Send + Sync {
    /// Handle a single incoming message.
    ///
    /// Returning an error does not terminate the receive loop.
    async fn handle_message(&self, msg: Message) -> Result<()>;
}

/// Start a receive loop feeding `inbox` to `consumer`.
///
/// The returned [`JoinHandle`] represents the lifetime of the loop.
/// Dropping the handle does not stop the loop; abort it to stop delivery.
pub(crate) fn run<T>(mut inbox: mpsc::Receiver<Message>, consumer: T) -> JoinHandle<()>
where
    T: MessageConsumer + 'static,
{
    // ---
    tokio::spawn(async move {
        while let Some(msg) = inbox.recv().await {
            if let Err(_err) = consumer.handle_message(msg).await {
                crate::log_warn!("message consumer error: {_err}");
            }
        }
        crate::log_debug!("route closed, receive loop stopped");
    })
}
