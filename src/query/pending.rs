use std::collections::HashMap;
use tokio::sync::mpsc;

use super::Reply;

/// Tracks queries waiting for replies
///
/// Maps query ids to the sending side of each `get`'s reply stream.
/// Unlike a request/response exchange, a query may collect any number of
/// replies, so an entry stays registered until it is removed on timeout or
/// the whole table is cleared on session close. Removing an entry drops
/// its sender, which ends the caller's stream.
pub(crate) struct PendingQueries {
    // ---
    queries: HashMap<u64, mpsc::Sender<Reply>>,
}

impl PendingQueries {
    // ---

    /// Create a new empty pending queries tracker
    pub fn new() -> Self {
        // ---
        Self {
            queries: HashMap::new(),
        }
    }

    /// Register a new pending query
    ///
    /// Returns a receiver that yields replies until the query is removed.
    pub fn register(&mut self, qid: u64, capacity: usize) -> mpsc::Receiver<Reply> {
        // ---
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.queries.insert(qid, tx);
        rx
    }

    /// Hand a reply to the pending query `qid`
    ///
    /// Returns true if the query was found and had room for the reply.
    pub fn deliver(&mut self, qid: u64, reply: Reply) -> bool {
        // ---
        match self.queries.get(&qid) {
            Some(tx) => tx.try_send(reply).is_ok(),
            None => false,
        }
    }

    /// Remove a pending query, ending its reply stream
    ///
    /// Used for timeout cleanup.
    pub fn remove(&mut self, qid: u64) -> bool {
        // ---
        self.queries.remove(&qid).is_some()
    }

    /// End every pending query.
    pub fn clear(&mut self) {
        self.queries.clear();
    }

    /// Get the number of pending queries
    #[cfg(test)]
    pub fn len(&self) -> usize {
        // ---
        self.queries.len()
    }
}
