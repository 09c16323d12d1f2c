//! Request/response correlation
//!
//! One table per session maps correlation ids to waiting callers. Entries
//! settle exactly once: by a matching response, by timeout expiry, or by
//! mass-rejection when the session fails.

use crate::protocol::{self, JsonRpcResponse};
use lf_types::{ClientError, ClientResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

struct PendingCall {
    sender: oneshot::Sender<ClientResult<JsonRpcResponse>>,
    created_at: Instant,
}

/// Per-session table of pending calls
#[derive(Default)]
pub struct CorrelationTable {
    pending: RwLock<HashMap<String, PendingCall>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending call under a freshly generated id.
    ///
    /// The id is guaranteed not to collide with any id currently pending.
    pub fn register(&self) -> (String, oneshot::Receiver<ClientResult<JsonRpcResponse>>) {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.write();

        let mut id = protocol::random_id();
        while pending.contains_key(&id) {
            id = protocol::random_id();
        }

        pending.insert(
            id.clone(),
            PendingCall {
                sender: tx,
                created_at: Instant::now(),
            },
        );
        (id, rx)
    }

    /// Settle the pending call matching this response's id.
    ///
    /// A response whose id is unknown is dropped silently: its call already
    /// timed out or the session already failed. That late-arrival no-op is
    /// the documented contract, not an error path.
    pub fn settle(&self, response: JsonRpcResponse) {
        let key = protocol::normalize_response_id(&response.id);
        let entry = self.pending.write().remove(&key);
        match entry {
            Some(call) => {
                tracing::trace!(
                    "Settling call {} after {:?}",
                    key,
                    call.created_at.elapsed()
                );
                // Receiver dropped means the caller already gave up
                let _ = call.sender.send(Ok(response));
            }
            None => {
                tracing::debug!("Dropping response for unknown or expired id: {}", key);
            }
        }
    }

    /// Reject every pending call with a clone of `error` and clear the table.
    pub fn fail_all(&self, error: ClientError) {
        let drained: Vec<(String, PendingCall)> = self.pending.write().drain().collect();
        if drained.is_empty() {
            return;
        }
        tracing::warn!(
            "Rejecting {} pending call(s): {}",
            drained.len(),
            error
        );
        for (_, call) in drained {
            let _ = call.sender.send(Err(error.clone()));
        }
    }

    /// Await a registered call's settlement, bounded by `timeout`.
    ///
    /// On expiry the entry is removed so a response arriving later finds
    /// nothing to resolve.
    pub async fn wait(
        &self,
        id: &str,
        rx: oneshot::Receiver<ClientResult<JsonRpcResponse>>,
        timeout: Duration,
    ) -> ClientResult<JsonRpcResponse> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                // Sender dropped without settling; treat like a failed session
                self.remove(id);
                Err(ClientError::Connection(format!(
                    "Response channel closed for id {}",
                    id
                )))
            }
            Err(_) => {
                self.remove(id);
                Err(ClientError::Timeout(format!(
                    "No response within {:?} for id {}",
                    timeout, id
                )))
            }
        }
    }

    /// Drop a pending entry without settling it
    pub fn remove(&self, id: &str) {
        self.pending.write().remove(id);
    }

    /// Number of calls currently pending
    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }
}
