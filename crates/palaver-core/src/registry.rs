//! Tag correlation registry.
//!
//! Outgoing tagged requests get a unique tag; the registry parks a
//! completion for each until the matching reply, a timeout, or teardown.
//! Tags combine a timestamp with a process-wide monotonic counter, so a
//! tag from a previous connection epoch can never collide with one issued
//! after a reconnect.

use crate::error::ClientError;
use dashmap::DashMap;
use palaver_proto::Node;
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;

/// Correlation tag for one tagged request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    /// Tag as a string slice (the wire form).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Tag {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

type Completion = oneshot::Sender<Result<Node, ClientError>>;

/// Pending-request registry for one client instance.
#[derive(Debug)]
pub struct TagRegistry {
    counter: AtomicU64,
    epoch: AtomicU64,
    pending: Arc<DashMap<Tag, Completion>>,
}

impl TagRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Issue the next tag: `{unix-seconds}.--{counter}`.
    ///
    /// The counter never resets, so tags stay unique across reconnects
    /// within one process even if the clock goes backwards.
    #[must_use]
    pub fn next_tag(&self) -> Tag {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        Tag(format!("{seconds}.--{counter}"))
    }

    /// Park a completion for `tag` and return the future that resolves it.
    ///
    /// The future completes with the reply node, with
    /// [`ClientError::Timeout`] once `deadline` elapses (the entry is
    /// removed), or with the rejection reason from [`Self::reject_all`].
    pub fn register(
        &self,
        tag: &Tag,
        deadline: Duration,
    ) -> impl Future<Output = Result<Node, ClientError>> + Send + use<> {
        let (sender, receiver) = oneshot::channel();
        self.pending.insert(tag.clone(), sender);

        let pending = Arc::clone(&self.pending);
        let tag = tag.clone();
        async move {
            match tokio::time::timeout(deadline, receiver).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(ClientError::transport("request dropped without completion")),
                Err(_elapsed) => {
                    pending.remove(&tag);
                    Err(ClientError::timeout("tagged request deadline elapsed"))
                }
            }
        }
    }

    /// Resolve a pending request with its reply.
    ///
    /// Late or duplicate replies are dropped and logged, not treated as an
    /// error. Returns whether a pending request was completed.
    pub fn resolve(&self, tag: &Tag, reply: Node) -> bool {
        match self.pending.remove(tag) {
            Some((_, sender)) => sender.send(Ok(reply)).is_ok(),
            None => {
                tracing::debug!(%tag, "dropping reply with no pending request");
                false
            }
        }
    }

    /// Remove a pending request without completing it (e.g. the send that
    /// should have produced the reply never left the socket).
    pub fn discard(&self, tag: &Tag) {
        self.pending.remove(tag);
    }

    /// Reject every pending request and start a new connection epoch.
    ///
    /// Must run before teardown or reconnect so no completion outlives its
    /// connection epoch.
    pub fn reject_all(&self, reason: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        let tags: Vec<Tag> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        let count = tags.len();
        for tag in tags {
            if let Some((_, sender)) = self.pending.remove(&tag) {
                let _ = sender.send(Err(ClientError::Transport(Cow::Owned(reason.to_owned()))));
            }
        }
        if count > 0 {
            tracing::debug!(count, reason, "rejected pending tagged requests");
        }
    }

    /// Current connection epoch (bumped by [`Self::reject_all`]).
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Number of requests currently awaiting replies.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}
