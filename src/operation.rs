//! Live operation bookkeeping and cancellation
//!
//! Every live operation owns a cancellation handle created at start and
//! torn down at terminal state. At most one operation per class may be
//! live: beginning a new one always cancels the prior handle for that
//! class first. The UI should already prevent concurrent triggers; the
//! registry enforces the invariant rather than trusting the caller.
//!
//! Cancellation is cooperative: the stream read loop observes the token at
//! its next suspension point and exits without surfacing an error. What
//! happens to partial output is the reducer's concern
//! (`LiveTranscript::into_partial_message`): stop and keep, never stop and
//! discard.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// Logical operation classes with independent live state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    Chat,
    Research,
    Suggestions,
}

impl std::fmt::Display for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Research => write!(f, "research"),
            Self::Suggestions => write!(f, "suggestions"),
        }
    }
}

#[derive(Debug)]
struct LiveEntry {
    op_id: u64,
    token: CancellationToken,
}

/// Class → current cancellation handle map.
///
/// Clonable handle: the controller drives operations through one clone
/// while a signal handler or UI holds another to trigger aborts.
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    inner: Arc<Mutex<HashMap<OperationClass, LiveEntry>>>,
    next_op_id: Arc<AtomicU64>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin an operation: cancel any live operation of the same class,
    /// install a fresh token, and hand it to the caller.
    pub fn begin(&self, class: OperationClass) -> OperationHandle {
        let op_id = self.next_op_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let mut live = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prior) = live.insert(
            class,
            LiveEntry {
                op_id,
                token: token.clone(),
            },
        ) {
            tracing::debug!(%class, "implicitly cancelling prior live operation");
            prior.token.cancel();
        }
        OperationHandle { class, op_id, token }
    }

    /// Tear down a finished operation. Only removes the entry if it still
    /// belongs to this handle: a newer operation of the same class must
    /// not be evicted by its predecessor's cleanup.
    pub fn finish(&self, handle: &OperationHandle) {
        let mut live = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if live
            .get(&handle.class)
            .is_some_and(|entry| entry.op_id == handle.op_id)
        {
            live.remove(&handle.class);
        }
    }

    /// Trigger cancellation of the live operation of a class, if any
    pub fn cancel(&self, class: OperationClass) {
        let live = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = live.get(&class) {
            tracing::debug!(%class, "user-triggered cancellation");
            entry.token.cancel();
        }
    }

    /// Cancel everything live (component teardown / navigation away), so
    /// no stream keeps writing into state nobody observes
    pub fn cancel_all(&self) {
        let live = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for entry in live.values() {
            entry.token.cancel();
        }
    }

    /// Whether an operation of this class is currently live
    pub fn is_live(&self, class: OperationClass) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&class)
    }
}

/// Handle owned by one live operation
#[derive(Debug, Clone)]
pub struct OperationHandle {
    class: OperationClass,
    op_id: u64,
    token: CancellationToken,
}

impl OperationHandle {
    pub fn class(&self) -> OperationClass {
        self.class
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
