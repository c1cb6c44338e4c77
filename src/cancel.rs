//! Per-session cooperative cancellation.
//!
//! A [`CancelToken`] is shared between the caller and the runner. The runner
//! registers its child process with the token; `cancel()` marks the token and
//! kills whatever child is registered. A child registered after `cancel()` is
//! killed on registration, so a cancel can never be lost between spawn and
//! wait.

use std::process::Child;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    child: Mutex<Option<Child>>,
    children: Mutex<Vec<CancelToken>>,
}

#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is cancelled whenever `self` is. Cancelling the child
    /// does not affect the parent. Used by batch mode so each session owns
    /// its own process slot.
    pub fn child_token(&self) -> CancelToken {
        let child = CancelToken::new();
        let mut children = self.inner.children.lock();
        if self.is_cancelled() {
            child.cancel();
        }
        children.push(child.clone());
        child
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        {
            let mut guard = self.inner.child.lock();
            if let Some(child) = guard.as_mut() {
                log::info!(
                    target: "media_convert::cancel",
                    "Terminating FFmpeg process (pid={})",
                    child.id()
                );
                let _ = child.kill();
            }
        }
        let children = self.inner.children.lock().clone();
        for child in children {
            child.cancel();
        }
    }

    /// Hand the running child to the token. Killed immediately if the token
    /// is already cancelled.
    pub(crate) fn attach(&self, child: Child) {
        let mut guard = self.inner.child.lock();
        *guard = Some(child);
        if self.is_cancelled()
            && let Some(child) = guard.as_mut()
        {
            let _ = child.kill();
        }
    }

    /// Take the child back for reaping.
    pub(crate) fn detach(&self) -> Option<Child> {
        self.inner.child.lock().take()
    }
}
