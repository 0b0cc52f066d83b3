//! Context implementation for request-scoped data and cancellation
//!
//! This module provides the Context type which carries cancellation signals
//! and deadlines across async boundaries.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time;

/// Context carries request-scoped cancellation and deadlines
/// CRITICAL: Pass this as first parameter to ALL async trait methods
/// This enables proper cancellation and timeout handling
///
/// Children created with [`Context::with_timeout`] are cancelled whenever
/// the parent is.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    deadline: Option<Instant>,
    done_tx: Arc<watch::Sender<bool>>,
    // Keeps the parent's own timer running while this child is alive.
    _parent: Option<Context>,
    timer: Option<AbortHandle>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Context {
    pub fn new() -> Self {
        let (done_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(ContextInner {
                deadline: None,
                done_tx: Arc::new(done_tx),
                _parent: None,
                timer: None,
            }),
        }
    }

    /// Derives a child that is cancelled at `timeout` from now, or earlier if
    /// the parent's own deadline or cancellation comes first. The timer stops
    /// once the last clone of the child is dropped.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        // A timeout too large to represent means no deadline of our own.
        let requested = Instant::now().checked_add(timeout);
        let deadline = match (self.inner.deadline, requested) {
            (Some(parent), Some(requested)) => Some(parent.min(requested)),
            (parent, requested) => parent.or(requested),
        };

        let (done_tx, _) = watch::channel(self.is_cancelled());
        let done_tx = Arc::new(done_tx);

        let child_tx = Arc::clone(&done_tx);
        // Holding the parent's sender keeps its channel open while we wait.
        let parent_tx = Arc::clone(&self.inner.done_tx);
        let mut parent_done = parent_tx.subscribe();
        let timer = tokio::spawn(async move {
            let expiry = async {
                match deadline {
                    Some(deadline) => time::sleep_until(deadline.into()).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = parent_done.wait_for(|done| *done) => {}
                _ = expiry => {}
            }
            child_tx.send_replace(true);
            drop(parent_tx);
        });

        Self {
            inner: Arc::new(ContextInner {
                deadline,
                done_tx,
                _parent: Some(self.clone()),
                timer: Some(timer.abort_handle()),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.done_tx.borrow()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns a channel that flips to true when work done on behalf of this
    /// context should be cancelled
    pub fn done(&self) -> watch::Receiver<bool> {
        self.inner.done_tx.subscribe()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        let mut done = self.done();
        let _ = done.wait_for(|done| *done).await;
    }

    pub fn cancel(&self) {
        self.inner.done_tx.send_replace(true);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn context_timeout_cancels() {
        let ctx = Context::new().with_timeout(Duration::from_millis(100));

        assert!(!ctx.is_cancelled());

        sleep(Duration::from_millis(150)).await;

        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn child_is_cancelled_with_parent() {
        let parent = Context::new();
        let child = parent.with_timeout(Duration::from_secs(60));

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), child.cancelled())
            .await
            .expect("child should observe parent cancellation");

        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn child_deadline_never_exceeds_parent() {
        let parent = Context::new().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(600));

        assert_eq!(child.deadline(), parent.deadline());
        assert!(child.remaining().unwrap() <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn dropping_child_stops_its_timer() {
        let parent = Context::new();
        let child = parent.with_timeout(Duration::from_secs(1800));
        let mut done = child.done();

        drop(child);
        // The aborted timer releases the sender without ever signalling.
        let closed = tokio::time::timeout(Duration::from_secs(1), done.wait_for(|done| *done))
            .await
            .expect("timer task should be aborted");
        assert!(closed.is_err());
    }

    #[tokio::test]
    async fn clones_keep_the_timer_alive() {
        let child = Context::new().with_timeout(Duration::from_millis(50));
        let clone = child.clone();
        drop(child);

        tokio::time::timeout(Duration::from_secs(1), clone.cancelled())
            .await
            .expect("clone should still reach its deadline");
    }

    #[tokio::test]
    async fn grandchild_follows_cancellation_after_middle_is_dropped() {
        let root = Context::new();
        let grandchild = root
            .with_timeout(Duration::from_secs(60))
            .with_timeout(Duration::from_secs(60));

        root.cancel();
        tokio::time::timeout(Duration::from_secs(1), grandchild.cancelled())
            .await
            .expect("grandchild should observe root cancellation");
    }

    #[tokio::test]
    async fn unrepresentable_timeout_keeps_parent_deadline() {
        let parent = Context::new().with_timeout(Duration::from_secs(5));
        let child = parent.with_timeout(Duration::MAX);
        assert_eq!(child.deadline(), parent.deadline());

        let unbounded = Context::new().with_timeout(Duration::MAX);
        assert_eq!(unbounded.deadline(), None);
        assert!(!unbounded.is_cancelled());
    }

    #[tokio::test]
    async fn context_manual_cancel() {
        let ctx = Context::new();

        assert!(!ctx.is_cancelled());

        ctx.cancel();

        assert!(ctx.is_cancelled());
    }
}
