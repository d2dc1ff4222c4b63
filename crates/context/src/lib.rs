//! Go-like cancellation contexts for async Rust.
//!
//! It's often useful to cancel a tree of futures at once, or to wait for all
//! of them to finish before shutting down. This crate provides a [`Context`]/
//! [`Handler`] pair for exactly that: contexts form a hierarchy (cancelling a
//! parent cancels every descendant), and a [`Handler::shutdown`] call blocks
//! until every context derived from it has been dropped, so in-flight work
//! gets a chance to wind down gracefully instead of being yanked out from
//! under it.
//!
//! ```
//! # use scuffle_context::{Context, ContextFutExt};
//! # tokio_test::block_on(async {
//! let (ctx, handler) = Context::new();
//!
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).with_context(ctx).await
//! });
//!
//! // Stops the spawned task and cancels all associated futures.
//! handler.cancel();
//! # });
//! ```

mod ext;

pub use ext::{ContextFutExt, ContextStreamExt};

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Arc;
use std::task::Poll;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture, WaitForCancellationFutureOwned};

/// Created by calling [`ContextTrackerInner::child`].
#[derive(Debug)]
struct ContextTracker(Arc<ContextTrackerInner>);

impl Drop for ContextTracker {
    fn drop(&mut self) {
        let prev_active_count = self.0.active_count.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
        // Last active tracker for an already-stopped inner wakes up `wait`.
        if prev_active_count == 1 && self.0.stopped.load(std::sync::atomic::Ordering::Relaxed) {
            self.0.notify.notify_waiters();
        }
    }
}

#[derive(Debug)]
struct ContextTrackerInner {
    stopped: AtomicBool,
    active_count: AtomicUsize,
    notify: tokio::sync::Notify,
}

impl ContextTrackerInner {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            stopped: AtomicBool::new(false),
            active_count: AtomicUsize::new(0),
            notify: tokio::sync::Notify::new(),
        })
    }

    fn child(self: &Arc<Self>) -> ContextTracker {
        self.active_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        ContextTracker(Arc::clone(self))
    }

    fn stop(&self) {
        self.stopped.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    async fn wait(&self) {
        let notify = self.notify.notified();

        if self.active_count.load(std::sync::atomic::Ordering::Relaxed) == 0 {
            return;
        }

        notify.await;
    }
}

/// A context for cancelling futures and waiting for shutdown.
///
/// A context is created from a [`Handler`] or another context, forming a
/// hierarchy. Attach a context to a future or stream with [`ContextFutExt`]
/// / [`ContextStreamExt`] to have it stop automatically once [`Handler::cancel`]
/// runs. [`Handler::shutdown`] blocks until every context descended from it
/// has been dropped, allowing in-flight work to finish.
#[derive(Debug)]
pub struct Context {
    token: CancellationToken,
    tracker: ContextTracker,
}

impl Clone for Context {
    fn clone(&self) -> Self {
        Self {
            token: self.token.clone(),
            tracker: self.tracker.0.child(),
        }
    }
}

impl Context {
    #[must_use]
    /// Creates a new context using the global handler.
    pub fn new() -> (Self, Handler) {
        Handler::global().new_child()
    }

    #[must_use]
    /// Creates a child context from this one.
    ///
    /// ```
    /// use scuffle_context::Context;
    ///
    /// let (parent, _parent_handler) = Context::new();
    /// let (_child, _child_handler) = parent.new_child();
    /// ```
    pub fn new_child(&self) -> (Self, Handler) {
        let token = self.token.child_token();
        let tracker = ContextTrackerInner::new();

        (
            Self {
                tracker: tracker.child(),
                token: token.clone(),
            },
            Handler {
                token: Arc::new(TokenDropGuard(token)),
                tracker,
            },
        )
    }

    #[must_use]
    /// Returns the global context.
    pub fn global() -> Self {
        Handler::global().context()
    }

    /// Waits for the context to be done (its handler cancelled).
    pub async fn done(&self) {
        self.token.cancelled().await;
    }

    /// Like [`Context::done`] but takes ownership of the context.
    pub async fn into_done(self) {
        self.done().await;
    }

    #[must_use]
    /// Returns true if the context is done.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Cancels the wrapped token as soon as it is dropped.
#[derive(Debug)]
struct TokenDropGuard(CancellationToken);

impl TokenDropGuard {
    #[must_use]
    fn child(&self) -> CancellationToken {
        self.0.child_token()
    }

    fn cancel(&self) {
        self.0.cancel();
    }
}

impl Drop for TokenDropGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Owns a [`Context`] hierarchy; cancelling or dropping the handler cancels
/// every context created from it.
#[derive(Debug, Clone)]
pub struct Handler {
    token: Arc<TokenDropGuard>,
    tracker: Arc<ContextTrackerInner>,
}

impl Default for Handler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler {
    #[must_use]
    /// Creates a new, unattached handler.
    pub fn new() -> Handler {
        let token = CancellationToken::new();
        let tracker = ContextTrackerInner::new();

        Handler {
            token: Arc::new(TokenDropGuard(token)),
            tracker,
        }
    }

    #[must_use]
    /// Returns the process-global handler.
    pub fn global() -> &'static Self {
        static GLOBAL: std::sync::OnceLock<Handler> = std::sync::OnceLock::new();

        GLOBAL.get_or_init(Handler::new)
    }

    /// Cancels the handler and waits for all derived contexts to be dropped.
    pub async fn shutdown(&self) {
        self.cancel();
        self.done().await;
    }

    /// Waits for the handler to be cancelled and all derived contexts dropped.
    pub async fn done(&self) {
        self.token.0.cancelled().await;
        self.tracker.wait().await;
    }

    /// Waits for all currently-derived contexts to be dropped, regardless of
    /// whether the handler itself has been cancelled. Contexts created after
    /// this call do not extend the wait.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    #[must_use]
    /// Creates a new context from this handler.
    pub fn context(&self) -> Context {
        Context {
            token: self.token.child(),
            tracker: self.tracker.child(),
        }
    }

    #[must_use]
    /// Creates a new child context and its own handler from this handler.
    pub fn new_child(&self) -> (Context, Handler) {
        self.context().new_child()
    }

    /// Cancels the handler, signalling every derived context.
    pub fn cancel(&self) {
        self.tracker.stop();
        self.token.cancel();
    }

    #[must_use]
    /// Returns true if the handler has been cancelled.
    pub fn is_done(&self) -> bool {
        self.token.0.is_cancelled()
    }
}

pin_project_lite::pin_project! {
    /// A reference to a context's cancellation signal, either owned or borrowed.
    #[project = ContextRefProj]
    pub enum ContextRef<'a> {
        Owned {
            #[pin] fut: WaitForCancellationFutureOwned,
            tracker: ContextTracker,
        },
        Ref {
            #[pin] fut: WaitForCancellationFuture<'a>,
        },
    }
}

impl std::future::Future for ContextRef<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ContextRefProj::Owned { fut, .. } => fut.poll(cx),
            ContextRefProj::Ref { fut } => fut.poll(cx),
        }
    }
}

impl From<Context> for ContextRef<'_> {
    fn from(ctx: Context) -> Self {
        ContextRef::Owned {
            fut: ctx.token.cancelled_owned(),
            tracker: ctx.tracker,
        }
    }
}

impl<'a> From<&'a Context> for ContextRef<'a> {
    fn from(ctx: &'a Context) -> Self {
        ContextRef::Ref { fut: ctx.token.cancelled() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_propagates_to_children() {
        let (ctx, handler) = Context::new();
        let (child, _child_handler) = ctx.new_child();

        assert!(!child.is_done());
        handler.cancel();
        child.done().await;
        assert!(child.is_done());
    }

    #[tokio::test]
    async fn shutdown_waits_for_contexts_to_drop() {
        let handler = Handler::new();
        let ctx = handler.context();

        let task = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            drop(ctx);
        });

        handler.shutdown().await;
        task.await.unwrap();
    }
}
