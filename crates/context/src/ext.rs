use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use futures_lite::Stream;

use crate::{Context, ContextRef};

pin_project_lite::pin_project! {
    /// Wraps a future so it resolves to `None` as soon as its [`Context`] is
    /// done, instead of running to completion.
    pub struct WithContext<'a, F> {
        #[pin]
        fut: F,
        #[pin]
        ctx: ContextRef<'a>,
    }
}

impl<'a, F: Future> Future for WithContext<'a, F> {
    type Output = Option<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();

        // The context is checked first: once cancelled, we stop waiting on the
        // inner future even if it would also be ready this poll.
        if this.ctx.poll(cx).is_ready() {
            return Poll::Ready(None);
        }

        this.fut.poll(cx).map(Some)
    }
}

/// Extension trait attaching a [`Context`] to a [`Future`], so it stops being
/// polled to completion once the context is cancelled.
pub trait ContextFutExt: Future + Sized {
    /// Attaches `ctx` to this future. The combined future resolves to `None`
    /// if `ctx` is done before this future completes, `Some(output)` otherwise.
    fn with_context<'a>(self, ctx: impl Into<ContextRef<'a>>) -> WithContext<'a, Self> {
        WithContext {
            fut: self,
            ctx: ctx.into(),
        }
    }
}

impl<F: Future> ContextFutExt for F {}

pin_project_lite::pin_project! {
    /// Wraps a stream so it ends as soon as its [`Context`] is done.
    pub struct WithContextStream<'a, S> {
        #[pin]
        stream: S,
        #[pin]
        ctx: ContextRef<'a>,
    }
}

impl<'a, S: Stream> Stream for WithContextStream<'a, S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        if this.ctx.poll(cx).is_ready() {
            return Poll::Ready(None);
        }

        this.stream.poll_next(cx)
    }
}

/// Extension trait attaching a [`Context`] to a [`Stream`], so it stops
/// yielding items once the context is cancelled.
pub trait ContextStreamExt: Stream + Sized {
    /// Attaches `ctx` to this stream. The combined stream ends (yields `None`)
    /// once `ctx` is done, even if the inner stream would still have items.
    fn with_context<'a>(self, ctx: impl Into<ContextRef<'a>>) -> WithContextStream<'a, Self> {
        WithContextStream {
            stream: self,
            ctx: ctx.into(),
        }
    }
}

impl<S: Stream> ContextStreamExt for S {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_some_when_future_wins() {
        let (ctx, _handler) = Context::new();
        let result = async { 42 }.with_context(&ctx).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn resolves_none_when_cancelled_first() {
        let (ctx, handler) = Context::new();
        handler.cancel();
        let result = std::future::pending::<()>().with_context(ctx).await;
        assert_eq!(result, None);
    }
}
