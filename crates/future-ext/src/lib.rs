//! Small extension trait for bounding a future with a timeout.
//!
//! `tokio::time::timeout` already does this, but it's a free function that
//! requires wrapping the future rather than chaining off it. `with_timeout`
//! reads the same way `.await` does at a call site.
//!
//! ```
//! # use scuffle_future_ext::FutureExt;
//! # tokio_test::block_on(async {
//! let result = async { 1 + 1 }.with_timeout(std::time::Duration::from_secs(1)).await;
//! assert_eq!(result, Ok(2));
//! # });
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;

/// Extension trait bounding a [`Future`] with a timeout.
pub trait FutureExt: Future + Sized {
    /// Awaits this future, failing with [`Elapsed`] if `duration` passes
    /// before it resolves.
    fn with_timeout(self, duration: Duration) -> tokio::time::Timeout<Self> {
        tokio::time::timeout(duration, self)
    }
}

impl<F: Future> FutureExt for F {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_before_timeout() {
        let result = async { 42 }.with_timeout(Duration::from_millis(100)).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn times_out() {
        let result = std::future::pending::<()>().with_timeout(Duration::from_millis(5)).await;
        assert!(result.is_err());
    }
}
