// src/core/stack.rs
//! Native stack headroom for the recursive parts of SUSA: the parser's
//! descent into nested expressions and blocks, and the interpreter's boxed
//! `eval`/`exec_block` futures. When less than [`RED_ZONE`] remains, the
//! work continues on a freshly allocated segment instead of overflowing.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;

const RED_ZONE: usize = 128 * 1024;

/// Size of each additional stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Boxed future polled under [`ensure_sufficient_stack`]. Each nested
/// await of one of these re-checks the headroom, so recursion depth in the
/// interpreted program is bounded by the call-depth limit, not by the
/// thread's stack.
pub struct Deep<'a, T>(BoxFuture<'a, T>);

impl<'a, T> Deep<'a, T> {
    pub fn new(future: BoxFuture<'a, T>) -> Self {
        Deep(future)
    }
}

impl<T> Future for Deep<'_, T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let inner = &mut self.0;
        ensure_sufficient_stack(|| inner.as_mut().poll(cx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn depth(n: u64) -> u64 {
        ensure_sufficient_stack(|| if n == 0 { 0 } else { depth(n - 1) + 1 })
    }

    fn nested(n: u64) -> Deep<'static, u64> {
        Deep::new(async move { if n == 0 { 0 } else { nested(n - 1).await + 1 } }.boxed())
    }

    #[test]
    fn deep_sync_recursion_completes() {
        assert_eq!(depth(100_000), 100_000);
    }

    #[tokio::test]
    async fn deep_async_recursion_completes() {
        assert_eq!(nested(10_000).await, 10_000);
    }
}
