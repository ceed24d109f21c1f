//! The timeout decorator: bound one operation by a deadline.
//!
//! The operation runs on its own thread and races a deadline derived from the
//! caller's [`Context`]. Whichever resolves first decides the outcome:
//!
//! - if the operation completes first, its `Result<T, E>` is returned as-is,
//!   with panics converted into `E` like in a race;
//! - if the deadline passes first, the caller gets a [`DeadlineExceeded`]
//!   error right away.
//!
//! "First" is judged by when the outcome was delivered, not by when the
//! caller looks at it: an outcome delivered after the deadline loses even if
//! the [`Timeout`] future is polled only once both are in.
//!
//! A timed-out operation isn't stopped. It keeps running on its detached
//! thread, and when it eventually finishes its outcome is handed to a mailbox
//! nobody reads from anymore, which drops it.
//!
//! [`with_timeout`] turns a bounded call back into an [`Operation`], so a set
//! of individually bounded operations can be raced:
//!
//! ```
//! use futures_anyone::{run, with_timeout, Context};
//! use std::io;
//! use std::thread;
//! use std::time::Duration;
//!
//! let ctx = Context::background();
//! let mirrors = [10, 500];
//! let operations: Vec<_> = mirrors
//!     .into_iter()
//!     .map(|latency| {
//!         let fetch = move || -> io::Result<u64> {
//!             thread::sleep(Duration::from_millis(latency));
//!             Ok(latency)
//!         };
//!         with_timeout(&ctx, fetch, Duration::from_millis(100))
//!     })
//!     .collect();
//!
//! assert_eq!(run(&ctx, operations).unwrap(), 10);
//! ```
//!
//! [`Context`]: crate::Context

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{ready, Context as TaskContext, Poll};
use std::time::{Duration, Instant};

use futures_core::future::FusedFuture;
use futures_lite::future::block_on;

use crate::context::{Context, Within};
use crate::error::{DeadlineExceeded, Panicked};
use crate::operation::Operation;
use crate::utils::spawn_operation;

use mailbox::{mailbox, Receiver};

mod mailbox;

/// Run `operation`, waiting at most `timeout` for it to complete.
///
/// Blocks the current thread. Returns the operation's own outcome if it
/// completes within the bound, or a [`DeadlineExceeded`] error once the bound
/// elapses or `ctx` ends, whichever comes first.
///
/// # Example
///
/// ```
/// use futures_anyone::{timeout, Context};
/// use std::io;
/// use std::thread;
/// use std::time::Duration;
///
/// let ctx = Context::background();
/// let slow = || -> io::Result<()> {
///     thread::sleep(Duration::from_millis(200));
///     Ok(())
/// };
/// let err = timeout(&ctx, slow, Duration::from_millis(10)).unwrap_err();
/// assert_eq!(err.kind(), io::ErrorKind::TimedOut);
/// ```
pub fn timeout<O, T, E>(ctx: &Context, operation: O, timeout: Duration) -> Result<T, E>
where
    O: Operation<T, E>,
    T: Send + 'static,
    E: From<Panicked> + From<DeadlineExceeded> + Send + 'static,
{
    block_on(Timeout::new(ctx, operation, timeout))
}

/// Bind `operation` to a timeout, producing a new operation.
///
/// Calling the returned operation performs [`timeout`] with the bound
/// arguments. This is how the timeout decorator composes with [`race`] and
/// [`run`]: wrap each candidate, then race the wrapped set.
///
/// [`race`]: crate::race()
/// [`run`]: crate::run
pub fn with_timeout<O>(ctx: &Context, operation: O, timeout: Duration) -> WithTimeout<O> {
    WithTimeout {
        context: ctx.clone(),
        operation,
        timeout,
    }
}

/// An operation bounded by a timeout.
///
/// This `struct` is created by the [`with_timeout`] function. See its
/// documentation for more.
pub struct WithTimeout<O> {
    context: Context,
    operation: O,
    timeout: Duration,
}

impl<O, T, E> Operation<T, E> for WithTimeout<O>
where
    O: Operation<T, E>,
    T: Send + 'static,
    E: From<Panicked> + From<DeadlineExceeded> + Send + 'static,
{
    fn call(self) -> Result<T, E> {
        timeout(&self.context, self.operation, self.timeout)
    }
}

impl<O> fmt::Debug for WithTimeout<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithTimeout")
            .field("context", &self.context)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A future which waits for an operation, or for its deadline to pass.
///
/// # Example
///
/// ```
/// use futures_anyone::{Context, Timeout};
/// use std::time::Duration;
///
/// # futures_lite::future::block_on(async {
/// let ctx = Context::background();
/// let res: Result<u8, String> = Timeout::new(&ctx, || Ok(3), Duration::from_secs(1)).await;
/// assert_eq!(res, Ok(3));
/// # });
/// ```
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Timeout<T, E> {
    inner: Within<Delivery<T, E>>,
}

impl<T, E> Timeout<T, E>
where
    T: Send + 'static,
    E: From<Panicked> + From<DeadlineExceeded> + Send + 'static,
{
    /// Launch `operation` and bound the wait for it by `timeout`, derived
    /// from `ctx`.
    ///
    /// The operation starts right away, not when the future is first polled.
    pub fn new<O>(ctx: &Context, operation: O, timeout: Duration) -> Self
    where
        O: Operation<T, E>,
    {
        let ctx = ctx.with_timeout(timeout);
        let (sender, receiver) = mailbox();
        spawn_operation(0, operation, move |outcome| {
            if !sender.try_deliver(outcome) {
                tracing::trace!("timeout already resolved, dropping late outcome");
            }
        });
        Self {
            inner: ctx.within(Delivery { receiver }),
        }
    }
}

impl<T, E> Future for Timeout<T, E>
where
    E: From<Panicked> + From<DeadlineExceeded>,
{
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl<T, E> FusedFuture for Timeout<T, E>
where
    E: From<Panicked> + From<DeadlineExceeded>,
{
    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}

impl<T, E> fmt::Debug for Timeout<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeout").finish_non_exhaustive()
    }
}

/// The operation's side of the race against the deadline.
struct Delivery<T, E> {
    receiver: Receiver<Result<T, E>>,
}

impl<T, E> Future for Delivery<T, E>
where
    E: From<Panicked>,
{
    type Output = (Instant, Result<T, E>);

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.receiver).poll(cx)) {
            Some(delivery) => Poll::Ready(delivery),
            None => Poll::Ready((Instant::now(), Err(E::from(Panicked::abandoned())))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;
    use std::io;
    use std::thread;

    fn sleepy(delay: Duration) -> impl FnOnce() -> Result<u8, String> + Send + 'static {
        move || {
            thread::sleep(delay);
            Ok(1)
        }
    }

    #[test]
    fn elapses_before_slow_operation() {
        let ctx = Context::background();
        let start = Instant::now();
        let res = timeout(&ctx, sleepy(Duration::from_millis(400)), Duration::from_millis(100));
        let elapsed = start.elapsed();
        assert_eq!(res, Err("deadline of 100ms elapsed".to_owned()));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(400), "waited {elapsed:?}");
    }

    #[test]
    fn late_poll_still_reports_elapsed_deadline() {
        let ctx = Context::background();
        let slow = sleepy(Duration::from_millis(100));
        let fut = Timeout::new(&ctx, slow, Duration::from_millis(20));
        // Both the deadline and the outcome are in by the time we look.
        thread::sleep(Duration::from_millis(200));
        assert_eq!(block_on(fut), Err("deadline of 20ms elapsed".to_owned()));
    }

    #[test]
    fn late_poll_keeps_outcome_delivered_in_time() {
        let ctx = Context::background();
        let fut = Timeout::new(&ctx, sleepy(Duration::ZERO), Duration::from_millis(50));
        thread::sleep(Duration::from_millis(150));
        assert_eq!(block_on(fut), Ok(1));
    }

    #[test]
    fn passes_fast_outcome_through() {
        let ctx = Context::background();
        let res = timeout(&ctx, sleepy(Duration::ZERO), Duration::from_secs(1));
        assert_eq!(res, Ok(1));

        let res: Result<u8, String> =
            timeout(&ctx, || Err("nope".to_owned()), Duration::from_secs(1));
        assert_eq!(res, Err("nope".to_owned()));
    }

    #[test]
    fn panic_resolves_promptly() {
        let ctx = Context::background();
        let start = Instant::now();
        let res: Result<u8, Error<io::Error>> = timeout(
            &ctx,
            || -> Result<u8, Error<io::Error>> { panic!("oops") },
            Duration::from_secs(5),
        );
        match res {
            Err(Error::Panicked(panicked)) => assert_eq!(panicked.message(), "oops"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn parent_cancellation_ends_wait() {
        let ctx = Context::background();
        let handle = ctx.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.cancel();
        });
        let slow = sleepy(Duration::from_millis(300));
        let res = timeout(&ctx, slow, Duration::from_secs(5));
        assert_eq!(res, Err("context cancelled".to_owned()));
        canceller.join().unwrap();
    }

    #[test]
    fn with_timeout_is_an_operation() {
        let ctx = Context::background();
        let slow = sleepy(Duration::from_millis(300));
        let op = with_timeout(&ctx, slow, Duration::from_millis(20));
        assert_eq!(op.call(), Err("deadline of 20ms elapsed".to_owned()));

        let op = with_timeout(&ctx, || Ok::<_, String>(1), Duration::from_secs(1));
        assert_eq!(op.call(), Ok(1));
    }

    #[test]
    fn timed_out_operation_keeps_running() {
        let (tx, rx) = std::sync::mpsc::channel();
        let ctx = Context::background();
        let op = move || {
            thread::sleep(Duration::from_millis(100));
            let _ = tx.send(());
            Ok::<u8, String>(1)
        };
        assert!(timeout(&ctx, op, Duration::from_millis(10)).is_err());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
}
