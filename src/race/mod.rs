//! The race coordinator: first success, else last failure.
//!
//! A race launches every operation on its own thread at once and resolves to
//! a single outcome:
//!
//! - the first operation to succeed wins immediately, however many are still
//!   running;
//! - if none succeeds, the race resolves to the failure of whichever operation
//!   completed *last*. Not the first failure.
//!
//! Panics count as failures: they are caught on the operation's thread and
//! converted into the race's error type.
//!
//! # Losing operations keep running
//!
//! Nothing is cancelled or joined once the race is decided. Operations which
//! lost keep running on their detached threads until they return on their
//! own, and their outcomes are dropped on arrival. Long-running operations
//! therefore outlive the race that started them; operations that should stop
//! early need their own cooperative signal, such as a cloned [`Context`].
//!
//! [`Context`]: crate::Context

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{ready, Context as TaskContext, Poll};
use std::sync::Arc;
use std::time::Instant;

use futures_core::future::FusedFuture;
use futures_lite::future::block_on;

use crate::context::Context;
use crate::error::{DeadlineExceeded, Panicked};
use crate::operation::Operation;
use crate::utils::spawn_operation;

use state::RaceState;

mod array;
mod state;
mod vec;

/// Race a set of operations, returning the first success or the last failure.
///
/// The same race as [`FirstOk::first_ok`], for anything that can be iterated
/// over.
///
/// # Panics
///
/// Panics if `operations` is empty: a race without participants can never be
/// decided.
///
/// # Example
///
/// ```
/// use futures_anyone::race;
/// use futures_lite::future::block_on;
///
/// fn unavailable() -> Result<u8, String> {
///     Err("unavailable".to_owned())
/// }
/// fn available() -> Result<u8, String> {
///     Ok(8)
/// }
///
/// let fut = race([unavailable as fn() -> _, available]);
/// assert_eq!(block_on(fut), Ok(8));
/// ```
pub fn race<I, O, T, E>(operations: I) -> Race<T, E>
where
    I: IntoIterator<Item = O>,
    O: Operation<T, E>,
    T: Send + 'static,
    E: From<Panicked> + Send + 'static,
{
    Race::new(operations)
}

/// Race a set of operations, blocking the current thread until the race is
/// decided or `ctx` ends.
///
/// Returns the first success, or the failure of the last operation to
/// complete if none succeeded. If `ctx` is cancelled or its deadline passes
/// first, returns the corresponding [`DeadlineExceeded`] error instead. The
/// context only bounds how long the caller waits: running operations are not
/// told about it.
///
/// A race decided at the same instant the context ends counts as decided in
/// time.
///
/// # Panics
///
/// Panics if `operations` is empty.
///
/// # Example
///
/// ```
/// use futures_anyone::{run, BoxOperation, Context};
/// use std::io;
/// use std::thread;
/// use std::time::Duration;
///
/// let operations: Vec<BoxOperation<&str, io::Error>> = vec![
///     Box::new(|| {
///         thread::sleep(Duration::from_millis(50));
///         Ok("slow")
///     }),
///     Box::new(|| Ok("fast")),
/// ];
///
/// let ctx = Context::background();
/// assert_eq!(run(&ctx, operations).unwrap(), "fast");
/// ```
pub fn run<I, O, T, E>(ctx: &Context, operations: I) -> Result<T, E>
where
    I: IntoIterator<Item = O>,
    O: Operation<T, E>,
    T: Send + 'static,
    E: From<Panicked> + From<DeadlineExceeded> + Send + 'static,
{
    block_on(ctx.within(Decided {
        race: race(operations),
    }))
}

/// Race a collection of operations.
///
/// Launches every operation concurrently, and waits for the first one to
/// succeed. If all of them fail, resolves to the failure of the operation
/// which completed last.
///
/// Operations are launched when `first_ok` is called, not when the returned
/// future is first polled. Dropping the future doesn't stop them.
pub trait FirstOk<T, E> {
    /// Race the operations, returning the first success or the last failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures_anyone::prelude::*;
    /// use futures_lite::future::block_on;
    ///
    /// fn fails() -> Result<u8, String> {
    ///     Err("e1".to_owned())
    /// }
    /// fn succeeds() -> Result<u8, String> {
    ///     Ok(2)
    /// }
    ///
    /// let res = block_on([fails as fn() -> _, succeeds].first_ok());
    /// assert_eq!(res, Ok(2));
    /// ```
    fn first_ok(self) -> Race<T, E>;
}

/// A future which waits for the first operation to succeed, or for the last
/// one to fail.
///
/// This `struct` is created by the [`race`] function and the [`first_ok`]
/// method on the [`FirstOk`] trait. See their documentation for more.
///
/// [`race`]: crate::race()
/// [`first_ok`]: FirstOk::first_ok
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Race<T, E> {
    state: Arc<RaceState<T, E>>,
    completed: bool,
}

impl<T, E> Race<T, E>
where
    T: Send + 'static,
    E: From<Panicked> + Send + 'static,
{
    pub(crate) fn new<I, O>(operations: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Operation<T, E>,
    {
        let operations: Vec<O> = operations.into_iter().collect();
        assert!(
            !operations.is_empty(),
            "a race requires at least one operation"
        );

        let state = Arc::new(RaceState::new(operations.len()));
        for (index, operation) in operations.into_iter().enumerate() {
            let report = Report {
                state: Some(state.clone()),
                index,
            };
            spawn_operation(index, operation, move |outcome| report.complete(outcome));
        }
        Self {
            state,
            completed: false,
        }
    }
}

impl<T, E> Race<T, E>
where
    E: From<Panicked>,
{
    fn poll_decided(&mut self, cx: &mut TaskContext<'_>) -> Poll<(Instant, Result<T, E>)> {
        assert!(!self.completed, "future polled after completing");
        let decided = ready!(self.state.poll_outcome(cx));
        self.completed = true;
        Poll::Ready(decided)
    }
}

impl<T, E> Future for Race<T, E>
where
    E: From<Panicked>,
{
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        self.poll_decided(cx).map(|(_, outcome)| outcome)
    }
}

impl<T, E> FusedFuture for Race<T, E>
where
    E: From<Panicked>,
{
    fn is_terminated(&self) -> bool {
        self.completed
    }
}

impl<T, E> fmt::Debug for Race<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Race")
            .field("total", &self.state.total())
            .field("completed", &self.state.completed())
            .field("decided", &self.state.is_decided())
            .finish()
    }
}

/// A race whose outcome carries the instant it was decided.
struct Decided<T, E> {
    race: Race<T, E>,
}

impl<T, E> Future for Decided<T, E>
where
    E: From<Panicked>,
{
    type Output = (Instant, Result<T, E>);

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        self.race.poll_decided(cx)
    }
}

/// Hands one operation's outcome to its race.
///
/// If the operation's thread unwinds before producing an outcome, dropping the
/// report still counts the operation as completed, so the race can't be left
/// waiting for it.
struct Report<T, E> {
    state: Option<Arc<RaceState<T, E>>>,
    index: usize,
}

impl<T, E> Report<T, E> {
    fn complete(mut self, outcome: Result<T, E>) {
        if let Some(state) = self.state.take() {
            state.decide(self.index, outcome);
        }
    }
}

impl<T, E> Drop for Report<T, E> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.abandon(self.index);
        }
    }
}
