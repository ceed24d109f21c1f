//! Cancellation contexts.
//!
//! A [`Context`] bounds how long a caller is willing to wait. It can be
//! cancelled explicitly, carry a deadline, or both, and child contexts inherit
//! cancellation and deadlines from their parents.
//!
//! Contexts are never propagated into operations by this crate: a context
//! ending only stops the *caller* from waiting. Operations which want to stop
//! early can capture a clone of the context and check
//! [`Context::is_cancelled`] themselves.

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{ready, Context as TaskContext, Poll, Waker};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use async_io::Timer;
use futures_core::future::FusedFuture;
use slab::Slab;
use smallvec::SmallVec;

use crate::error::DeadlineExceeded;
use crate::utils::lock;

/// A cancellation token with an optional deadline.
///
/// Cloning a `Context` yields a handle to the same token.
///
/// # Example
///
/// ```
/// use futures_anyone::Context;
/// use std::time::Duration;
///
/// let parent = Context::background();
/// let child = parent.with_timeout(Duration::from_secs(30));
/// assert!(child.err().is_none());
///
/// parent.cancel();
/// assert!(child.is_cancelled());
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    parent: Option<Context>,
    deadline: Option<Deadline>,
    cancelled_at: OnceLock<Instant>,
    waiters: Mutex<Slab<Waker>>,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    timeout: Duration,
}

impl Context {
    /// Create a root context, which has no deadline and is only ever
    /// cancelled by calling [`cancel`][Context::cancel].
    pub fn background() -> Self {
        Self::with_parts(None, None)
    }

    fn with_parts(parent: Option<Context>, deadline: Option<Deadline>) -> Self {
        Self {
            inner: Arc::new(Inner {
                parent,
                deadline,
                cancelled_at: OnceLock::new(),
                waiters: Mutex::new(Slab::new()),
            }),
        }
    }

    /// Derive a child context which ends `timeout` from now.
    ///
    /// If this context ends earlier, the child ends with it.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now()
            .checked_add(timeout)
            .map(|at| Deadline { at, timeout });
        self.child(deadline)
    }

    /// Derive a child context which ends at `deadline`.
    ///
    /// If this context ends earlier, the child ends with it.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let timeout = deadline.saturating_duration_since(Instant::now());
        self.child(Some(Deadline {
            at: deadline,
            timeout,
        }))
    }

    fn child(&self, deadline: Option<Deadline>) -> Self {
        let deadline = match (self.inner.deadline, deadline) {
            (Some(parent), Some(own)) if parent.at <= own.at => Some(parent),
            (parent, None) => parent,
            (_, own) => own,
        };
        Self::with_parts(Some(self.clone()), deadline)
    }

    /// Cancel this context and every context derived from it.
    ///
    /// Wakes all tasks waiting on [`done`][Context::done]. Cancelling more
    /// than once has no further effect.
    pub fn cancel(&self) {
        if self.inner.cancelled_at.set(Instant::now()).is_err() {
            return;
        }
        tracing::trace!("context cancelled");
        for (_, waker) in lock(&self.inner.waiters).iter() {
            waker.wake_by_ref();
        }
    }

    /// Returns `true` if this context has been cancelled or its deadline has
    /// passed.
    pub fn is_cancelled(&self) -> bool {
        self.err().is_some()
    }

    /// Why this context ended, or `None` while it is still live.
    pub fn err(&self) -> Option<DeadlineExceeded> {
        if self.cancelled_at().is_some() {
            return Some(DeadlineExceeded::Cancelled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline.at => Some(DeadlineExceeded::Elapsed {
                timeout: deadline.timeout,
            }),
            _ => None,
        }
    }

    /// Why this context had already ended at `at`, or `None` if it was still
    /// live then.
    ///
    /// An outcome settling at the very instant the context ends still counts
    /// as in time.
    pub(crate) fn err_at(&self, at: Instant) -> Option<DeadlineExceeded> {
        let cancelled = self.cancelled_at().filter(|cancelled| *cancelled < at);
        let elapsed = self.inner.deadline.filter(|deadline| deadline.at < at);
        match (cancelled, elapsed) {
            (Some(cancelled), Some(deadline)) if deadline.at < cancelled => {
                Some(DeadlineExceeded::Elapsed {
                    timeout: deadline.timeout,
                })
            }
            (Some(_), _) => Some(DeadlineExceeded::Cancelled),
            (None, Some(deadline)) => Some(DeadlineExceeded::Elapsed {
                timeout: deadline.timeout,
            }),
            (None, None) => None,
        }
    }

    /// The earliest cancellation along the ancestor chain.
    fn cancelled_at(&self) -> Option<Instant> {
        self.ancestors()
            .filter_map(|ctx| ctx.inner.cancelled_at.get().copied())
            .min()
    }

    /// The instant at which this context ends, if it has a deadline.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline.map(|deadline| deadline.at)
    }

    /// Wait for this context to end.
    ///
    /// # Example
    ///
    /// ```
    /// use futures_anyone::{error::DeadlineExceeded, Context};
    /// use futures_lite::future::block_on;
    /// use std::time::Duration;
    ///
    /// let timeout = Duration::from_millis(10);
    /// let ctx = Context::background().with_timeout(timeout);
    /// assert_eq!(block_on(ctx.done()), DeadlineExceeded::Elapsed { timeout });
    /// ```
    pub fn done(&self) -> Done {
        Done {
            context: self.clone(),
            timer: self.inner.deadline.map(|deadline| Timer::at(deadline.at)),
            registrations: SmallVec::new(),
            completed: false,
        }
    }

    /// Bound a fallible future by this context.
    ///
    /// The returned future resolves to the output of `future` if it completes
    /// first, or to the reason this context ended otherwise. `future` is
    /// dropped, not driven further, once the context ends.
    ///
    /// The output of `future` counts from the moment it is polled to
    /// completion: if that happens after the context ended, the context wins.
    ///
    /// # Example
    ///
    /// ```
    /// use futures_anyone::Context;
    /// use futures_lite::future::{block_on, pending};
    /// use std::time::Duration;
    ///
    /// let ctx = Context::background().with_timeout(Duration::from_millis(10));
    /// let res: Result<(), String> = block_on(ctx.bound(pending()));
    /// assert_eq!(res.unwrap_err(), "deadline of 10ms elapsed");
    /// ```
    pub fn bound<F, T, E>(&self, future: F) -> Bounded<F>
    where
        F: Future<Output = Result<T, E>>,
        E: From<DeadlineExceeded>,
    {
        Bounded {
            inner: self.within(Stamped { future }),
        }
    }

    /// Bound a future whose output carries the instant it settled.
    ///
    /// The output wins if it settled before this context ended, however late
    /// the returned future is polled.
    pub(crate) fn within<F, T, E>(&self, future: F) -> Within<F>
    where
        F: Future<Output = (Instant, Result<T, E>)>,
        E: From<DeadlineExceeded>,
    {
        Within {
            future: Some(future),
            done: self.done(),
        }
    }

    fn ancestors(&self) -> impl Iterator<Item = &Context> {
        std::iter::successors(Some(self), |ctx| ctx.inner.parent.as_ref())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("err", &self.err())
            .finish()
    }
}

/// Future which resolves once a [`Context`] ends.
///
/// This `struct` is created by the [`done`] method on [`Context`]. See its
/// documentation for more.
///
/// [`done`]: Context::done
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Done {
    context: Context,
    timer: Option<Timer>,
    // One waker slot in every context of the ancestor chain, so cancelling any
    // of them wakes us.
    registrations: SmallVec<[(Context, usize); 2]>,
    completed: bool,
}

impl Done {
    fn register(&mut self, waker: &Waker) {
        if self.registrations.is_empty() {
            for ctx in self.context.ancestors() {
                let key = lock(&ctx.inner.waiters).insert(waker.clone());
                self.registrations.push((ctx.clone(), key));
            }
            return;
        }
        for (ctx, key) in &self.registrations {
            let mut waiters = lock(&ctx.inner.waiters);
            if let Some(slot) = waiters.get_mut(*key) {
                if !slot.will_wake(waker) {
                    *slot = waker.clone();
                }
            }
        }
    }

    fn deregister(&mut self) {
        for (ctx, key) in self.registrations.drain(..) {
            lock(&ctx.inner.waiters).try_remove(key);
        }
    }
}

impl Future for Done {
    type Output = DeadlineExceeded;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        assert!(!this.completed, "future polled after completing");

        let mut fired = false;
        if let Some(timer) = this.timer.as_mut() {
            if Pin::new(timer).poll(cx).is_ready() {
                this.timer = None;
                fired = true;
            }
        }

        let err = match (this.context.err(), this.context.inner.deadline) {
            (Some(err), _) => err,
            (None, Some(deadline)) if fired => DeadlineExceeded::Elapsed {
                timeout: deadline.timeout,
            },
            (None, _) => {
                this.register(cx.waker());
                // A cancellation may have slipped in before our waker was
                // registered.
                ready!(this.context.err().map_or(Poll::Pending, Poll::Ready))
            }
        };
        this.completed = true;
        this.deregister();
        Poll::Ready(err)
    }
}

impl FusedFuture for Done {
    fn is_terminated(&self) -> bool {
        self.completed
    }
}

impl Drop for Done {
    fn drop(&mut self) {
        self.deregister();
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done")
            .field("context", &self.context)
            .field("completed", &self.completed)
            .finish()
    }
}

/// Bounds a fallible future by a [`Context`].
///
/// This `struct` is created by the [`bound`] method on [`Context`]. See its
/// documentation for more.
///
/// [`bound`]: Context::bound
#[derive(Debug)]
#[pin_project::pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Bounded<F> {
    #[pin]
    inner: Within<Stamped<F>>,
}

impl<F, T, E> Future for Bounded<F>
where
    F: Future<Output = Result<T, E>>,
    E: From<DeadlineExceeded>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        self.project().inner.poll(cx)
    }
}

impl<F, T, E> FusedFuture for Bounded<F>
where
    F: Future<Output = Result<T, E>>,
    E: From<DeadlineExceeded>,
{
    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}

/// Stamps the output of a future with the instant it was observed.
#[derive(Debug)]
#[pin_project::pin_project]
pub(crate) struct Stamped<F> {
    #[pin]
    future: F,
}

impl<F: Future> Future for Stamped<F> {
    type Output = (Instant, F::Output);

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let output = ready!(self.project().future.poll(cx));
        Poll::Ready((Instant::now(), output))
    }
}

/// Bounds a future by a [`Context`], judging its output by the instant it
/// settled rather than the instant it was observed.
#[derive(Debug)]
#[pin_project::pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub(crate) struct Within<F> {
    #[pin]
    future: Option<F>,
    done: Done,
}

impl<F, T, E> Future for Within<F>
where
    F: Future<Output = (Instant, Result<T, E>)>,
    E: From<DeadlineExceeded>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        let future = match this.future.as_mut().as_pin_mut() {
            Some(future) => future,
            None => panic!("future polled after completing"),
        };

        let err = match future.poll(cx) {
            // Polled late, both sides may be ready: the earlier one wins.
            Poll::Ready((at, output)) => match this.done.context.err_at(at) {
                None => {
                    this.future.set(None);
                    return Poll::Ready(output);
                }
                Some(err) => err,
            },
            Poll::Pending => ready!(Pin::new(&mut *this.done).poll(cx)),
        };
        tracing::debug!("stopped waiting: {err}");
        this.future.set(None);
        Poll::Ready(Err(E::from(err)))
    }
}

impl<F, T, E> FusedFuture for Within<F>
where
    F: Future<Output = (Instant, Result<T, E>)>,
    E: From<DeadlineExceeded>,
{
    fn is_terminated(&self) -> bool {
        self.future.is_none()
    }
}
