use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll, Waker};
use std::time::Instant;

use crate::error::Panicked;
use crate::utils::{lock, register};

/// The shared decision record of a single race.
///
/// Completions only ever go through [`decide`][RaceState::decide], which
/// performs the whole check-and-record step as one critical section.
pub(crate) struct RaceState<T, E> {
    total: usize,
    completed: AtomicUsize,
    // Mirrors `decision.outcome` having been set, readable without the lock.
    decided: AtomicBool,
    decision: Mutex<Decision<T, E>>,
}

struct Decision<T, E> {
    // The deciding completion, and when it was recorded.
    outcome: Option<(Instant, Completion<T, E>)>,
    waker: Option<Waker>,
}

enum Completion<T, E> {
    Delivered(Result<T, E>),
    // The operation's thread ended without handing over an outcome.
    Abandoned,
}

impl<T, E> Completion<T, E> {
    fn is_ok(&self) -> bool {
        matches!(self, Self::Delivered(Ok(_)))
    }
}

impl<T, E> RaceState<T, E> {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            decided: AtomicBool::new(false),
            decision: Mutex::new(Decision {
                outcome: None,
                waker: None,
            }),
        }
    }

    /// Record the completion of the operation at `index`.
    ///
    /// The race is decided by the first successful completion, or by the last
    /// completion if none succeeded. Completions arriving after the decision
    /// are discarded. Returns `true` if this completion decided the race.
    pub(crate) fn decide(&self, index: usize, outcome: Result<T, E>) -> bool {
        self.record(index, Completion::Delivered(outcome))
    }

    /// Record that the operation at `index` finished without an outcome.
    ///
    /// It counts as a failure. Should it decide the race, the waiter sees a
    /// [`Panicked`] error instead.
    pub(crate) fn abandon(&self, index: usize) -> bool {
        tracing::warn!(index, "operation exited without delivering an outcome");
        self.record(index, Completion::Abandoned)
    }

    fn record(&self, index: usize, outcome: Completion<T, E>) -> bool {
        if self.decided.load(Ordering::Acquire) {
            tracing::trace!(index, "race already decided, discarding outcome");
            return false;
        }

        let waker = {
            let mut decision = lock(&self.decision);
            if self.decided.load(Ordering::Acquire) {
                tracing::trace!(index, "race already decided, discarding outcome");
                return false;
            }

            // Counted under the lock, so the completion observing `total` is
            // the last one to reach this point and every earlier one failed.
            let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
            debug_assert!(completed <= self.total);
            if !outcome.is_ok() && completed < self.total {
                return false;
            }

            tracing::debug!(
                index,
                completed,
                total = self.total,
                success = outcome.is_ok(),
                "race decided"
            );
            decision.outcome = Some((Instant::now(), outcome));
            self.decided.store(true, Ordering::Release);
            decision.waker.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Take the recorded outcome and the instant the race was decided, or
    /// register to be woken once there is one.
    ///
    /// The outcome can be taken only once.
    pub(crate) fn poll_outcome(&self, cx: &mut Context<'_>) -> Poll<(Instant, Result<T, E>)>
    where
        E: From<Panicked>,
    {
        let (decided_at, completion) = {
            let mut decision = lock(&self.decision);
            match decision.outcome.take() {
                Some(outcome) => outcome,
                None => {
                    register(&mut decision.waker, cx.waker());
                    return Poll::Pending;
                }
            }
        };
        let outcome = match completion {
            Completion::Delivered(outcome) => outcome,
            Completion::Abandoned => Err(E::from(Panicked::abandoned())),
        };
        Poll::Ready((decided_at, outcome))
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn is_decided(&self) -> bool {
        self.decided.load(Ordering::Acquire)
    }
}
