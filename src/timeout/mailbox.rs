//! A single-slot, non-blocking hand-off.
//!
//! The sender can deliver at most one value, and never waits: if the receiver
//! is gone by the time the value arrives, the value is dropped on the spot.
//! A delivered value is stamped with the instant it arrived, so the receiver
//! can tell how it relates to a deadline however late it reads it.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::utils::{lock, register};

struct Slot<T> {
    value: Option<(Instant, T)>,
    waker: Option<Waker>,
    receiving: bool,
    sending: bool,
}

pub(crate) fn mailbox<T>() -> (Sender<T>, Receiver<T>) {
    let slot = Arc::new(Mutex::new(Slot {
        value: None,
        waker: None,
        receiving: true,
        sending: true,
    }));
    (Sender { slot: slot.clone() }, Receiver { slot })
}

pub(crate) struct Sender<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Sender<T> {
    /// Hand `value` to the receiver if it is still waiting, otherwise drop it.
    ///
    /// Returns `true` if the value was delivered.
    pub(crate) fn try_deliver(self, value: T) -> bool {
        let waker = {
            let mut slot = lock(&self.slot);
            if !slot.receiving {
                return false;
            }
            slot.value = Some((Instant::now(), value));
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let waker = {
            let mut slot = lock(&self.slot);
            slot.sending = false;
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Resolves to the delivered value and the instant it arrived, or `None` if
/// the sender went away without delivering one.
pub(crate) struct Receiver<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Future for Receiver<T> {
    type Output = Option<(Instant, T)>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = lock(&self.slot);
        if let Some(delivery) = slot.value.take() {
            return Poll::Ready(Some(delivery));
        }
        if !slot.sending {
            return Poll::Ready(None);
        }
        register(&mut slot.waker, cx.waker());
        Poll::Pending
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let value = {
            let mut slot = lock(&self.slot);
            slot.receiving = false;
            slot.waker = None;
            slot.value.take()
        };
        // Dropped outside the lock, it may run arbitrary destructors.
        drop(value);
    }
}
