//! Utilities shared by the race and timeout primitives.

mod spawn;

pub(crate) use spawn::spawn_operation;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::Waker;

/// Lock a mutex, ignoring poisoning.
///
/// No user code ever runs while one of our locks is held, so a poisoned lock
/// still guards consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Store `waker` in `slot` unless it would wake the same task already.
pub(crate) fn register(slot: &mut Option<Waker>, waker: &Waker) {
    if !slot.as_ref().is_some_and(|current| current.will_wake(waker)) {
        *slot = Some(waker.clone());
    }
}
