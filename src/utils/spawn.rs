use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crate::error::Panicked;
use crate::operation::Operation;

/// Run `operation` on its own detached thread and hand its outcome to
/// `on_complete`.
///
/// A panic inside the operation is caught on that thread and converted into
/// `E`, so it never reaches the caller or sibling operations. Nobody joins the
/// thread: if the outcome is no longer wanted, `on_complete` discards it.
pub(crate) fn spawn_operation<O, T, E, F>(index: usize, operation: O, on_complete: F)
where
    O: Operation<T, E>,
    T: Send + 'static,
    E: From<Panicked> + Send + 'static,
    F: FnOnce(Result<T, E>) + Send + 'static,
{
    tracing::trace!(index, "spawning operation");
    thread::spawn(move || {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| operation.call())) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let panicked = Panicked::from_payload(payload);
                tracing::warn!(index, "recovered from panic in operation: {panicked}");
                Err(E::from(panicked))
            }
        };
        on_complete(outcome);
    });
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn passes_outcome_through() {
        let (tx, rx) = mpsc::channel();
        spawn_operation(0, || Ok::<_, String>(12), move |res| tx.send(res).unwrap());
        assert_eq!(rx.recv().unwrap(), Ok(12));
    }

    #[test]
    fn converts_panics() {
        let (tx, rx) = mpsc::channel();
        spawn_operation(
            3,
            || -> Result<u8, String> { panic!("panic in worker") },
            move |res| tx.send(res).unwrap(),
        );
        assert_eq!(
            rx.recv().unwrap(),
            Err("operation panicked: panic in worker".to_owned())
        );
    }
}
