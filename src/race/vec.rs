use super::{FirstOk, Race};
use crate::error::Panicked;
use crate::operation::Operation;

impl<O, T, E> FirstOk<T, E> for Vec<O>
where
    O: Operation<T, E>,
    T: Send + 'static,
    E: From<Panicked> + Send + 'static,
{
    fn first_ok(self) -> Race<T, E> {
        Race::new(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operation::BoxOperation;
    use futures_lite::future::block_on;
    use std::sync::mpsc::{self, Receiver};
    use std::thread;
    use std::time::Duration;

    /// A signal which fires `delay` after `notify` is called.
    fn notify_after(delay: Duration) -> (Receiver<()>, impl FnOnce() + Send + 'static) {
        let (tx, rx) = mpsc::channel();
        let notify = move || {
            thread::spawn(move || {
                thread::sleep(delay);
                let _ = tx.send(());
            });
        };
        (rx, notify)
    }

    const DELAY: Duration = Duration::from_millis(50);

    #[test]
    fn fast_success_beats_slow_success() {
        let (signal, notify) = notify_after(DELAY);
        let operations: Vec<BoxOperation<u32, String>> = vec![
            Box::new(move || {
                let _ = signal.recv();
                Ok(1)
            }),
            Box::new(move || {
                notify();
                Ok(2)
            }),
        ];
        assert_eq!(block_on(operations.first_ok()), Ok(2));
    }

    #[test]
    fn last_failure_wins() {
        let (signal, notify) = notify_after(DELAY);
        let operations: Vec<BoxOperation<u32, String>> = vec![
            Box::new(move || {
                let _ = signal.recv();
                Err("error in worker1".to_owned())
            }),
            Box::new(move || {
                notify();
                Err("error in worker2".to_owned())
            }),
        ];
        assert_eq!(
            block_on(operations.first_ok()),
            Err("error in worker1".to_owned())
        );
    }

    #[test]
    fn slow_success_beats_fast_failure() {
        let (signal, notify) = notify_after(DELAY);
        let operations: Vec<BoxOperation<u32, String>> = vec![
            Box::new(move || {
                let _ = signal.recv();
                Ok(1)
            }),
            Box::new(move || {
                notify();
                Err("error in worker".to_owned())
            }),
        ];
        assert_eq!(block_on(operations.first_ok()), Ok(1));
    }

    #[test]
    fn slow_success_beats_fast_panic() {
        let (signal, notify) = notify_after(DELAY);
        let operations: Vec<BoxOperation<u32, String>> = vec![
            Box::new(move || {
                let _ = signal.recv();
                Ok(1)
            }),
            Box::new(move || -> Result<u32, String> {
                notify();
                panic!("panic in worker");
            }),
        ];
        assert_eq!(block_on(operations.first_ok()), Ok(1));
    }

    #[test]
    fn last_panic_wins() {
        let (signal, notify) = notify_after(DELAY);
        let operations: Vec<BoxOperation<u32, String>> = vec![
            Box::new(move || -> Result<u32, String> {
                let _ = signal.recv();
                panic!("panic in worker1");
            }),
            Box::new(move || -> Result<u32, String> {
                notify();
                panic!("panic in worker2");
            }),
        ];
        let err = block_on(operations.first_ok()).unwrap_err();
        assert!(err.contains("panic in worker1"), "unexpected error: {err}");
    }

    #[test]
    fn one_of_many_successes() {
        let operations: Vec<_> = (0..8_u32).map(|n| move || Ok::<_, String>(n)).collect();
        let res = block_on(operations.first_ok()).unwrap();
        assert!(res < 8);
    }

    #[test]
    fn single_operation() {
        let res = block_on(vec![|| Err::<u32, _>("only".to_owned())].first_ok());
        assert_eq!(res, Err("only".to_owned()));
    }

    #[test]
    #[should_panic(expected = "a race requires at least one operation")]
    fn empty() {
        let operations: Vec<BoxOperation<u32, String>> = vec![];
        let _ = operations.first_ok();
    }

    /// An error whose conversion from a panic itself panics.
    #[derive(Debug, PartialEq)]
    struct Fragile(String);

    impl From<Panicked> for Fragile {
        fn from(panicked: Panicked) -> Self {
            if panicked.message() == "unconvertible" {
                panic!("cannot convert {panicked}");
            }
            Fragile(panicked.to_string())
        }
    }

    #[test]
    fn failed_panic_conversion_still_completes() {
        let (signal, notify) = notify_after(DELAY);
        let operations: Vec<BoxOperation<u32, Fragile>> = vec![
            Box::new(move || {
                notify();
                Err(Fragile("error in worker".to_owned()))
            }),
            Box::new(move || -> Result<u32, Fragile> {
                let _ = signal.recv();
                panic!("unconvertible");
            }),
        ];
        assert_eq!(
            block_on(operations.first_ok()),
            Err(Fragile(
                "operation panicked: operation exited without delivering an outcome".to_owned()
            ))
        );
    }

    #[test]
    fn failed_panic_conversion_loses_to_success() {
        let (signal, notify) = notify_after(DELAY);
        let operations: Vec<BoxOperation<u32, Fragile>> = vec![
            Box::new(move || -> Result<u32, Fragile> {
                notify();
                panic!("unconvertible");
            }),
            Box::new(move || {
                let _ = signal.recv();
                Ok(3)
            }),
        ];
        assert_eq!(block_on(operations.first_ok()), Ok(3));
    }

    #[test]
    fn losers_keep_running() {
        let (done_tx, done_rx) = mpsc::channel();
        let operations: Vec<BoxOperation<u32, String>> = vec![
            Box::new(move || {
                thread::sleep(DELAY);
                let _ = done_tx.send(());
                Ok(1)
            }),
            Box::new(|| Ok(2)),
        ];
        let race = operations.first_ok();
        assert_eq!(block_on(race), Ok(2));
        // The loser is neither cancelled nor awaited; it still finishes.
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
}
