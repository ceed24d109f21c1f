//! Errors raised by the harness itself.
//!
//! Operations report their own failures through their error type `E`. On top
//! of that, the harness can produce two failures of its own: a recovered panic
//! ([`Panicked`]) and an expired or cancelled [`Context`] ([`DeadlineExceeded`]).
//! Both are folded into `E` through `From`, so a race over timeout-wrapped
//! operations still resolves to a plain `Result<T, E>`.
//!
//! Conversions are provided for [`std::io::Error`], [`String`] and (through
//! the standard library) `Box<dyn Error + Send + Sync>`. When an operation's
//! error type can't absorb them, wrap it in [`Error`].
//!
//! [`Context`]: crate::Context

use std::any::Any;
use std::io;
use std::time::Duration;

use thiserror::Error as ThisError;

/// A panic raised inside an operation.
///
/// The panic is caught at the operation's own thread boundary and re-expressed
/// as a regular error, carrying the panic payload when it was a string.
///
/// # Example
///
/// ```
/// use futures_anyone::{run, Context};
///
/// let ctx = Context::background();
/// let res: Result<u8, String> = run(&ctx, vec![|| -> Result<u8, String> { panic!("boom") }]);
/// assert_eq!(res.unwrap_err(), "operation panicked: boom");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("operation panicked: {message}")]
pub struct Panicked {
    message: String,
}

impl Panicked {
    /// Create a new instance from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast_ref::<&'static str>() {
                Some(message) => (*message).to_owned(),
                None => "Box<dyn Any>".to_owned(),
            },
        };
        Self { message }
    }

    /// The fault reported for an operation whose thread ended without handing
    /// over an outcome, such as when converting its panic panicked again.
    pub(crate) fn abandoned() -> Self {
        Self::new("operation exited without delivering an outcome")
    }

    /// The panic payload, or `Box<dyn Any>` if the payload wasn't a string.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A bounded wait ended before its operation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum DeadlineExceeded {
    /// The deadline of the context expired.
    #[error("deadline of {timeout:?} elapsed")]
    Elapsed {
        /// The bound the context was created with.
        timeout: Duration,
    },
    /// The context, or one of its parents, was cancelled.
    #[error("context cancelled")]
    Cancelled,
}

impl DeadlineExceeded {
    /// Returns `true` if the deadline expired.
    pub fn is_elapsed(&self) -> bool {
        matches!(self, Self::Elapsed { .. })
    }
}

/// An operation error, or one of the errors raised by the harness.
///
/// Useful when the operation's own error type has no `From` conversions for
/// [`Panicked`] and [`DeadlineExceeded`].
///
/// # Example
///
/// ```
/// use futures_anyone::{error::Error, run, Context};
///
/// #[derive(Debug)]
/// struct Unavailable;
///
/// let ctx = Context::background();
/// let operations = vec![|| Err(Error::Operation(Unavailable))];
/// let res: Result<u8, Error<Unavailable>> = run(&ctx, operations);
/// assert!(matches!(res, Err(Error::Operation(Unavailable))));
/// ```
#[derive(Debug, ThisError)]
pub enum Error<E> {
    /// The operation itself failed.
    #[error(transparent)]
    Operation(E),
    /// The operation panicked.
    #[error(transparent)]
    Panicked(#[from] Panicked),
    /// The wait was bounded and the bound was reached.
    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

impl<E> Error<E> {
    /// Returns the operation's own error, if this is one.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(err) => Some(err),
            _ => None,
        }
    }

    /// Returns `true` if the bound of the wait was reached.
    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::Deadline(_))
    }
}

impl From<Panicked> for io::Error {
    fn from(err: Panicked) -> Self {
        io::Error::other(err)
    }
}

impl From<DeadlineExceeded> for io::Error {
    fn from(err: DeadlineExceeded) -> Self {
        let kind = match err {
            DeadlineExceeded::Elapsed { .. } => io::ErrorKind::TimedOut,
            DeadlineExceeded::Cancelled => io::ErrorKind::Interrupted,
        };
        io::Error::new(kind, err)
    }
}

impl From<Panicked> for String {
    fn from(err: Panicked) -> Self {
        err.to_string()
    }
}

impl From<DeadlineExceeded> for String {
    fn from(err: DeadlineExceeded) -> Self {
        err.to_string()
    }
}
