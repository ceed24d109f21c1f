//! The unit of work raced by this crate.

/// A zero-argument unit of work producing a value or an error.
///
/// Operations are supplied by the caller and invoked exactly once, on a thread
/// of their own, concurrently with their siblings in a race. They may block or
/// perform arbitrary I/O, and may run for an unbounded time: the harness never
/// interrupts them.
///
/// Any `FnOnce() -> Result<T, E>` closure which is `Send + 'static` is an
/// operation. [`with_timeout`] produces an operation as well, which is how the
/// timeout decorator composes with [`race`].
///
/// # Example
///
/// ```
/// use futures_anyone::Operation;
///
/// fn invoke<O: Operation<u8, String>>(operation: O) -> Result<u8, String> {
///     operation.call()
/// }
///
/// assert_eq!(invoke(|| Ok(7)), Ok(7));
/// ```
///
/// [`with_timeout`]: crate::with_timeout
/// [`race`]: crate::race()
pub trait Operation<T, E>: Send + 'static {
    /// Run the operation to completion.
    fn call(self) -> Result<T, E>;
}

impl<F, T, E> Operation<T, E> for F
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    fn call(self) -> Result<T, E> {
        self()
    }
}

/// A type-erased operation.
///
/// Every closure has its own type, so racing differently-shaped closures
/// requires boxing them into a single type first.
///
/// # Example
///
/// ```
/// use futures_anyone::{run, BoxOperation, Context};
///
/// let primary: BoxOperation<&str, String> = Box::new(|| Err("unreachable".to_owned()));
/// let fallback: BoxOperation<&str, String> = Box::new(|| Ok("fallback"));
///
/// let ctx = Context::background();
/// assert_eq!(run(&ctx, vec![primary, fallback]), Ok("fallback"));
/// ```
pub type BoxOperation<T, E> = Box<dyn FnOnce() -> Result<T, E> + Send + 'static>;
