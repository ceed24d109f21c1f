//! Race redundant operations, and bound them with deadlines.
//!
//! When several backends or strategies can answer the same question, it is
//! often fastest to ask all of them at once and use whichever answers first.
//! This library provides two composable primitives for that:
//!
//! - [`race()`] / [`run`]: launch a set of equivalent operations concurrently
//!   and resolve to the first one that succeeds. If none does, resolve to the
//!   failure of the operation that completed *last*.
//! - [`timeout()`] / [`with_timeout`]: race a single operation against a
//!   deadline. `with_timeout` yields an operation again, so each candidate of
//!   a race can be bounded individually.
//!
//! Operations are plain closures returning a `Result`, run on threads of
//! their own. Panics inside them are caught and reported as errors; see
//! [`error`] for how harness errors are folded into the operation's error
//! type.
//!
//! # Examples
//!
//! Ask three mirrors and keep the first answer which arrives within a second:
//!
//! ```rust
//! use futures_anyone::{run, with_timeout, Context};
//! use std::io;
//! use std::time::Duration;
//!
//! let ctx = Context::background();
//! let mirrors = ["a.example", "b.example", "c.example"];
//! let operations: Vec<_> = mirrors
//!     .into_iter()
//!     .map(|host| {
//!         let fetch = move || -> io::Result<String> { Ok(format!("fetched from {host}")) };
//!         with_timeout(&ctx, fetch, Duration::from_secs(1))
//!     })
//!     .collect();
//!
//! let body = run(&ctx, operations)?;
//! assert!(body.starts_with("fetched from"));
//! # Ok::<(), io::Error>(())
//! ```
//!
//! The same race from async code:
//!
//! ```rust
//! use futures_anyone::prelude::*;
//! use futures_lite::future::block_on;
//!
//! block_on(async {
//!     let operations: Vec<_> = (1..=3_u8).map(|n| move || Ok::<_, String>(n)).collect();
//!     let n = operations.first_ok().await.unwrap();
//!     assert!((1..=3).contains(&n));
//! })
//! ```
//!
//! # Limitations
//!
//! Nothing is ever preempted. Operations which lose a race, or outlive their
//! timeout, keep running on their detached threads until they return on their
//! own; their outcomes are then dropped. A [`Context`] only bounds how long
//! the *caller* waits. Operations that should stop early can capture a clone
//! of it and check [`Context::is_cancelled`] cooperatively.

#![deny(missing_debug_implementations, nonstandard_style)]
#![warn(missing_docs, unreachable_pub)]

mod utils;

/// The futures-anyone prelude.
pub mod prelude {
    pub use super::operation::Operation as _;
    pub use super::race::FirstOk as _;
}

pub mod context;
pub mod error;
pub mod operation;
pub mod race;
pub mod timeout;

pub use context::Context;
pub use error::{DeadlineExceeded, Panicked};
pub use operation::{BoxOperation, Operation};
pub use race::{race, run, FirstOk, Race};
pub use timeout::{timeout, with_timeout, Timeout, WithTimeout};
