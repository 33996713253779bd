//! A lazily constructed, thread-safe single-instance holder.
//!
//! [`LazySingletonHolder<T, F>`] owns a factory `F` and builds exactly one `T`
//! from it on first access, however many threads get there at once. It is the
//! double-checked locking pattern done with the memory ordering it needs:
//!
//! 1. An `Acquire` load of the holder's state. If the instance is published,
//!    return it without locking.
//! 2. Otherwise take the holder-scoped lock, parking on a futex through
//!    `parking_lot_core` if another caller already holds it.
//! 3. Re-check under the lock. Whoever published first wins, everyone else
//!    returns that instance.
//! 4. Run the factory, write the instance, and publish with `Release`.
//!
//! A factory that fails (returns `Err`, panics, or has its future dropped)
//! leaves the holder empty so the next access retries.
//!
//! # Features
//!
//! - `async-tokio` (default): enables the async accessors. Callers waiting on
//!   an in-flight construction await a `tokio::sync::Notify` and never block
//!   their worker, so they work on any executor and within a single task.
//! - `tracing`: emits `tracing` events around construction.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use lazy_singleton::LazySingletonHolder;
//!
//! static BUILDS: AtomicUsize = AtomicUsize::new(0);
//! static GREETING: LazySingletonHolder<String> = LazySingletonHolder::new(|| {
//!    BUILDS.fetch_add(1, Ordering::Relaxed);
//!    "hello".to_string()
//! });
//!
//! std::thread::scope(|s| {
//!    for _ in 0..4 {
//!       s.spawn(|| assert_eq!(GREETING.get_instance(), "hello"));
//!    }
//! });
//! assert_eq!(BUILDS.load(Ordering::Relaxed), 1);
//! ```
//!
//! Fallible factories report [`Error::ConstructionFailure`] and stay retryable:
//!
//! ```rust
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! use lazy_singleton::{Error, LazySingletonHolder};
//!
//! let online = AtomicBool::new(false);
//! let pool = LazySingletonHolder::new(|| {
//!    if online.load(Ordering::SeqCst) {
//!       Ok(vec![0u8; 4])
//!    } else {
//!       Err("backend offline")
//!    }
//! });
//!
//! assert_eq!(pool.try_get_instance(), Err(Error::ConstructionFailure("backend offline")));
//! assert!(!pool.is_ready());
//!
//! online.store(true, Ordering::SeqCst);
//! assert_eq!(pool.try_get_instance().map(Vec::len), Ok(4));
//! ```

macro_rules! trace_event {
   ($level:ident, $($arg:tt)+) => {
      #[cfg(feature = "tracing")]
      tracing::$level!($($arg)+);
   };
}
pub(crate) use trace_event;

/// Error type for fallible construction.
mod error;

/// The holder itself.
mod holder;

/// Lock and publication state.
mod state;

pub use error::{Error, Result};
pub use holder::LazySingletonHolder;
