//! Error type for fallible singleton construction.

use thiserror::Error;

/// Errors surfaced by the fallible accessors of
/// [`LazySingletonHolder`](crate::LazySingletonHolder).
///
/// The holder is left empty whenever one of these is returned, so the next
/// access runs the factory again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error<E> {
   /// The factory returned an error instead of an instance.
   #[error("singleton construction failed: {0}")]
   ConstructionFailure(#[source] E),
}

impl<E> Error<E> {
   /// Returns the error produced by the factory.
   pub fn into_source(self) -> E {
      match self {
         Self::ConstructionFailure(source) => source,
      }
   }
}

/// Shorthand for results of fallible construction.
pub type Result<T, E> = core::result::Result<T, Error<E>>;
