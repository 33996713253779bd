//! The lazily constructed single-instance holder.
//!
//! A [`LazySingletonHolder`] owns a factory and, after the first access, the
//! one instance that factory produced. Reads of a constructed holder are a
//! single `Acquire` load; only callers that arrive before publication touch
//! the lock.

use core::cell::UnsafeCell;
use core::fmt;
#[cfg(feature = "async-tokio")]
use core::future::Future;
use core::mem::MaybeUninit;
use core::ops::Deref;

use crate::error::Error;
use crate::state::{ConstructGuard, HolderState};

/// A thread-safe holder that constructs its instance on first access.
///
/// The factory `F` is supplied up front and invoked at most once successfully,
/// no matter how many threads race on the first access. A failed or panicking
/// factory leaves the holder empty, so a later access retries.
///
/// `F` defaults to `fn() -> T`, which lets a holder live in a `static`:
///
/// ```rust
/// use lazy_singleton::LazySingletonHolder;
///
/// struct Settings {
///    workers: usize,
/// }
///
/// static SETTINGS: LazySingletonHolder<Settings> =
///    LazySingletonHolder::new(|| Settings { workers: 4 });
///
/// assert_eq!(SETTINGS.get_instance().workers, 4);
/// assert_eq!(SETTINGS.workers, 4); // through `Deref`
/// ```
///
/// It can equally be a field of whatever context owns the instance and be
/// handed out by reference:
///
/// ```rust
/// use lazy_singleton::LazySingletonHolder;
///
/// struct AppContext<F: Fn() -> Vec<String>> {
///    routes: LazySingletonHolder<Vec<String>, F>,
/// }
///
/// let ctx = AppContext {
///    routes: LazySingletonHolder::new(|| vec!["/".to_string(), "/health".to_string()]),
/// };
/// assert!(!ctx.routes.is_ready());
/// assert_eq!(ctx.routes.get_instance().len(), 2);
/// assert!(ctx.routes.is_ready());
/// ```
pub struct LazySingletonHolder<T, F = fn() -> T> {
   slot: UnsafeCell<MaybeUninit<T>>,
   state: HolderState,
   factory: F,
}

impl<T, F> LazySingletonHolder<T, F> {
   /// Creates an empty holder that will build its instance with `factory`.
   #[inline]
   #[must_use]
   pub const fn new(factory: F) -> Self {
      Self {
         slot: UnsafeCell::new(MaybeUninit::uninit()),
         state: HolderState::new(),
         factory,
      }
   }

   /// Returns `true` once the instance has been constructed and published.
   ///
   /// Never blocks.
   #[inline]
   pub fn is_ready(&self) -> bool {
      self.state.is_ready()
   }

   /// Returns the instance if it has already been constructed.
   ///
   /// Never blocks and never runs the factory.
   #[inline]
   pub fn get(&self) -> Option<&T> {
      if self.state.is_ready() {
         // SAFETY: READY was observed with `Acquire`, so the slot is written
         // and every write the factory made is visible to us.
         Some(unsafe { self.instance_unchecked() })
      } else {
         None
      }
   }

   /// Returns the instance mutably if it has already been constructed.
   #[inline]
   pub fn get_mut(&mut self) -> Option<&mut T> {
      if self.state.is_ready_mut() {
         // SAFETY: READY is set and we have exclusive access.
         Some(unsafe { self.slot.get_mut().assume_init_mut() })
      } else {
         None
      }
   }

   /// Consumes the holder, returning the instance if one was constructed.
   pub fn into_inner(mut self) -> Option<T> {
      if !self.state.is_ready_mut() {
         return None;
      }
      // SAFETY: READY is set. Rolling back to an empty state afterwards keeps
      // `Drop` from touching the value we just moved out.
      let value = unsafe { self.slot.get_mut().assume_init_read() };
      self.state = HolderState::new();
      Some(value)
   }

   /// Returns the instance, constructing it on the first call.
   ///
   /// Callers that arrive while another thread is running the factory block
   /// until it publishes. If the factory panics, the panic reaches the caller
   /// that ran it and the holder stays empty.
   #[inline]
   pub fn get_instance(&self) -> &T
   where
      F: Fn() -> T,
   {
      if let Some(instance) = self.get() {
         return instance;
      }
      self.construct();
      // SAFETY: `construct` only returns once the instance is published.
      unsafe { self.instance_unchecked() }
   }

   /// Returns the instance, constructing it with a fallible factory on the
   /// first call.
   ///
   /// A factory error is returned as [`Error::ConstructionFailure`] to the caller
   /// that ran it and leaves the holder empty.
   pub fn try_get_instance<E>(&self) -> Result<&T, Error<E>>
   where
      F: Fn() -> Result<T, E>,
   {
      if let Some(instance) = self.get() {
         return Ok(instance);
      }
      self.try_construct()?;
      // SAFETY: `try_construct` returned Ok, so the instance is published.
      Ok(unsafe { self.instance_unchecked() })
   }

   /// Returns the instance, awaiting the factory's future on the first call.
   ///
   /// Callers that arrive during construction wait without blocking their
   /// worker thread, so the constructor may share a task or a single-threaded
   /// runtime with them. Dropping the returned future while it is constructing
   /// leaves the holder empty.
   #[cfg(feature = "async-tokio")]
   pub async fn get_instance_async<Fut>(&self) -> &T
   where
      F: Fn() -> Fut,
      Fut: Future<Output = T>,
   {
      if let Some(instance) = self.get() {
         return instance;
      }
      self.construct_async().await;
      // SAFETY: `construct_async` only completes once the instance is published.
      unsafe { self.instance_unchecked() }
   }

   /// Fallible form of [`get_instance_async`](Self::get_instance_async).
   #[cfg(feature = "async-tokio")]
   pub async fn try_get_instance_async<Fut, E>(&self) -> Result<&T, Error<E>>
   where
      F: Fn() -> Fut,
      Fut: Future<Output = Result<T, E>>,
   {
      if let Some(instance) = self.get() {
         return Ok(instance);
      }
      self.try_construct_async().await?;
      // SAFETY: `try_construct_async` returned Ok, so the instance is published.
      Ok(unsafe { self.instance_unchecked() })
   }

   /// Returns the instance mutably, constructing it inline if needed.
   ///
   /// Exclusive access rules out any racing caller, so no lock is taken.
   pub fn get_instance_mut(&mut self) -> &mut T
   where
      F: Fn() -> T,
   {
      if !self.state.is_ready_mut() {
         let instance = (self.factory)();
         self.slot.get_mut().write(instance);
         self.state.publish();
      }
      // SAFETY: the instance was either already published or written above.
      unsafe { self.slot.get_mut().assume_init_mut() }
   }

   /// # Safety
   ///
   /// The instance must be published and the caller must have synchronized
   /// with the publication.
   #[inline]
   unsafe fn instance_unchecked(&self) -> &T {
      debug_assert!(self.state.is_ready(), "instance read before publication");
      (*self.slot.get()).assume_init_ref()
   }

   /// Writes the slot and publishes it.
   ///
   /// # Safety
   ///
   /// `guard` must be the construction lock of this holder.
   #[inline]
   unsafe fn fill(&self, guard: ConstructGuard<'_>, instance: T) {
      (*self.slot.get()).write(instance);
      guard.publish();
      crate::trace_event!(
         debug,
         instance = core::any::type_name::<T>(),
         "singleton instance published"
      );
   }

   #[cold]
   fn construct(&self)
   where
      F: Fn() -> T,
   {
      let Some(guard) = self.state.lock() else {
         return; // published while we waited for the lock
      };
      crate::trace_event!(debug, instance = core::any::type_name::<T>(), "constructing singleton instance");
      let instance = (self.factory)();
      // SAFETY: we hold the lock, so nobody else reads or writes the slot.
      unsafe { self.fill(guard, instance) };
   }

   #[cold]
   fn try_construct<E>(&self) -> Result<(), Error<E>>
   where
      F: Fn() -> Result<T, E>,
   {
      let Some(guard) = self.state.lock() else {
         return Ok(());
      };
      crate::trace_event!(debug, instance = core::any::type_name::<T>(), "constructing singleton instance");
      // On error the guard drops here and the holder rolls back to empty.
      let instance = (self.factory)().map_err(Error::ConstructionFailure)?;
      // SAFETY: we hold the lock, so nobody else reads or writes the slot.
      unsafe { self.fill(guard, instance) };
      Ok(())
   }

   #[cfg(feature = "async-tokio")]
   #[cold]
   async fn construct_async<Fut>(&self)
   where
      F: Fn() -> Fut,
      Fut: Future<Output = T>,
   {
      let Some(guard) = self.state.lock_async().await else {
         return;
      };
      crate::trace_event!(debug, instance = core::any::type_name::<T>(), "constructing singleton instance");
      let instance = (self.factory)().await;
      // SAFETY: we hold the lock, so nobody else reads or writes the slot.
      unsafe { self.fill(guard, instance) };
   }

   #[cfg(feature = "async-tokio")]
   #[cold]
   async fn try_construct_async<Fut, E>(&self) -> Result<(), Error<E>>
   where
      F: Fn() -> Fut,
      Fut: Future<Output = Result<T, E>>,
   {
      let Some(guard) = self.state.lock_async().await else {
         return Ok(());
      };
      crate::trace_event!(debug, instance = core::any::type_name::<T>(), "constructing singleton instance");
      let instance = (self.factory)().await.map_err(Error::ConstructionFailure)?;
      // SAFETY: we hold the lock, so nobody else reads or writes the slot.
      unsafe { self.fill(guard, instance) };
      Ok(())
   }
}

// SAFETY: shared access hands out `&T` to many threads (`T: Sync`) and the
// instance may be built on one thread and dropped on another (`T: Send`).
// The factory is only ever called by the lock holder, one caller at a time,
// the same way a `Mutex<F>` would hand it out, so `F: Send` is enough.
unsafe impl<T: Send + Sync, F: Send> Sync for LazySingletonHolder<T, F> {}

impl<T, F: Fn() -> T> Deref for LazySingletonHolder<T, F> {
   type Target = T;

   #[inline]
   fn deref(&self) -> &T {
      self.get_instance()
   }
}

impl<T: Default> Default for LazySingletonHolder<T> {
   /// An empty holder whose factory is `T::default`.
   fn default() -> Self {
      Self::new(T::default)
   }
}

impl<T: fmt::Debug, F> fmt::Debug for LazySingletonHolder<T, F> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut d = f.debug_tuple("LazySingletonHolder");
      match self.get() {
         Some(instance) => d.field(instance),
         None => d.field(&format_args!("<empty>")),
      };
      d.finish()
   }
}

impl<T, F> Drop for LazySingletonHolder<T, F> {
   fn drop(&mut self) {
      if self.state.is_ready_mut() {
         // SAFETY: READY is set, we have exclusive access, and the slot is
         // never read again.
         unsafe { self.slot.get_mut().assume_init_drop() };
      }
   }
}
