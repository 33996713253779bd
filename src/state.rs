//! Holder-scoped lock and publication flag.
//!
//! Everything a [`LazySingletonHolder`](crate::LazySingletonHolder) needs to
//! synchronize lives in one `AtomicU8`:
//! - Bit 0: READY - the instance has been published
//! - Bit 1: CONSTRUCTING - a caller holds the lock and is running the factory
//! - Bit 2: CONTENDED - someone is waiting for the constructor to finish
//! - Bits 3-7: generation, bumped on every publish or rollback
//!
//! Readers only ever need an `Acquire` load of this byte. Threads that lose
//! the race for the lock park on the byte's address through
//! `parking_lot_core`; async callers wait on a `tokio::sync::Notify` instead,
//! so they never block a runtime worker.

use core::mem;
use core::sync::atomic::{AtomicU8, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

const READY: u8 = 0b001;
const CONSTRUCTING: u8 = 0b010;
const CONTENDED: u8 = 0b100;
const GENERATION_STEP: u8 = 0b1000;
const FLAGS: u8 = READY | CONSTRUCTING | CONTENDED;

/// The generation bits of `state`, advanced by one step.
///
/// A parked caller validates against the exact byte it saw, so a rollback
/// followed by a new lock never looks like "nothing changed".
#[inline(always)]
const fn bump_generation(state: u8) -> u8 {
   (state & !FLAGS).wrapping_add(GENERATION_STEP) & !FLAGS
}

/// Outcome of a single try at the lock.
enum Attempt<'a> {
   Ready,
   Acquired(ConstructGuard<'a>),
   /// Someone else is constructing; carries the byte to wait on.
   Busy(u8),
}

pub(crate) struct HolderState {
   bits: AtomicU8,
   #[cfg(feature = "async-tokio")]
   published: tokio::sync::Notify,
}

impl HolderState {
   #[inline]
   pub(crate) const fn new() -> Self {
      Self {
         bits: AtomicU8::new(0),
         #[cfg(feature = "async-tokio")]
         published: tokio::sync::Notify::const_new(),
      }
   }

   /// Fast-path check. `Acquire` pairs with the `Release` in
   /// [`leave`](Self::leave), so a `true` result makes every write the factory
   /// performed visible.
   #[inline]
   pub(crate) fn is_ready(&self) -> bool {
      self.bits.load(Ordering::Acquire) & READY != 0
   }

   #[inline]
   pub(crate) fn is_ready_mut(&mut self) -> bool {
      *self.bits.get_mut() & READY != 0
   }

   /// Marks the instance as published.
   pub(crate) fn publish(&self) {
      self.leave(READY);
   }

   /// Ends a construction: stores `outcome` (READY or nothing) under a new
   /// generation and wakes everyone who registered interest.
   fn leave(&self, outcome: u8) {
      let next = outcome | bump_generation(self.bits.load(Ordering::Relaxed));
      let prev = self.bits.swap(next, Ordering::Release);
      if prev & CONTENDED == 0 {
         return;
      }

      // SAFETY: the key is the address of `bits`, the same one `park_thread`
      // uses, and nothing else parks on it.
      unsafe {
         parking_lot_core::unpark_all(self.bits.as_ptr() as usize, DEFAULT_UNPARK_TOKEN);
      }
      #[cfg(feature = "async-tokio")]
      self.published.notify_waiters();
   }

   fn park_thread(&self, seen: u8) {
      // SAFETY: see `leave`. The validation runs under the parking lot's
      // bucket lock, so a `leave` between our CAS and the sleep is not lost.
      unsafe {
         let _ = parking_lot_core::park(
            self.bits.as_ptr() as usize,
            || self.bits.load(Ordering::Acquire) == seen,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
         );
      }
   }

   /// One try at the lock. This is also the second check: the CAS only
   /// succeeds from a state without READY, and every retry reloads with
   /// `Acquire`.
   fn attempt(&self) -> Attempt<'_> {
      let mut seen = self.bits.load(Ordering::Acquire);
      loop {
         let (next, acquires) = match seen {
            s if s & READY != 0 => return Attempt::Ready,
            s if s & CONSTRUCTING == 0 => (s | CONSTRUCTING, true),
            s if s & CONTENDED != 0 => return Attempt::Busy(s),
            s => (s | CONTENDED, false),
         };
         match self
            .bits
            .compare_exchange_weak(seen, next, Ordering::Acquire, Ordering::Acquire)
         {
            Ok(_) if acquires => return Attempt::Acquired(ConstructGuard { state: self }),
            Ok(_) => return Attempt::Busy(next),
            Err(actual) => seen = actual,
         }
      }
   }

   /// Blocks the thread until either the instance is published (`None`) or
   /// the caller owns the lock (`Some`).
   pub(crate) fn lock(&self) -> Option<ConstructGuard<'_>> {
      loop {
         match self.attempt() {
            Attempt::Ready => return None,
            Attempt::Acquired(guard) => return Some(guard),
            Attempt::Busy(seen) => {
               crate::trace_event!(trace, "parking behind in-flight construction");
               self.park_thread(seen);
            }
         }
      }
   }

   /// Async counterpart of [`lock`](Self::lock). Waits on the notifier
   /// instead of parking, so the constructor can run on the same task or the
   /// same worker.
   #[cfg(feature = "async-tokio")]
   pub(crate) async fn lock_async(&self) -> Option<ConstructGuard<'_>> {
      loop {
         // Register before looking at the state: `notify_waiters` only wakes
         // futures that already exist.
         let mut notified = core::pin::pin!(self.published.notified());
         notified.as_mut().enable();

         match self.attempt() {
            Attempt::Ready => return None,
            Attempt::Acquired(guard) => return Some(guard),
            Attempt::Busy(_) => {
               crate::trace_event!(trace, "awaiting in-flight construction");
            }
         }
         notified.await;
      }
   }
}

/// Proof that the caller holds the construction lock.
///
/// Dropping it without [`publish`](ConstructGuard::publish) rolls the holder back
/// to Empty, which is how factory errors, panics and cancelled futures leave
/// the holder retryable.
pub(crate) struct ConstructGuard<'a> {
   state: &'a HolderState,
}

impl ConstructGuard<'_> {
   /// Publishes the instance. The caller must have written the slot already.
   #[inline]
   pub(crate) fn publish(self) {
      self.state.publish();
      mem::forget(self);
   }
}

impl Drop for ConstructGuard<'_> {
   fn drop(&mut self) {
      crate::trace_event!(warn, "construction abandoned, holder reverted to empty");
      self.state.leave(0);
   }
}
