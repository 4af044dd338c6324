//! Internal synchronization state for instance holders.
//!
//! This module provides the low-level state word used by `InstanceHolder`. It
//! implements a small state machine using atomic operations and futex-based
//! waiting via `parking_lot_core`.
//!
//! The state is packed into a single `AtomicU8` with the following layout:
//! - Bit 0: DONE - Instance is constructed
//! - Bit 1: LOCKED - Construction is in progress
//! - Bit 2: WAITING - At least one thread is parked on the word
//! - Bit 3: FAILED - Construction failed, the cause is stored next to the value
//! - Bit 4: DESTROYED - Holder was torn down; sticky for the life of the holder
//! - Bits 5-7: EPOCH - Generation counter so parked threads notice every change
//!
//! Construction never suspends: threads that lose the race park on the word
//! until the winner commits, fails, or the holder is destroyed.

use core::mem;
use core::sync::atomic::{AtomicU8, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

/// What a thread observed when it tried to take the construction lock.
pub(crate) enum Acquire<'a> {
   /// The caller owns construction and must commit or fail the guard.
   Locked(HolderGuard<'a>),
   /// The instance already exists.
   Done,
   /// A previous construction failed.
   Failed,
   /// The holder was destroyed.
   Destroyed,
}

/// Atomic state word for an `InstanceHolder`.
#[repr(transparent)]
pub(crate) struct HolderLock(AtomicU8);

impl HolderLock {
   const DONE: u8 = 1;
   const LOCKED: u8 = 2;
   const WAITING: u8 = 4;
   const FAILED: u8 = 8;
   const DESTROYED: u8 = 16;
   const EPOCH_1: u8 = 32;
   const EPOCH_MASK: u8 = !(Self::DONE | Self::LOCKED | Self::WAITING | Self::FAILED | Self::DESTROYED);

   #[inline(always)]
   const fn next_epoch(current_state: u8) -> u8 {
      (current_state & Self::EPOCH_MASK).wrapping_add(Self::EPOCH_1) & Self::EPOCH_MASK
   }

   #[inline]
   pub(crate) const fn new() -> Self {
      Self(AtomicU8::new(0))
   }

   #[inline]
   fn notify_all(&self) {
      // SAFETY: The address passed to unpark must match the address used for park.
      unsafe {
         parking_lot_core::unpark_all(self.0.as_ptr() as usize, DEFAULT_UNPARK_TOKEN);
      }
   }

   /// Parks the current thread until the word differs from `expected_state`.
   #[inline]
   fn wait(&self, expected_state: u8) {
      // SAFETY: See `notify_all`.
      unsafe {
         let _ = parking_lot_core::park(
            self.0.as_ptr() as usize,
            || self.0.load(Ordering::Acquire) == expected_state,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
         );
      }
   }

   /// Applies `f` to the word with a fresh epoch, wakes parked threads and
   /// returns the previous state.
   ///
   /// DESTROYED survives every transition.
   #[inline]
   fn transition(&self, f: impl Fn(u8) -> u8) -> u8 {
      let prev_state = match self.0.fetch_update(Ordering::Release, Ordering::Relaxed, |current| {
         Some(f(current) | Self::next_epoch(current) | (current & Self::DESTROYED))
      }) {
         Ok(prev) | Err(prev) => prev,
      };
      if prev_state & Self::WAITING != 0 {
         self.notify_all();
      }
      prev_state
   }

   /// Marks the instance as constructed. Returns `true` if it was not before.
   #[inline]
   pub(crate) fn set_done(&self) -> bool {
      self.transition(|_| Self::DONE) & Self::DONE == 0
   }

   /// Marks construction as failed.
   #[inline]
   pub(crate) fn set_failed(&self) {
      self.transition(|_| Self::FAILED);
   }

   /// Returns the word to the empty state. DESTROYED is kept.
   /// Returns `true` if the instance was constructed before.
   #[inline]
   pub(crate) fn set_uninit(&self) -> bool {
      self.transition(|_| 0) & Self::DONE != 0
   }

   /// Sets the sticky DESTROYED bit. Returns `true` on the first call.
   #[inline]
   pub(crate) fn set_destroyed(&self) -> bool {
      self.transition(|current| (current & (Self::DONE | Self::LOCKED | Self::FAILED)) | Self::DESTROYED)
         & Self::DESTROYED
         == 0
   }

   #[inline]
   fn has(&self, flag: u8, ordering: Ordering) -> bool {
      self.0.load(ordering) & flag != 0
   }

   #[inline]
   pub(crate) fn is_done(&self, ordering: Ordering) -> bool {
      self.has(Self::DONE, ordering)
   }

   #[inline]
   pub(crate) fn is_failed(&self, ordering: Ordering) -> bool {
      self.has(Self::FAILED, ordering)
   }

   #[inline]
   pub(crate) fn is_destroyed(&self, ordering: Ordering) -> bool {
      self.has(Self::DESTROYED, ordering)
   }

   /// One attempt at taking the construction lock.
   ///
   /// Returns `Err(state)` when another thread is constructing; the returned state has
   /// WAITING set unless `nowait` is true.
   #[inline]
   fn lock_step(&self, nowait: bool) -> Result<Acquire<'_>, u8> {
      loop {
         let current_state = self.0.load(Ordering::Acquire);
         if current_state & Self::DESTROYED != 0 {
            return Ok(Acquire::Destroyed);
         }
         if current_state & Self::DONE != 0 {
            return Ok(Acquire::Done);
         }
         if current_state & Self::FAILED != 0 {
            return Ok(Acquire::Failed);
         }

         if current_state & Self::LOCKED == 0 {
            match self.0.compare_exchange_weak(
               current_state,
               current_state | Self::LOCKED,
               Ordering::Acquire,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Ok(Acquire::Locked(HolderGuard::new(self))),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }

         if !nowait && (current_state & Self::WAITING == 0) {
            let new_state = current_state | Self::WAITING;
            match self.0.compare_exchange_weak(
               current_state,
               new_state,
               Ordering::Relaxed,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Err(new_state),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }
         return Err(current_state);
      }
   }

   /// Takes the construction lock, parking while another thread holds it.
   #[inline]
   pub(crate) fn lock(&self) -> Acquire<'_> {
      let mut state_when_failed = match self.lock_step(false) {
         Ok(acquired) => return acquired,
         Err(state) => state,
      };
      loop {
         self.wait(state_when_failed);
         match self.lock_step(false) {
            Ok(acquired) => return acquired,
            Err(new_state) => state_when_failed = new_state,
         }
      }
   }

   /// Takes the construction lock only if nobody else holds it.
   #[inline]
   pub(crate) fn try_lock(&self) -> Option<HolderGuard<'_>> {
      match self.lock_step(true) {
         Ok(Acquire::Locked(guard)) => Some(guard),
         _ => None,
      }
   }
}

/// RAII guard for an in-progress construction.
///
/// Dropping it without `commit` or `fail` (a panicking constructor) returns the
/// holder to the empty state so the next caller may retry.
pub(crate) struct HolderGuard<'a> {
   state: &'a HolderLock,
}

impl<'a> HolderGuard<'a> {
   #[inline(always)]
   const fn new(state: &'a HolderLock) -> Self {
      Self { state }
   }

   /// Publishes the constructed instance and wakes waiters.
   #[inline(always)]
   pub(crate) fn commit(self) -> bool {
      let success = self.state.set_done();
      mem::forget(self);
      success
   }

   /// Publishes a construction failure and wakes waiters.
   #[inline(always)]
   pub(crate) fn fail(self) {
      self.state.set_failed();
      mem::forget(self);
   }
}

impl Drop for HolderGuard<'_> {
   #[inline(always)]
   fn drop(&mut self) {
      self.state.set_uninit();
   }
}
