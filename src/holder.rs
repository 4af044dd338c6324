//! Lazy, thread-safe holder for the single instance of a type.
//!
//! This module provides [`InstanceHolder<T>`], a cell that constructs its value
//! at most once per process. The fast path (instance already built) is a single
//! atomic load; losers of the first-access race park on a futex until the
//! winner publishes either the instance or its construction failure.
//!
//! Construction is synchronous and never suspends, so holders can be used from
//! plain threads as well as from async tasks.

use core::any::type_name;
use core::cell::UnsafeCell;
use core::sync::atomic::Ordering;
use core::{fmt, mem};
use std::sync::Arc;

use crate::error::{BoxError, SharedCause, SingletonError};
use crate::state::{Acquire, HolderLock};

/// A thread-safe holder producing exactly one instance of `T`.
///
/// - The first caller of [`get_or_create`](Self::get_or_create) runs the
///   constructor; concurrent callers wait and observe the same instance.
/// - A failed construction is sticky: every caller gets the same
///   [`SingletonError::ConstructionFailed`] until [`reset`](Self::reset).
/// - Once [`destroy`](Self::destroy)ed, the holder never hands out or builds an
///   instance again.
pub struct InstanceHolder<T> {
   value: UnsafeCell<mem::MaybeUninit<T>>,
   failure: UnsafeCell<Option<SharedCause>>,
   lock: HolderLock,
}

impl<T> InstanceHolder<T> {
   /// Creates an empty holder.
   #[inline]
   #[must_use]
   pub const fn new() -> Self {
      Self {
         value: UnsafeCell::new(mem::MaybeUninit::uninit()),
         failure: UnsafeCell::new(None),
         lock: HolderLock::new(),
      }
   }

   /// Checks whether the instance has been constructed. Never blocks.
   #[inline]
   pub fn is_created(&self) -> bool {
      self.lock.is_done(Ordering::Relaxed)
   }

   /// Checks whether the last construction attempt failed. Never blocks.
   #[inline]
   pub fn is_failed(&self) -> bool {
      self.lock.is_failed(Ordering::Relaxed)
   }

   /// Checks whether the holder has been destroyed. Never blocks.
   #[inline]
   pub fn is_destroyed(&self) -> bool {
      self.lock.is_destroyed(Ordering::Relaxed)
   }

   /// Returns the instance if it exists and the holder is still alive.
   #[inline]
   pub fn get(&self) -> Option<&T> {
      if self.lock.is_done(Ordering::Acquire) && !self.is_destroyed() {
         // SAFETY: DONE was observed with Acquire, so the write of the value is visible.
         Some(unsafe { self.get_unchecked() })
      } else {
         None
      }
   }

   /// Installs a pre-built instance without blocking.
   ///
   /// Returns `Err(value)` if the holder is already built, failed, destroyed or
   /// currently being constructed by another thread.
   #[inline]
   pub fn try_set(&self, value: T) -> Result<&T, T> {
      let Some(guard) = self.lock.try_lock() else {
         return Err(value);
      };
      // SAFETY: We hold the construction lock.
      let refv = unsafe { (*self.value.get()).write(value) };
      guard.commit();
      Ok(refv)
   }

   /// Returns the instance, constructing it with `f` on first access.
   ///
   /// If several threads call this concurrently, `f` runs once and every caller
   /// observes the same instance or the same failure.
   ///
   /// # Errors
   ///
   /// - [`SingletonError::ConstructionFailed`] if `f` failed, now or on an earlier call.
   /// - [`SingletonError::Destroyed`] if the holder was destroyed.
   #[inline]
   pub fn get_or_create<F, E>(&self, f: F) -> Result<&T, SingletonError>
   where
      F: FnOnce() -> Result<T, E>,
      E: Into<BoxError>,
   {
      if let Some(value) = self.get() {
         return Ok(value);
      }
      self.create(f)
   }

   /// Marks the holder as destroyed and wakes any thread parked on it.
   ///
   /// The instance itself is left in place (outstanding references stay valid)
   /// but is no longer handed out. Returns `true` on the first call.
   pub fn destroy(&self) -> bool {
      let first = self.lock.set_destroyed();
      if first {
         tracing::debug!(singleton = type_name::<T>(), "instance holder destroyed");
      }
      first
   }

   /// Empties the holder, returning the instance if one was built.
   ///
   /// Also clears a stored construction failure so the next access retries.
   /// A destroyed holder stays destroyed. Requires exclusive access and never blocks.
   pub fn reset(&mut self) -> Option<T> {
      self.failure.get_mut().take();
      if self.lock.set_uninit() {
         // SAFETY: DONE was set, and the state no longer allows reads of the old value.
         unsafe { Some((*self.value.get()).assume_init_read()) }
      } else {
         None
      }
   }

   /// Returns a reference to the instance without checking the state.
   ///
   /// # Safety
   ///
   /// The caller must ensure the instance has been constructed.
   #[inline]
   pub unsafe fn get_unchecked(&self) -> &T {
      debug_assert!(self.is_created(), "get_unchecked called on empty InstanceHolder");
      (*self.value.get()).assume_init_ref()
   }

   fn failure_error(&self) -> SingletonError {
      // SAFETY: FAILED was observed with Acquire by the caller; the cause was
      // written under the construction lock before the flag was published.
      let cause = unsafe { (*self.failure.get()).clone() };
      match cause {
         Some(source) => SingletonError::ConstructionFailed {
            type_name: type_name::<T>(),
            source,
         },
         None => SingletonError::NotInitialized {
            type_name: type_name::<T>(),
         },
      }
   }

   /// Cold path for `get_or_create`.
   #[cold]
   fn create<F, E>(&self, f: F) -> Result<&T, SingletonError>
   where
      F: FnOnce() -> Result<T, E>,
      E: Into<BoxError>,
   {
      let guard = match self.lock.lock() {
         Acquire::Locked(guard) => guard,
         // SAFETY: DONE was observed with Acquire inside `lock`.
         Acquire::Done => return Ok(unsafe { self.get_unchecked() }),
         Acquire::Failed => return Err(self.failure_error()),
         Acquire::Destroyed => {
            return Err(SingletonError::Destroyed {
               type_name: type_name::<T>(),
            })
         }
      };

      tracing::debug!(singleton = type_name::<T>(), "constructing singleton instance");
      match f() {
         Ok(value) => {
            // SAFETY: We hold the construction lock.
            let refv = unsafe { (*self.value.get()).write(value) };
            guard.commit();
            if self.is_destroyed() {
               return Err(SingletonError::Destroyed {
                  type_name: type_name::<T>(),
               });
            }
            Ok(refv)
         }
         Err(error) => {
            let error: BoxError = error.into();
            let cause: SharedCause = Arc::from(error);
            tracing::debug!(singleton = type_name::<T>(), error = %cause, "singleton construction failed");
            // SAFETY: We hold the construction lock.
            unsafe { *self.failure.get() = Some(cause.clone()) };
            guard.fail();
            Err(SingletonError::ConstructionFailed {
               type_name: type_name::<T>(),
               source: cause,
            })
         }
      }
   }
}

// SAFETY:
// Shared access hands out `&T` across threads (requires `T: Sync`) and the
// instance may be built on one thread and dropped on another (requires `T: Send`).
unsafe impl<T: Sync + Send> Sync for InstanceHolder<T> {}
// SAFETY: Ownership of `T` moves with the holder.
unsafe impl<T: Send> Send for InstanceHolder<T> {}

impl<T> Default for InstanceHolder<T> {
   #[inline]
   fn default() -> Self {
      Self::new()
   }
}

impl<T: fmt::Debug> fmt::Debug for InstanceHolder<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut d = f.debug_tuple("InstanceHolder");
      match self.get() {
         Some(v) => d.field(v),
         None if self.is_destroyed() => d.field(&format_args!("<destroyed>")),
         None if self.is_failed() => d.field(&format_args!("<failed>")),
         None => d.field(&format_args!("<empty>")),
      };
      d.finish()
   }
}

impl<T> Drop for InstanceHolder<T> {
   #[inline]
   fn drop(&mut self) {
      if self.is_created() {
         // SAFETY: Exclusive access and the instance is constructed.
         unsafe { self.value.get_mut().assume_init_drop() };
      }
   }
}
