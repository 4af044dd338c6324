//! Declarative per-type singleton configuration.

use std::time::Duration;

/// When a registered singleton's instance is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InitTiming {
   /// On first access.
   #[default]
   Lazy,
   /// When the registry is built.
   Immediate,
}

/// Static configuration record attached to a singleton type.
///
/// A type that returns `None` from [`Singleton::config`](crate::Singleton::config)
/// opts out of registry-driven behavior and is only ever used manually.
///
/// ```rust
/// use std::time::Duration;
/// use poly_singleton::{InitTiming, SingletonConfig};
///
/// const CONFIG: SingletonConfig = SingletonConfig::new()
///    .with_timing(InitTiming::Immediate)
///    .with_timeout(Duration::from_secs(2))
///    .with_auto_init(true);
///
/// assert!(CONFIG.auto_init_on_startup);
/// assert!(CONFIG.thread_safe);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SingletonConfig {
   /// Whether construction must be synchronized across threads.
   ///
   /// Holders are always synchronized, since they live in `static` items; the
   /// flag is carried for callers that inspect the registry.
   pub thread_safe: bool,
   pub init_timing: InitTiming,
   /// Upper bound on the initialization body.
   pub init_timeout: Duration,
   /// Whether the startup orchestrator initializes the type.
   pub auto_init_on_startup: bool,
}

impl SingletonConfig {
   pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

   /// Thread-safe, lazy, five second timeout, no auto-init.
   #[inline]
   #[must_use]
   pub const fn new() -> Self {
      Self {
         thread_safe: true,
         init_timing: InitTiming::Lazy,
         init_timeout: Self::DEFAULT_TIMEOUT,
         auto_init_on_startup: false,
      }
   }

   #[inline]
   #[must_use]
   pub const fn with_thread_safe(mut self, thread_safe: bool) -> Self {
      self.thread_safe = thread_safe;
      self
   }

   #[inline]
   #[must_use]
   pub const fn with_timing(mut self, timing: InitTiming) -> Self {
      self.init_timing = timing;
      self
   }

   #[inline]
   #[must_use]
   pub const fn with_timeout(mut self, timeout: Duration) -> Self {
      self.init_timeout = timeout;
      self
   }

   #[inline]
   #[must_use]
   pub const fn with_auto_init(mut self, auto_init: bool) -> Self {
      self.auto_init_on_startup = auto_init;
      self
   }
}

impl Default for SingletonConfig {
   #[inline]
   fn default() -> Self {
      Self::new()
   }
}
