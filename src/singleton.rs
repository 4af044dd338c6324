//! The singleton capability contract.
//!
//! A singleton type implements [`Singleton`] and owns one
//! [`SingletonSlot`] in a `static`. The slot pairs the type's
//! [`InstanceHolder`] with its [`LifecycleState`]; everything else is provided
//! by the trait.
//!
//! ```rust
//! use std::future::Future;
//! use poly_singleton::{BoxError, Singleton, SingletonSlot};
//!
//! struct Settings {
//!    name: String,
//! }
//!
//! static SETTINGS: SingletonSlot<Settings> = SingletonSlot::new();
//!
//! impl Singleton for Settings {
//!    fn slot() -> &'static SingletonSlot<Self> {
//!       &SETTINGS
//!    }
//!
//!    fn create() -> Result<Self, BoxError> {
//!       Ok(Settings { name: "default".into() })
//!    }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let settings = Settings::instance().unwrap();
//! assert_eq!(settings.name, "default");
//! assert!(!settings.is_ready());
//!
//! Settings::initialize().await.unwrap();
//! assert!(settings.is_ready());
//! # }
//! ```

use core::any::type_name;
use core::fmt;
use core::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::SingletonConfig;
use crate::error::{BoxError, SingletonError};
use crate::holder::InstanceHolder;
use crate::lifecycle::{LifecycleState, Status};
use crate::signal::ShutdownSignal;

/// Static registration slot for one singleton type.
pub struct SingletonSlot<T> {
   holder: InstanceHolder<T>,
   lifecycle: LifecycleState,
}

impl<T> SingletonSlot<T> {
   /// Creates an empty slot bound to [`ShutdownSignal::global`].
   #[inline]
   #[must_use]
   pub const fn new() -> Self {
      Self {
         holder: InstanceHolder::new(),
         lifecycle: LifecycleState::new(),
      }
   }

   /// Creates an empty slot bound to its own shutdown signal.
   #[inline]
   #[must_use]
   pub const fn with_signal(signal: &'static ShutdownSignal) -> Self {
      Self {
         holder: InstanceHolder::new(),
         lifecycle: LifecycleState::with_signal(signal),
      }
   }

   #[inline]
   pub fn holder(&self) -> &InstanceHolder<T> {
      &self.holder
   }

   #[inline]
   pub fn lifecycle(&self) -> &LifecycleState {
      &self.lifecycle
   }
}

impl<T> Default for SingletonSlot<T> {
   #[inline]
   fn default() -> Self {
      Self::new()
   }
}

impl<T: fmt::Debug> fmt::Debug for SingletonSlot<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("SingletonSlot")
         .field("holder", &self.holder)
         .field("lifecycle", &self.lifecycle)
         .finish()
   }
}

/// A type with at most one live instance per process.
///
/// Implementors supply the slot, the constructor, optional configuration and
/// the asynchronous initialization body. The provided methods drive the
/// instance through its lifecycle.
pub trait Singleton: Sized + Send + Sync + 'static {
   /// The `static` slot owning this type's instance and lifecycle.
   fn slot() -> &'static SingletonSlot<Self>;

   /// Builds the instance. Runs at most once unless the holder is reset.
   fn create() -> Result<Self, BoxError>;

   /// Declarative configuration consumed by the registry.
   ///
   /// `None` opts out of registry-driven behavior.
   fn config() -> Option<SingletonConfig> {
      None
   }

   /// The asynchronous initialization body. Defaults to immediate success.
   fn on_initialize(&self) -> impl Future<Output = Result<(), BoxError>> + Send {
      async { Ok(()) }
   }

   /// Returns the instance, constructing it on first access.
   ///
   /// # Errors
   ///
   /// [`SingletonError::Destroyed`] once the slot's shutdown signal fired or the
   /// holder was torn down; [`SingletonError::ConstructionFailed`] if
   /// [`create`](Self::create) failed.
   fn instance() -> Result<&'static Self, SingletonError> {
      let slot = Self::slot();
      if slot.lifecycle.signal().is_triggered() {
         return Err(SingletonError::Destroyed {
            type_name: type_name::<Self>(),
         });
      }
      slot.holder.get_or_create(Self::create)
   }

   /// Returns the instance only if it has already been constructed.
   fn try_instance() -> Option<&'static Self> {
      Self::slot().holder.get()
   }

   fn status() -> Status {
      Self::slot().lifecycle.status()
   }

   /// Whether initialization has completed.
   fn is_initialized(&self) -> bool {
      Self::status() == Status::Ready
   }

   /// Current value of the readiness broadcast.
   fn is_ready(&self) -> bool {
      Self::slot().lifecycle.is_ready()
   }

   /// Timeout from [`config`](Self::config), or [`SingletonConfig::DEFAULT_TIMEOUT`].
   fn init_timeout() -> Duration {
      Self::config().map_or(SingletonConfig::DEFAULT_TIMEOUT, |config| config.init_timeout)
   }

   /// Initializes the instance with the configured timeout.
   fn initialize() -> impl Future<Output = Result<(), SingletonError>> + Send {
      Self::initialize_within(Self::init_timeout())
   }

   /// Initializes the instance, bounding the body by `timeout`.
   ///
   /// Concurrent calls share one execution of [`on_initialize`](Self::on_initialize).
   fn initialize_within(timeout: Duration) -> impl Future<Output = Result<(), SingletonError>> + Send {
      async move {
         let instance = Self::instance()?;
         Self::slot()
            .lifecycle
            .initialize(type_name::<Self>(), || instance.on_initialize(), timeout)
            .await
      }
   }

   /// Waits until the instance is ready. Unbounded unless the process shuts down.
   fn ready() -> impl Future<Output = Result<&'static Self, SingletonError>> + Send {
      async {
         Self::slot().lifecycle.wait_for_ready(type_name::<Self>(), None).await?;
         Self::instance()
      }
   }

   /// Waits until the instance is ready or `cancel` fires.
   fn wait_for_ready(
      cancel: &CancellationToken,
   ) -> impl Future<Output = Result<&'static Self, SingletonError>> + Send + '_ {
      async move {
         Self::slot()
            .lifecycle
            .wait_for_ready(type_name::<Self>(), Some(cancel))
            .await?;
         Self::instance()
      }
   }

   /// Returns the instance if it is ready, without waiting.
   ///
   /// # Errors
   ///
   /// [`SingletonError::NotInitialized`] unless the state is `Ready`, the stored
   /// failure if it is `Failed`, [`SingletonError::Destroyed`] after shutdown.
   fn get_ready() -> Result<&'static Self, SingletonError> {
      let lifecycle = &Self::slot().lifecycle;
      if lifecycle.signal().is_triggered() {
         return Err(SingletonError::Destroyed {
            type_name: type_name::<Self>(),
         });
      }
      match lifecycle.status() {
         Status::Ready => Self::instance(),
         Status::Failed => Err(lifecycle.last_error().unwrap_or(SingletonError::NotInitialized {
            type_name: type_name::<Self>(),
         })),
         Status::Uninitialized | Status::Initializing => Err(SingletonError::NotInitialized {
            type_name: type_name::<Self>(),
         }),
      }
   }

   /// Re-arms the lifecycle so the instance can be initialized again.
   ///
   /// # Panics
   ///
   /// Panics if called while initialization is in flight.
   fn cleanup() -> bool {
      Self::slot().lifecycle.reset(type_name::<Self>())
   }
}
