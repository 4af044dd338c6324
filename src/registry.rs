//! Type-keyed registry of singleton configurations.
//!
//! The registry is the explicit replacement for scanning loaded types: every
//! singleton the process wants managed is registered once, and the registry
//! records its [`SingletonConfig`] together with a few monomorphized hooks the
//! orchestrator uses to reach the type's slot. It holds configuration only; the
//! instances stay in their own `static` slots.
//!
//! A registry is built once and is read-only afterwards.

use core::any::{type_name, TypeId};
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::{InitTiming, SingletonConfig};
use crate::error::SingletonError;
use crate::lifecycle::Status;
use crate::singleton::Singleton;

static GLOBAL: OnceLock<SingletonRegistry> = OnceLock::new();

pub(crate) type InitFuture = Pin<Box<dyn Future<Output = Result<(), SingletonError>> + Send>>;

/// Type-erased accessors into one singleton type's slot.
#[derive(Clone, Copy)]
struct Hooks {
   materialize: fn() -> Result<(), SingletonError>,
   initialize: fn(Duration) -> InitFuture,
   is_created: fn() -> bool,
   status: fn() -> Status,
   destroy: fn() -> bool,
}

impl Hooks {
   fn of<T: Singleton>() -> Self {
      Self {
         materialize: || T::instance().map(|_| ()),
         initialize: |timeout| -> InitFuture { Box::pin(T::initialize_within(timeout)) },
         is_created: || T::slot().holder().is_created(),
         status: T::status,
         destroy: || T::slot().holder().destroy(),
      }
   }
}

/// One registered singleton type and its configuration.
#[derive(Clone)]
pub struct RegistryEntry {
   type_id: TypeId,
   type_name: &'static str,
   config: SingletonConfig,
   hooks: Hooks,
}

impl RegistryEntry {
   #[inline]
   pub fn type_id(&self) -> TypeId {
      self.type_id
   }

   #[inline]
   pub fn type_name(&self) -> &'static str {
      self.type_name
   }

   #[inline]
   pub fn config(&self) -> &SingletonConfig {
      &self.config
   }

   /// Whether the type's instance has been constructed.
   pub fn is_created(&self) -> bool {
      (self.hooks.is_created)()
   }

   /// Current lifecycle status of the type.
   pub fn status(&self) -> Status {
      (self.hooks.status)()
   }

   /// Constructs the type's instance if needed.
   pub fn materialize(&self) -> Result<(), SingletonError> {
      (self.hooks.materialize)()
   }

   /// Initializes the type with its configured timeout.
   pub fn initialize(&self) -> impl Future<Output = Result<(), SingletonError>> + Send + 'static {
      (self.hooks.initialize)(self.config.init_timeout)
   }

   /// Destroys the type's instance holder.
   pub fn destroy(&self) -> bool {
      (self.hooks.destroy)()
   }
}

impl fmt::Debug for RegistryEntry {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("RegistryEntry")
         .field("type_name", &self.type_name)
         .field("config", &self.config)
         .finish_non_exhaustive()
   }
}

/// Builder collecting registrations before the registry is frozen.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
   entries: Vec<RegistryEntry>,
}

impl RegistryBuilder {
   #[must_use]
   pub fn new() -> Self {
      Self::default()
   }

   /// Records `T` with its declared configuration.
   ///
   /// Types without configuration are skipped. A second registration of the same
   /// type is ignored.
   #[must_use]
   pub fn register<T: Singleton>(mut self) -> Self {
      let type_name = type_name::<T>();
      let Some(config) = T::config() else {
         tracing::debug!(singleton = type_name, "no singleton config, leaving type to manual use");
         return self;
      };
      let type_id = TypeId::of::<T>();
      if self.entries.iter().any(|entry| entry.type_id == type_id) {
         tracing::warn!(singleton = type_name, "singleton registered twice, keeping the first config");
         return self;
      }
      tracing::debug!(singleton = type_name, ?config, "registered singleton");
      self.entries.push(RegistryEntry {
         type_id,
         type_name,
         config,
         hooks: Hooks::of::<T>(),
      });
      self
   }

   /// Freezes the registry, constructing every [`InitTiming::Immediate`] instance.
   ///
   /// Construction failures are logged; the type stays registered and its
   /// holder keeps reporting the failure.
   pub fn build(self) -> SingletonRegistry {
      for entry in &self.entries {
         if entry.config.init_timing != InitTiming::Immediate {
            continue;
         }
         if let Err(error) = entry.materialize() {
            tracing::error!(singleton = entry.type_name, %error, "failed to construct immediate singleton");
         }
      }
      SingletonRegistry {
         entries: self.entries,
      }
   }
}

/// Write-once, read-many mapping from singleton type to configuration.
#[derive(Debug)]
pub struct SingletonRegistry {
   entries: Vec<RegistryEntry>,
}

impl SingletonRegistry {
   #[must_use]
   pub fn builder() -> RegistryBuilder {
      RegistryBuilder::new()
   }

   /// Every registered type and its configuration. Order is registration order.
   pub fn all_configured(&self) -> impl Iterator<Item = &RegistryEntry> + '_ {
      self.entries.iter()
   }

   pub fn entry(&self, type_id: TypeId) -> Option<&RegistryEntry> {
      self.entries.iter().find(|entry| entry.type_id == type_id)
   }

   pub fn get<T: Singleton>(&self) -> Option<&RegistryEntry> {
      self.entry(TypeId::of::<T>())
   }

   pub fn contains<T: Singleton>(&self) -> bool {
      self.get::<T>().is_some()
   }

   #[inline]
   pub fn len(&self) -> usize {
      self.entries.len()
   }

   #[inline]
   pub fn is_empty(&self) -> bool {
      self.entries.is_empty()
   }

   /// Destroys the instance holder of every registered type.
   pub fn teardown(&self) {
      for entry in &self.entries {
         entry.destroy();
      }
   }

   /// Publishes this registry as the process-wide one.
   ///
   /// Returns `Err(self)` if a registry was already installed.
   pub fn install(self) -> Result<&'static Self, Self> {
      GLOBAL.set(self)?;
      match GLOBAL.get() {
         Some(installed) => Ok(installed),
         None => unreachable!("global registry missing right after install"),
      }
   }

   /// The process-wide registry, if one was installed.
   #[inline]
   pub fn global() -> Option<&'static Self> {
      GLOBAL.get()
   }

   /// The process-wide registry, building it with `f` on first use.
   pub fn global_or_init(f: impl FnOnce() -> Self) -> &'static Self {
      GLOBAL.get_or_init(f)
   }
}

/// Builds a [`SingletonRegistry`] from a list of singleton types.
///
/// ```rust,ignore
/// let registry = singleton_registry![Database, Cache, Telemetry];
/// ```
#[macro_export]
macro_rules! singleton_registry {
   ($($ty:ty),* $(,)?) => {
      $crate::SingletonRegistry::builder()
         $(.register::<$ty>())*
         .build()
   };
}
