//! Process-wide singletons whose construction is decoupled from their readiness.
//!
//! A singleton may exist before it is usable: the instance is built lazily and
//! synchronously, while its asynchronous initialization is tracked separately
//! and can be awaited by any task. The crate provides:
//!
//! - [`InstanceHolder<T>`]: a lock-free-on-read holder constructing `T` exactly once.
//! - [`LifecycleState`]: the `Uninitialized → Initializing → Ready | Failed` state
//!   machine with per-type timeout and shutdown cancellation.
//! - [`ShutdownSignal`]: a one-shot termination flag whose cancellation token is
//!   the parent of every lifecycle attempt.
//! - [`Singleton`]: the capability trait tying a type to its static [`SingletonSlot`].
//! - [`SingletonRegistry`] and [`AutoInitOrchestrator`]: explicit type
//!   registration and eager initialization at startup.
//!
//! # Features
//!
//! - **Exactly-once construction**: concurrent first access parks on a futex and
//!   all callers observe the same instance or the same failure.
//! - **Folded initialization**: concurrent initialization requests share one
//!   execution of the body and one outcome.
//! - **Bounded failure**: timeouts, body errors and shutdown are distinct, typed
//!   errors; nothing is left `Initializing` forever.
//! - **Isolated startup**: one singleton's failure never aborts another's.
//!
//! # Example
//!
//! ```rust
//! use std::future::Future;
//! use std::time::Duration;
//!
//! use poly_singleton::{
//!    singleton_registry, startup, BoxError, Singleton, SingletonConfig, SingletonSlot,
//! };
//!
//! struct Cache;
//!
//! static CACHE: SingletonSlot<Cache> = SingletonSlot::new();
//!
//! impl Singleton for Cache {
//!    fn slot() -> &'static SingletonSlot<Self> {
//!       &CACHE
//!    }
//!
//!    fn create() -> Result<Self, BoxError> {
//!       Ok(Cache)
//!    }
//!
//!    fn config() -> Option<SingletonConfig> {
//!       Some(SingletonConfig::new().with_auto_init(true).with_timeout(Duration::from_secs(1)))
//!    }
//!
//!    fn on_initialize(&self) -> impl Future<Output = Result<(), BoxError>> + Send {
//!       async { Ok(()) }
//!    }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = singleton_registry![Cache];
//! let report = startup(&registry).await;
//! assert!(report.is_success());
//! assert!(Cache::get_ready().is_ok());
//! # }
//! ```

/// Typed lifecycle errors.
mod error;

/// Per-type configuration records.
mod config;

/// Internal synchronization state for instance holders.
mod state;

/// Lazy instance holder.
mod holder;

/// Process-wide shutdown signal.
mod signal;

/// Async initialization state machine.
mod lifecycle;

/// Singleton capability trait and static slots.
mod singleton;

/// Type-keyed configuration registry.
mod registry;

/// Startup orchestration and shutdown hooks.
mod orchestrator;

pub use config::{InitTiming, SingletonConfig};
pub use error::{BoxError, SharedCause, SingletonError};
pub use holder::InstanceHolder;
pub use lifecycle::{LifecycleState, Status};
pub use orchestrator::{shutdown, startup, AutoInitOrchestrator, InitOutcome, StartupHandle, StartupReport};
pub use registry::{RegistryBuilder, RegistryEntry, SingletonRegistry};
pub use signal::ShutdownSignal;
pub use singleton::{Singleton, SingletonSlot};

pub use tokio_util::sync::CancellationToken;
