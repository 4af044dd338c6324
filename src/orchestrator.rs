//! Startup auto-initialization and shutdown hooks.
//!
//! [`AutoInitOrchestrator`] walks a [`SingletonRegistry`] once at startup and
//! initializes every type flagged `auto_init_on_startup`, each on its own task
//! so one type's failure never blocks or aborts another. Types are marked as
//! started before their task is spawned, which makes re-entrant startup hooks
//! harmless.

use core::any::TypeId;
use std::collections::BTreeSet;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::SingletonError;
use crate::registry::SingletonRegistry;
use crate::signal::ShutdownSignal;

static GLOBAL: AutoInitOrchestrator = AutoInitOrchestrator::new();

/// Drives registry-configured singletons through initialization at startup.
#[derive(Debug)]
pub struct AutoInitOrchestrator {
   started: Mutex<BTreeSet<TypeId>>,
}

impl AutoInitOrchestrator {
   #[inline]
   #[must_use]
   pub const fn new() -> Self {
      Self {
         started: parking_lot::const_mutex(BTreeSet::new()),
      }
   }

   /// The orchestrator used by [`startup`].
   #[inline]
   pub fn global() -> &'static Self {
      &GLOBAL
   }

   /// Whether the type has already been started by this orchestrator.
   pub fn is_started(&self, type_id: TypeId) -> bool {
      self.started.lock().contains(&type_id)
   }

   /// Spawns initialization for every auto-init type not started yet.
   ///
   /// Must be called from within a Tokio runtime. Dropping the returned handle
   /// detaches the spawned work; it keeps running to completion.
   pub fn start(&self, registry: &SingletonRegistry) -> StartupHandle {
      let mut tasks = Vec::new();
      for entry in registry.all_configured() {
         if !entry.config().auto_init_on_startup {
            continue;
         }
         if !self.started.lock().insert(entry.type_id()) {
            tracing::debug!(singleton = entry.type_name(), "singleton already started, skipping");
            continue;
         }

         let type_name = entry.type_name();
         let init = entry.initialize();
         tracing::debug!(singleton = type_name, "auto-initializing singleton");
         let task = tokio::spawn(async move {
            let result = init.await;
            if let Err(error) = &result {
               tracing::error!(singleton = type_name, %error, "failed to initialize singleton");
            }
            InitOutcome { type_name, result }
         });
         tasks.push((type_name, task));
      }
      StartupHandle { tasks }
   }

   /// Starts every auto-init type and waits until each one is `Ready` or `Failed`.
   pub async fn run(&self, registry: &SingletonRegistry) -> StartupReport {
      self.start(registry).join().await
   }
}

impl Default for AutoInitOrchestrator {
   #[inline]
   fn default() -> Self {
      Self::new()
   }
}

/// Outstanding auto-init tasks spawned by [`AutoInitOrchestrator::start`].
#[derive(Debug)]
pub struct StartupHandle {
   tasks: Vec<(&'static str, JoinHandle<InitOutcome>)>,
}

impl StartupHandle {
   /// Number of types still being initialized.
   pub fn pending(&self) -> usize {
      self.tasks.iter().filter(|(_, task)| !task.is_finished()).count()
   }

   /// Waits for every spawned initialization to settle.
   ///
   /// A task that panicked or was aborted is reported as
   /// [`SingletonError::InitializationFailed`] for its type.
   pub async fn join(self) -> StartupReport {
      let mut outcomes = Vec::with_capacity(self.tasks.len());
      for (type_name, task) in self.tasks {
         let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
               tracing::error!(singleton = type_name, error = %join_error, "auto-init task aborted");
               InitOutcome {
                  type_name,
                  result: Err(SingletonError::initialization_failed(type_name, join_error)),
               }
            }
         };
         outcomes.push(outcome);
      }
      StartupReport { outcomes }
   }
}

/// Result of initializing one type at startup.
#[derive(Debug, Clone)]
pub struct InitOutcome {
   pub type_name: &'static str,
   pub result: Result<(), SingletonError>,
}

/// Per-type results of a startup sweep, in registration order.
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
   outcomes: Vec<InitOutcome>,
}

impl StartupReport {
   pub fn outcomes(&self) -> &[InitOutcome] {
      &self.outcomes
   }

   pub fn succeeded(&self) -> impl Iterator<Item = &'static str> + '_ {
      self.outcomes.iter().filter(|o| o.result.is_ok()).map(|o| o.type_name)
   }

   pub fn failed(&self) -> impl Iterator<Item = (&'static str, &SingletonError)> + '_ {
      self
         .outcomes
         .iter()
         .filter_map(|o| o.result.as_ref().err().map(|error| (o.type_name, error)))
   }

   pub fn is_success(&self) -> bool {
      self.outcomes.iter().all(|o| o.result.is_ok())
   }

   #[inline]
   pub fn len(&self) -> usize {
      self.outcomes.len()
   }

   #[inline]
   pub fn is_empty(&self) -> bool {
      self.outcomes.is_empty()
   }
}

/// Startup hook: runs the global orchestrator over `registry`.
pub async fn startup(registry: &SingletonRegistry) -> StartupReport {
   let report = AutoInitOrchestrator::global().run(registry).await;
   tracing::info!(
      initialized = report.succeeded().count(),
      failed = report.failed().count(),
      "singleton startup complete"
   );
   report
}

/// Termination hook: fires the global shutdown signal and tears down the
/// globally installed registry, if any.
///
/// Returns `true` if this call fired the signal.
pub fn shutdown() -> bool {
   let fired = ShutdownSignal::global().trigger();
   if let Some(registry) = SingletonRegistry::global() {
      registry.teardown();
   }
   fired
}
