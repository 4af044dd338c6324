//! Asynchronous initialization state machine.
//!
//! A [`LifecycleState`] tracks whether a singleton is `Uninitialized`,
//! `Initializing`, `Ready` or `Failed`. The current phase lives in a
//! [`watch`] cell that doubles as the readiness broadcast: a transition and its
//! publication are the same write, so no waiter can observe "ready" before the
//! state is.
//!
//! Each attempt runs on a spawned task and races the initialization body
//! against a per-type timeout and a child of the [`ShutdownSignal`] token.
//! Callers that arrive while an attempt is in flight are folded into it.

use core::any::Any;
use core::fmt;
use core::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, SingletonError};
use crate::signal::ShutdownSignal;

/// Observable lifecycle status of a singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
   Uninitialized,
   Initializing,
   Ready,
   Failed,
}

impl Status {
   /// `Ready` or `Failed`.
   #[inline]
   pub fn is_settled(self) -> bool {
      matches!(self, Self::Ready | Self::Failed)
   }
}

#[derive(Debug, Clone)]
enum Phase {
   Uninitialized,
   Initializing,
   Ready,
   Failed(SingletonError),
}

impl Phase {
   fn status(&self) -> Status {
      match self {
         Self::Uninitialized => Status::Uninitialized,
         Self::Initializing => Status::Initializing,
         Self::Ready => Status::Ready,
         Self::Failed(_) => Status::Failed,
      }
   }

   fn is_settled(&self) -> bool {
      self.status().is_settled()
   }

   fn outcome(&self, type_name: &'static str) -> Result<(), SingletonError> {
      match self {
         Self::Ready => Ok(()),
         Self::Failed(error) => Err(error.clone()),
         Self::Uninitialized | Self::Initializing => Err(SingletonError::NotInitialized { type_name }),
      }
   }
}

/// Per-type initialization state machine with timeout and shutdown cancellation.
///
/// At most one initialization attempt is in flight at a time. `Failed` is
/// sticky until [`reset`](Self::reset).
pub struct LifecycleState {
   signal: Option<&'static ShutdownSignal>,
   phase: OnceLock<Arc<watch::Sender<Phase>>>,
   attempt: Mutex<Option<CancellationToken>>,
}

impl LifecycleState {
   /// Creates an uninitialized state bound to [`ShutdownSignal::global`].
   #[inline]
   #[must_use]
   pub const fn new() -> Self {
      Self {
         signal: None,
         phase: OnceLock::new(),
         attempt: parking_lot::const_mutex(None),
      }
   }

   /// Creates an uninitialized state bound to `signal` instead of the global one.
   #[inline]
   #[must_use]
   pub const fn with_signal(signal: &'static ShutdownSignal) -> Self {
      Self {
         signal: Some(signal),
         phase: OnceLock::new(),
         attempt: parking_lot::const_mutex(None),
      }
   }

   /// The shutdown signal this state's cancellation derives from.
   #[inline]
   pub fn signal(&self) -> &'static ShutdownSignal {
      self.signal.unwrap_or_else(ShutdownSignal::global)
   }

   fn phase(&self) -> &Arc<watch::Sender<Phase>> {
      self.phase.get_or_init(|| Arc::new(watch::channel(Phase::Uninitialized).0))
   }

   #[inline]
   pub fn status(&self) -> Status {
      self.phase().borrow().status()
   }

   /// Current value of the readiness broadcast.
   #[inline]
   pub fn is_ready(&self) -> bool {
      self.status() == Status::Ready
   }

   /// The error of the last attempt, if the state is `Failed`.
   pub fn last_error(&self) -> Option<SingletonError> {
      match &*self.phase().borrow() {
         Phase::Failed(error) => Some(error.clone()),
         _ => None,
      }
   }

   /// Runs the initialization body produced by `op`, at most once per attempt.
   ///
   /// - `Ready`: returns `Ok(())` immediately.
   /// - `Failed`: returns the stored error without running anything.
   /// - `Initializing`: waits for the in-flight attempt and shares its outcome.
   /// - `Uninitialized`: calls `op`, then races the body against `timeout` and
   ///   the shutdown signal on a spawned task.
   ///
   /// Must be called from within a Tokio runtime that outlives the attempt,
   /// normally the process-lifetime runtime. If that runtime shuts down first,
   /// the attempt settles as `Failed`.
   ///
   /// # Errors
   ///
   /// [`SingletonError::InitializationFailed`] with the body's error or panic,
   /// [`SingletonError::InitializationTimeout`] when `timeout` elapsed first, or
   /// [`SingletonError::Destroyed`] when the shutdown signal fired first.
   pub async fn initialize<F, Fut>(
      &self,
      type_name: &'static str,
      op: F,
      timeout: Duration,
   ) -> Result<(), SingletonError>
   where
      F: FnOnce() -> Fut,
      Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
   {
      let phase = self.phase();
      let mut started = false;
      let mut settled = None;
      phase.send_if_modified(|current| match current {
         Phase::Uninitialized => {
            *current = Phase::Initializing;
            started = true;
            true
         }
         Phase::Initializing => false,
         Phase::Ready | Phase::Failed(_) => {
            settled = Some(current.outcome(type_name));
            false
         }
      });
      if let Some(outcome) = settled {
         return outcome;
      }

      let mut rx = phase.subscribe();
      if started {
         let token = self.signal().child_token();
         if let Some(stale) = self.attempt.lock().replace(token.clone()) {
            stale.cancel();
         }
         let publish = Publish {
            phase: Arc::clone(phase),
            type_name,
            settled: false,
         };
         match panic::catch_unwind(AssertUnwindSafe(op)) {
            Ok(work) => {
               tracing::debug!(singleton = type_name, ?timeout, "starting singleton initialization");
               tokio::spawn(drive(publish, work, timeout, token));
            }
            Err(payload) => {
               let error = SingletonError::initialization_failed(
                  type_name,
                  format!("initialization panicked: {}", panic_message(&*payload)),
               );
               tracing::warn!(singleton = type_name, %error, "singleton initialization failed");
               publish.settle(Err(error));
            }
         }
      }
      settle(type_name, &mut rx).await
   }

   /// Suspends until the state is `Ready` or `Failed`, or `cancel` fires.
   ///
   /// Without a cancellation token the wait is unbounded: triggering
   /// initialization is the caller's responsibility.
   ///
   /// # Errors
   ///
   /// [`SingletonError::Destroyed`] immediately if the shutdown signal already
   /// fired (or as soon as it fires), [`SingletonError::WaitCancelled`] when
   /// `cancel` fires, or the failure stored in the state.
   pub async fn wait_for_ready(
      &self,
      type_name: &'static str,
      cancel: Option<&CancellationToken>,
   ) -> Result<(), SingletonError> {
      let signal = self.signal();
      if signal.is_triggered() {
         return Err(SingletonError::Destroyed { type_name });
      }
      let mut rx = self.phase().subscribe();
      let caller_cancelled = async {
         match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
         }
      };
      tokio::select! {
         biased;
         _ = signal.triggered() => Err(SingletonError::Destroyed { type_name }),
         outcome = settle(type_name, &mut rx) => outcome,
         _ = caller_cancelled => Err(SingletonError::WaitCancelled { type_name }),
      }
   }

   /// Re-arms a `Ready` or `Failed` state back to `Uninitialized`.
   ///
   /// Clears the readiness broadcast and cancels the previous attempt's token so
   /// that nothing stale can affect the next attempt. Returns `true` if the state
   /// changed.
   ///
   /// # Panics
   ///
   /// Panics if an initialization attempt is in flight.
   pub fn reset(&self, type_name: &'static str) -> bool {
      let mut attempt = self.attempt.lock();
      let mut in_flight = false;
      let changed = self.phase().send_if_modified(|current| match current {
         Phase::Initializing => {
            in_flight = true;
            false
         }
         Phase::Uninitialized => false,
         Phase::Ready | Phase::Failed(_) => {
            *current = Phase::Uninitialized;
            true
         }
      });
      assert!(
         !in_flight,
         "cannot reset singleton `{type_name}` while its initialization is in flight"
      );
      if let Some(token) = attempt.take() {
         token.cancel();
      }
      if changed {
         tracing::debug!(singleton = type_name, "singleton lifecycle reset");
      }
      changed
   }
}

/// Waits for the phase to settle and clones out its outcome.
async fn settle(
   type_name: &'static str,
   rx: &mut watch::Receiver<Phase>,
) -> Result<(), SingletonError> {
   match rx.wait_for(Phase::is_settled).await {
      Ok(phase) => phase.outcome(type_name),
      Err(_) => Err(SingletonError::Destroyed { type_name }),
   }
}

/// Publishes the outcome of one attempt.
///
/// Dropped unsettled (the driving task was dropped with its runtime), it
/// settles the attempt as failed so nothing stays `Initializing`.
struct Publish {
   phase: Arc<watch::Sender<Phase>>,
   type_name: &'static str,
   settled: bool,
}

impl Publish {
   fn settle(mut self, outcome: Result<(), SingletonError>) {
      self.phase.send_replace(match outcome {
         Ok(()) => Phase::Ready,
         Err(error) => Phase::Failed(error),
      });
      self.settled = true;
   }
}

impl Drop for Publish {
   fn drop(&mut self) {
      if self.settled {
         return;
      }
      tracing::warn!(singleton = self.type_name, "singleton initialization dropped before it settled");
      self.phase.send_replace(Phase::Failed(SingletonError::initialization_failed(
         self.type_name,
         "runtime shut down before initialization settled",
      )));
   }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
   if let Some(message) = payload.downcast_ref::<&str>() {
      message
   } else if let Some(message) = payload.downcast_ref::<String>() {
      message
   } else {
      "non-string panic payload"
   }
}

/// Body of the spawned attempt task.
async fn drive<Fut>(publish: Publish, op: Fut, timeout: Duration, token: CancellationToken)
where
   Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
   let type_name = publish.type_name;
   let outcome = race(type_name, op, timeout, &token).await;

   match &outcome {
      Ok(()) => tracing::info!(singleton = type_name, "singleton ready"),
      Err(error) if error.is_destroyed() => {
         tracing::info!(singleton = type_name, "singleton initialization cancelled by shutdown")
      }
      Err(error) => tracing::warn!(singleton = type_name, %error, "singleton initialization failed"),
   }
   publish.settle(outcome);
}

/// Races the body against `timeout` and `token`; shutdown always wins.
async fn race<Fut>(
   type_name: &'static str,
   op: Fut,
   timeout: Duration,
   token: &CancellationToken,
) -> Result<(), SingletonError>
where
   Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
   if token.is_cancelled() {
      return Err(SingletonError::Destroyed { type_name });
   }
   // The body gets its own task so a panic surfaces as a JoinError and a
   // timeout or shutdown can abort it.
   let mut work = tokio::spawn(op);
   tokio::select! {
      biased;
      _ = token.cancelled() => {
         work.abort();
         Err(SingletonError::Destroyed { type_name })
      }
      res = tokio::time::timeout(timeout, &mut work) => match res {
         Ok(Ok(Ok(()))) => Ok(()),
         Ok(Ok(Err(cause))) => Err(SingletonError::initialization_failed(type_name, cause)),
         Ok(Err(join_error)) => Err(SingletonError::initialization_failed(type_name, join_error)),
         Err(_) => {
            work.abort();
            Err(SingletonError::InitializationTimeout { type_name, timeout })
         }
      },
   }
}

impl Default for LifecycleState {
   #[inline]
   fn default() -> Self {
      Self::new()
   }
}

impl fmt::Debug for LifecycleState {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("LifecycleState")
         .field("status", &self.status())
         .finish_non_exhaustive()
   }
}
