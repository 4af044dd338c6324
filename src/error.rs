//! Error types shared by every lifecycle operation.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Error type returned by singleton constructors and initialization bodies.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Shared cause attached to failures that are fanned out to several callers.
pub type SharedCause = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by instance holders, lifecycle states and the orchestrator.
///
/// Every variant names the singleton type it concerns. The error is `Clone` so
/// one outcome can be delivered to all callers folded into the same attempt.
#[derive(Debug, Clone, Error)]
pub enum SingletonError {
   /// The singleton was accessed before any initialization attempt.
   #[error("singleton `{type_name}` is not initialized")]
   NotInitialized { type_name: &'static str },

   /// The process is shutting down, or the holder was torn down.
   #[error("singleton `{type_name}` was destroyed")]
   Destroyed { type_name: &'static str },

   /// The initialization body did not finish within the configured duration.
   #[error("initialization of `{type_name}` timed out after {timeout:?}")]
   InitializationTimeout {
      type_name: &'static str,
      timeout: Duration,
   },

   /// The initialization body returned an error or panicked.
   #[error("initialization of `{type_name}` failed: {source}")]
   InitializationFailed {
      type_name: &'static str,
      #[source]
      source: SharedCause,
   },

   /// The constructor of the instance failed.
   #[error("construction of `{type_name}` failed: {source}")]
   ConstructionFailed {
      type_name: &'static str,
      #[source]
      source: SharedCause,
   },

   /// The caller's own cancellation fired while waiting for readiness.
   #[error("waiting for `{type_name}` was cancelled")]
   WaitCancelled { type_name: &'static str },
}

impl SingletonError {
   /// Builds an `InitializationFailed` error from a boxed cause.
   pub fn initialization_failed(type_name: &'static str, cause: impl Into<BoxError>) -> Self {
      let cause: BoxError = cause.into();
      Self::InitializationFailed {
         type_name,
         source: Arc::from(cause),
      }
   }

   /// Returns the name of the singleton type this error concerns.
   pub fn type_name(&self) -> &'static str {
      match self {
         Self::NotInitialized { type_name }
         | Self::Destroyed { type_name }
         | Self::InitializationTimeout { type_name, .. }
         | Self::InitializationFailed { type_name, .. }
         | Self::ConstructionFailed { type_name, .. }
         | Self::WaitCancelled { type_name } => type_name,
      }
   }

   pub fn is_destroyed(&self) -> bool {
      matches!(self, Self::Destroyed { .. })
   }

   pub fn is_timeout(&self) -> bool {
      matches!(self, Self::InitializationTimeout { .. })
   }
}
