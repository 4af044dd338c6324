//! Process-wide shutdown signal.
//!
//! A [`ShutdownSignal`] is a one-shot flag paired with a root
//! [`CancellationToken`]. Every lifecycle attempt derives a child token from
//! it, so firing the signal cancels all outstanding initialization and
//! readiness waits without anyone tracking them individually.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

static GLOBAL: ShutdownSignal = ShutdownSignal::new();

/// One-shot, monotonic termination signal.
#[derive(Debug)]
pub struct ShutdownSignal {
   triggered: AtomicBool,
   token: OnceLock<CancellationToken>,
}

impl ShutdownSignal {
   /// Creates a signal that has not fired.
   #[inline]
   #[must_use]
   pub const fn new() -> Self {
      Self {
         triggered: AtomicBool::new(false),
         token: OnceLock::new(),
      }
   }

   /// The signal shared by every slot that was not given its own.
   #[inline]
   pub fn global() -> &'static Self {
      &GLOBAL
   }

   /// Fires the signal. Returns `true` only for the call that actually fired it.
   pub fn trigger(&self) -> bool {
      if self.triggered.swap(true, Ordering::AcqRel) {
         return false;
      }
      tracing::info!("shutdown signal triggered, cancelling outstanding singleton work");
      self.token().cancel();
      true
   }

   /// Checks whether the signal has fired. Never blocks.
   #[inline]
   pub fn is_triggered(&self) -> bool {
      self.triggered.load(Ordering::Acquire)
   }

   /// Root cancellation token; cancelled exactly when the signal fires.
   #[inline]
   pub fn token(&self) -> &CancellationToken {
      self.token.get_or_init(CancellationToken::new)
   }

   /// A fresh token that is cancelled when the signal fires, and may also be
   /// cancelled on its own without affecting the signal.
   #[inline]
   pub fn child_token(&self) -> CancellationToken {
      self.token().child_token()
   }

   /// Resolves once the signal has fired.
   pub async fn triggered(&self) {
      self.token().cancelled().await;
   }

   /// Spawns a task that fires the signal on SIGINT or SIGTERM (Ctrl+C elsewhere).
   ///
   /// Must be called from within a Tokio runtime.
   ///
   /// # Errors
   ///
   /// Returns an [`std::io::Error`] if the OS handlers cannot be registered.
   #[cfg(feature = "os-signals")]
   pub fn listen_for_os_signals(&'static self) -> std::io::Result<tokio::task::JoinHandle<()>> {
      #[cfg(unix)]
      {
         use tokio::signal::unix::{signal, SignalKind};

         let mut sigterm = signal(SignalKind::terminate())?;
         let mut sigint = signal(SignalKind::interrupt())?;
         Ok(tokio::spawn(async move {
            tokio::select! {
               _ = sigterm.recv() => tracing::info!("received SIGTERM"),
               _ = sigint.recv() => tracing::info!("received SIGINT"),
               _ = self.triggered() => return,
            }
            self.trigger();
         }))
      }

      #[cfg(not(unix))]
      {
         Ok(tokio::spawn(async move {
            tokio::select! {
               res = tokio::signal::ctrl_c() => {
                  if let Err(error) = res {
                     tracing::warn!(%error, "failed to listen for Ctrl+C");
                     return;
                  }
               }
               _ = self.triggered() => return,
            }
            self.trigger();
         }))
      }
   }
}

impl Default for ShutdownSignal {
   #[inline]
   fn default() -> Self {
      Self::new()
   }
}
