use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use poly_singleton::{BoxError, CancellationToken, LifecycleState, ShutdownSignal, SingletonError, Status};

const NAME: &str = "tests::Subject";

async fn until_initializing(state: &LifecycleState) {
   while state.status() != Status::Initializing {
      tokio::task::yield_now().await;
   }
}

fn isolated() -> LifecycleState {
   let signal: &'static ShutdownSignal = Box::leak(Box::new(ShutdownSignal::new()));
   LifecycleState::with_signal(signal)
}

#[tokio::test]
async fn test_initialize_success() {
   let state = isolated();
   assert_eq!(state.status(), Status::Uninitialized);
   assert!(!state.is_ready());

   let res = state
      .initialize(NAME, || async { Ok::<_, BoxError>(()) }, Duration::from_secs(1))
      .await;
   assert!(res.is_ok());
   assert_eq!(state.status(), Status::Ready);
   assert!(state.is_ready());
   assert!(state.last_error().is_none());
}

#[tokio::test]
async fn test_initialize_when_ready_is_noop() {
   let state = isolated();
   let counter = Arc::new(AtomicUsize::new(0));
   for _ in 0..3 {
      let counter = Arc::clone(&counter);
      state
         .initialize(
            NAME,
            move || async move {
               counter.fetch_add(1, Ordering::SeqCst);
               Ok(())
            },
            Duration::from_secs(1),
         )
         .await
         .unwrap();
   }
   assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_initialize_runs_body_once() {
   let state: &'static LifecycleState = Box::leak(Box::new(isolated()));
   let counter = Arc::new(AtomicUsize::new(0));

   let handles: Vec<_> = (0..16)
      .map(|_| {
         let counter = Arc::clone(&counter);
         tokio::spawn(async move {
            state
               .initialize(
                  NAME,
                  move || async move {
                     counter.fetch_add(1, Ordering::SeqCst);
                     tokio::time::sleep(Duration::from_millis(30)).await;
                     Err::<(), BoxError>("backend offline".into())
                  },
                  Duration::from_secs(5),
               )
               .await
         })
      })
      .collect();

   for handle in handles {
      let err = handle.await.unwrap().unwrap_err();
      assert!(matches!(err, SingletonError::InitializationFailed { .. }));
      assert!(err.to_string().contains("backend offline"));
   }
   assert_eq!(counter.load(Ordering::SeqCst), 1);
   assert_eq!(state.status(), Status::Failed);
}

#[tokio::test]
async fn test_failure_preserves_cause() {
   let state = isolated();
   let err = state
      .initialize(
         NAME,
         || async { Err::<(), BoxError>("bad credentials".into()) },
         Duration::from_secs(1),
      )
      .await
      .unwrap_err();

   match &err {
      SingletonError::InitializationFailed { type_name, source } => {
         assert_eq!(*type_name, NAME);
         assert_eq!(source.to_string(), "bad credentials");
      }
      other => panic!("unexpected error: {other:?}"),
   }
   assert!(!err.is_timeout());
   assert_eq!(state.status(), Status::Failed);
   assert!(state.last_error().is_some());
}

#[tokio::test]
async fn test_failed_is_sticky_until_reset() {
   let state = isolated();
   let counter = Arc::new(AtomicUsize::new(0));
   let attempt = |fail: bool| {
      let counter = Arc::clone(&counter);
      move || async move {
         counter.fetch_add(1, Ordering::SeqCst);
         if fail {
            Err::<(), BoxError>("first attempt fails".into())
         } else {
            Ok(())
         }
      }
   };

   assert!(state.initialize(NAME, attempt(true), Duration::from_secs(1)).await.is_err());
   assert!(state.initialize(NAME, attempt(false), Duration::from_secs(1)).await.is_err());
   assert_eq!(counter.load(Ordering::SeqCst), 1);

   assert!(state.reset(NAME));
   assert_eq!(state.status(), Status::Uninitialized);
   assert!(state.initialize(NAME, attempt(false), Duration::from_secs(1)).await.is_ok());
   assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout() {
   let state = isolated();
   let err = state
      .initialize(
         NAME,
         || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, BoxError>(())
         },
         Duration::from_millis(50),
      )
      .await
      .unwrap_err();

   match err {
      SingletonError::InitializationTimeout { type_name, timeout } => {
         assert_eq!(type_name, NAME);
         assert_eq!(timeout, Duration::from_millis(50));
      }
      other => panic!("unexpected error: {other:?}"),
   }
   assert_eq!(state.status(), Status::Failed);
   assert!(!state.is_ready());
}

#[tokio::test]
async fn test_panicking_body_fails() {
   let state = isolated();
   let err = state
      .initialize(
         NAME,
         || async {
            if true {
               panic!("init exploded");
            }
            Ok::<_, BoxError>(())
         },
         Duration::from_secs(1),
      )
      .await
      .unwrap_err();
   assert!(matches!(err, SingletonError::InitializationFailed { .. }));
   assert_eq!(state.status(), Status::Failed);
}

#[tokio::test]
async fn test_panicking_factory_fails() {
   let state = isolated();
   let err = state
      .initialize(
         NAME,
         || -> std::future::Ready<Result<(), BoxError>> { panic!("factory exploded") },
         Duration::from_secs(1),
      )
      .await
      .unwrap_err();
   assert!(matches!(err, SingletonError::InitializationFailed { .. }));
   assert!(err.to_string().contains("factory exploded"));
   assert_eq!(state.status(), Status::Failed);

   // Settled, so it can be re-armed and retried.
   assert!(state.reset(NAME));
   state
      .initialize(NAME, || async { Ok::<_, BoxError>(()) }, Duration::from_secs(1))
      .await
      .unwrap();
   assert!(state.is_ready());
}

#[test]
fn test_runtime_shutdown_settles_attempt() {
   let state: &'static LifecycleState = Box::leak(Box::new(isolated()));
   let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_time()
      .build()
      .unwrap();
   runtime.block_on(async {
      tokio::spawn(state.initialize(
         NAME,
         || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, BoxError>(())
         },
         Duration::from_secs(120),
      ));
      until_initializing(state).await;
   });
   drop(runtime);

   assert_eq!(state.status(), Status::Failed);
   assert!(matches!(
      state.last_error(),
      Some(SingletonError::InitializationFailed { .. })
   ));
}

#[tokio::test]
async fn test_dropped_caller_does_not_strand_state() {
   let state: &'static LifecycleState = Box::leak(Box::new(isolated()));
   let caller = tokio::spawn(state.initialize(
      NAME,
      || async {
         tokio::time::sleep(Duration::from_millis(20)).await;
         Ok::<_, BoxError>(())
      },
      Duration::from_secs(1),
   ));
   until_initializing(state).await;
   caller.abort();

   state.wait_for_ready(NAME, None).await.unwrap();
   assert_eq!(state.status(), Status::Ready);
}

#[tokio::test]
async fn test_shutdown_during_initialize() {
   let signal: &'static ShutdownSignal = Box::leak(Box::new(ShutdownSignal::new()));
   let state: &'static LifecycleState = Box::leak(Box::new(LifecycleState::with_signal(signal)));

   let init = tokio::spawn(state.initialize(
      NAME,
      || async {
         tokio::time::sleep(Duration::from_secs(60)).await;
         Ok::<_, BoxError>(())
      },
      Duration::from_secs(120),
   ));
   let waiter = tokio::spawn(state.wait_for_ready(NAME, None));
   tokio::time::sleep(Duration::from_millis(10)).await;
   assert_eq!(state.status(), Status::Initializing);

   assert!(signal.trigger());
   assert!(!signal.trigger());

   let err = tokio::time::timeout(Duration::from_secs(1), init)
      .await
      .expect("initialize must resolve promptly after shutdown")
      .unwrap()
      .unwrap_err();
   assert!(err.is_destroyed());
   let err = waiter.await.unwrap().unwrap_err();
   assert!(err.is_destroyed());
   assert_eq!(state.status(), Status::Failed);

   // Already shut down: no waiting at all.
   assert!(state.wait_for_ready(NAME, None).await.unwrap_err().is_destroyed());
}

#[tokio::test]
async fn test_initialize_after_shutdown_does_not_run_body() {
   let signal: &'static ShutdownSignal = Box::leak(Box::new(ShutdownSignal::new()));
   let state = LifecycleState::with_signal(signal);
   signal.trigger();

   let ran = Arc::new(AtomicUsize::new(0));
   let ran2 = Arc::clone(&ran);
   let err = state
      .initialize(
         NAME,
         move || async move {
            ran2.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(())
         },
         Duration::from_secs(1),
      )
      .await
      .unwrap_err();
   assert!(err.is_destroyed());
   assert_eq!(state.status(), Status::Failed);
   tokio::task::yield_now().await;
   assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_wait_for_ready_cancelled_by_caller() {
   let state = isolated();
   let cancel = CancellationToken::new();
   let child = cancel.clone();
   tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(10)).await;
      child.cancel();
   });
   let err = state.wait_for_ready(NAME, Some(&cancel)).await.unwrap_err();
   assert!(matches!(err, SingletonError::WaitCancelled { .. }));
   assert_eq!(state.status(), Status::Uninitialized);
}

#[tokio::test]
async fn test_wait_for_ready_reports_failure() {
   let state: &'static LifecycleState = Box::leak(Box::new(isolated()));
   let waiter = tokio::spawn(state.wait_for_ready(NAME, None));
   tokio::task::yield_now().await;

   let _ = state
      .initialize(NAME, || async { Err::<(), BoxError>("nope".into()) }, Duration::from_secs(1))
      .await;
   let err = waiter.await.unwrap().unwrap_err();
   assert!(matches!(err, SingletonError::InitializationFailed { .. }));
}

#[tokio::test]
async fn test_reset_round_trip() {
   let state: &'static LifecycleState = Box::leak(Box::new(isolated()));
   let ok = || async { Ok::<_, BoxError>(()) };

   state.initialize(NAME, ok, Duration::from_secs(1)).await.unwrap();
   assert!(state.is_ready());
   assert!(state.reset(NAME));
   assert!(!state.is_ready());
   assert!(!state.reset(NAME));

   // A waiter registered after the reset sees nothing until the next attempt.
   let waiter = tokio::spawn(state.wait_for_ready(NAME, None));
   tokio::time::sleep(Duration::from_millis(10)).await;
   assert!(!waiter.is_finished());

   state
      .initialize(
         NAME,
         || async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, BoxError>(())
         },
         Duration::from_secs(1),
      )
      .await
      .unwrap();
   waiter.await.unwrap().unwrap();
   assert_eq!(state.status(), Status::Ready);
}

#[tokio::test]
async fn test_reset_does_not_precancel_next_attempt() {
   let state = isolated();
   let err = state
      .initialize(NAME, || async { Err::<(), BoxError>("once".into()) }, Duration::from_secs(1))
      .await
      .unwrap_err();
   assert!(!err.is_destroyed());
   state.reset(NAME);
   state
      .initialize(
         NAME,
         || async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, BoxError>(())
         },
         Duration::from_secs(1),
      )
      .await
      .unwrap();
}

#[tokio::test]
#[should_panic(expected = "while its initialization is in flight")]
async fn test_reset_while_initializing_panics() {
   let state: &'static LifecycleState = Box::leak(Box::new(isolated()));
   tokio::spawn(state.initialize(
      NAME,
      || async {
         tokio::time::sleep(Duration::from_secs(60)).await;
         Ok::<_, BoxError>(())
      },
      Duration::from_secs(120),
   ));
   until_initializing(state).await;
   state.reset(NAME);
}
