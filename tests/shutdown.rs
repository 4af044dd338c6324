//! Fires the process-wide shutdown signal, so it runs as its own test binary
//! with a single test.

use std::future::Future;
use std::time::Duration;

use poly_singleton::{
   shutdown, singleton_registry, startup, BoxError, CancellationToken, ShutdownSignal, Singleton, SingletonConfig,
   SingletonError, SingletonRegistry, SingletonSlot, Status,
};

#[derive(Debug)]
struct Journal;

static JOURNAL: SingletonSlot<Journal> = SingletonSlot::new();

impl Singleton for Journal {
   fn slot() -> &'static SingletonSlot<Self> {
      &JOURNAL
   }

   fn create() -> Result<Self, BoxError> {
      Ok(Journal)
   }

   fn config() -> Option<SingletonConfig> {
      Some(SingletonConfig::new().with_auto_init(true))
   }
}

struct Replicator;

static REPLICATOR: SingletonSlot<Replicator> = SingletonSlot::new();

impl Singleton for Replicator {
   fn slot() -> &'static SingletonSlot<Self> {
      &REPLICATOR
   }

   fn create() -> Result<Self, BoxError> {
      Ok(Replicator)
   }

   fn config() -> Option<SingletonConfig> {
      Some(SingletonConfig::new().with_timeout(Duration::from_secs(600)))
   }

   fn on_initialize(&self) -> impl Future<Output = Result<(), BoxError>> + Send {
      async {
         tokio::time::sleep(Duration::from_secs(300)).await;
         Ok(())
      }
   }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_process_shutdown() {
   let registry = SingletonRegistry::install(singleton_registry![Journal, Replicator]).unwrap();
   let report = startup(registry).await;
   assert!(report.is_success());
   assert_eq!(Journal::status(), Status::Ready);

   let in_flight = tokio::spawn(Replicator::initialize());
   let waiter = tokio::spawn(async {
      let never = CancellationToken::new();
      Replicator::wait_for_ready(&never).await.map(|_| ())
   });
   while Replicator::status() != Status::Initializing {
      tokio::task::yield_now().await;
   }

   assert!(!ShutdownSignal::global().is_triggered());
   assert!(shutdown());
   assert!(!shutdown());
   assert!(ShutdownSignal::global().is_triggered());

   let err = tokio::time::timeout(Duration::from_secs(2), in_flight)
      .await
      .expect("in-flight initialization must resolve after shutdown")
      .unwrap()
      .unwrap_err();
   assert!(err.is_destroyed());
   assert!(waiter.await.unwrap().unwrap_err().is_destroyed());
   assert_eq!(Replicator::status(), Status::Failed);

   // Every accessor now fails fast.
   assert!(matches!(Journal::instance(), Err(SingletonError::Destroyed { .. })));
   assert!(matches!(Journal::get_ready(), Err(SingletonError::Destroyed { .. })));
   assert!(Journal::ready().await.unwrap_err().is_destroyed());
   assert!(Journal::slot().holder().is_destroyed());
   assert!(Journal::try_instance().is_none());
   assert!(ShutdownSignal::global().token().is_cancelled());
}
