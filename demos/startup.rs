use std::future::Future;
use std::time::Duration;

use poly_singleton::{
   shutdown, singleton_registry, startup, BoxError, ShutdownSignal, Singleton, SingletonConfig, SingletonRegistry,
   SingletonSlot,
};
use tracing_subscriber::EnvFilter;

struct Database {
   url: String,
}

static DATABASE: SingletonSlot<Database> = SingletonSlot::new();

impl Singleton for Database {
   fn slot() -> &'static SingletonSlot<Self> {
      &DATABASE
   }

   fn create() -> Result<Self, BoxError> {
      Ok(Database {
         url: "postgres://localhost/app".to_string(),
      })
   }

   fn config() -> Option<SingletonConfig> {
      Some(SingletonConfig::new().with_auto_init(true).with_timeout(Duration::from_secs(1)))
   }

   fn on_initialize(&self) -> impl Future<Output = Result<(), BoxError>> + Send {
      async move {
         tracing::info!(url = %self.url, "connecting");
         tokio::time::sleep(Duration::from_millis(100)).await;
         Ok(())
      }
   }
}

struct Telemetry;

static TELEMETRY: SingletonSlot<Telemetry> = SingletonSlot::new();

impl Singleton for Telemetry {
   fn slot() -> &'static SingletonSlot<Self> {
      &TELEMETRY
   }

   fn create() -> Result<Self, BoxError> {
      Ok(Telemetry)
   }

   fn config() -> Option<SingletonConfig> {
      Some(SingletonConfig::new().with_auto_init(true).with_timeout(Duration::from_millis(50)))
   }

   fn on_initialize(&self) -> impl Future<Output = Result<(), BoxError>> + Send {
      async {
         // Collector is unreachable; startup reports the timeout and moves on.
         tokio::time::sleep(Duration::from_secs(10)).await;
         Ok(())
      }
   }
}

struct Cache;

static CACHE: SingletonSlot<Cache> = SingletonSlot::new();

impl Singleton for Cache {
   fn slot() -> &'static SingletonSlot<Self> {
      &CACHE
   }

   fn create() -> Result<Self, BoxError> {
      println!("Cache constructed on first use");
      Ok(Cache)
   }

   fn config() -> Option<SingletonConfig> {
      Some(SingletonConfig::new())
   }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
      .init();

   let _signals = ShutdownSignal::global().listen_for_os_signals()?;

   let registry = SingletonRegistry::install(singleton_registry![Database, Telemetry, Cache])
      .map_err(|_| "registry already installed")?;
   let report = startup(registry).await;
   for (name, error) in report.failed() {
      println!("{name} failed: {error}");
   }

   let db = Database::get_ready()?;
   println!("Database ready at {}", db.url);
   assert!(Cache::try_instance().is_none());

   Cache::initialize().await?;
   println!("Cache ready: {}", Cache::instance()?.is_ready());

   shutdown();
   assert!(Database::instance().is_err());
   Ok(())
}
