use std::sync::atomic::{AtomicUsize, Ordering};

use poly_singleton::{BoxError, InstanceHolder};

static COUNTER: AtomicUsize = AtomicUsize::new(0);
static DATA: InstanceHolder<String> = InstanceHolder::new();

fn get_data() -> Result<&'static String, poly_singleton::SingletonError> {
   DATA.get_or_create(|| {
      // Runs once, however many threads race here
      COUNTER.fetch_add(1, Ordering::Relaxed);
      println!("Constructing data...");
      std::thread::sleep(std::time::Duration::from_millis(50));
      Ok::<_, BoxError>("Expensive data".to_string())
   })
}

fn main() {
   let threads: Vec<_> = (0..5)
      .map(|_| {
         std::thread::spawn(|| {
            println!("Thread access: {}", get_data().unwrap());
         })
      })
      .collect();

   for t in threads {
      t.join().unwrap();
   }

   assert!(DATA.is_created());
   assert_eq!(COUNTER.load(Ordering::Relaxed), 1);

   DATA.destroy();
   match get_data() {
      Ok(_) => panic!("destroyed holder must not hand out the instance"),
      Err(e) => println!("After destroy: {}", e),
   }
}
