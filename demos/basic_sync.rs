use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lazy_singleton::LazySingletonHolder;

static BUILDS: AtomicUsize = AtomicUsize::new(0);

struct Catalog {
   items: Vec<&'static str>,
}

static CATALOG: LazySingletonHolder<Catalog> = LazySingletonHolder::new(|| {
   BUILDS.fetch_add(1, Ordering::Relaxed);
   println!("Loading catalog...");
   std::thread::sleep(Duration::from_millis(50));
   Catalog {
      items: vec!["anvil", "rope", "lantern"],
   }
});

fn main() {
   let threads: Vec<_> = (0..5)
      .map(|i| {
         std::thread::spawn(move || {
            println!("Thread {i} sees {} items", CATALOG.items.len());
         })
      })
      .collect();

   for t in threads {
      t.join().unwrap();
   }

   assert!(CATALOG.is_ready());
   assert_eq!(BUILDS.load(Ordering::Relaxed), 1); // factory ran once
   println!("First item: {}", CATALOG.get_instance().items[0]);
}
