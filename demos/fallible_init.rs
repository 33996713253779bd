use std::sync::atomic::{AtomicBool, Ordering};

use lazy_singleton::LazySingletonHolder;

#[derive(Debug, thiserror::Error)]
#[error("license server unreachable")]
struct Unreachable;

struct License {
   seats: u32,
}

struct App<F: Fn() -> Result<License, Unreachable>> {
   license: LazySingletonHolder<License, F>,
}

fn main() {
   let server_up = AtomicBool::new(false);
   let app = App {
      license: LazySingletonHolder::new(|| {
         println!("Contacting license server...");
         if server_up.load(Ordering::SeqCst) {
            Ok(License { seats: 25 })
         } else {
            Err(Unreachable)
         }
      }),
   };

   // First attempt fails and leaves the holder empty.
   match app.license.try_get_instance() {
      Ok(_) => panic!("should have failed"),
      Err(e) => println!("Caught error: {e}"),
   }
   assert!(!app.license.is_ready());

   // The next attempt runs the factory again.
   server_up.store(true, Ordering::SeqCst);
   match app.license.try_get_instance() {
      Ok(license) => println!("Licensed for {} seats", license.seats),
      Err(e) => panic!("should have succeeded: {e}"),
   }
   assert!(app.license.is_ready());

   // Once published, the factory is not consulted again.
   server_up.store(false, Ordering::SeqCst);
   let seats = app.license.try_get_instance().map(|l| l.seats);
   assert_eq!(seats.ok(), Some(25));
}
