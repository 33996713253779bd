use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lazy_singleton::LazySingletonHolder;
use tokio::time::{sleep, Duration};

static HANDSHAKES: AtomicUsize = AtomicUsize::new(0);

async fn handshake() -> String {
   HANDSHAKES.fetch_add(1, Ordering::Relaxed);
   println!("Performing handshake...");
   sleep(Duration::from_millis(50)).await;
   "session-7f3a".to_string()
}

#[tokio::main]
async fn main() {
   let session = Arc::new(LazySingletonHolder::new(handshake));

   let tasks: Vec<_> = (0..5)
      .map(|i| {
         let session = Arc::clone(&session);
         tokio::spawn(async move {
            println!("Task {i} uses {}", session.get_instance_async().await);
         })
      })
      .collect();

   for t in tasks {
      t.await.unwrap();
   }

   assert_eq!(session.get().map(String::as_str), Some("session-7f3a"));
   assert_eq!(HANDSHAKES.load(Ordering::Relaxed), 1); // handshake ran once
}
