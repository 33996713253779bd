use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use lazy_singleton::{Error, LazySingletonHolder};
use proptest::prelude::*;

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("factory refused on attempt {0}")]
struct Refused(usize);

#[test]
fn test_new_is_empty() {
   let holder: LazySingletonHolder<i32> = LazySingletonHolder::new(|| 42);
   assert!(!holder.is_ready());
   assert_eq!(holder.get(), None);
}

#[test]
fn test_sequential_calls_construct_once() {
   let calls = AtomicUsize::new(0);
   let holder = LazySingletonHolder::new(|| {
      calls.fetch_add(1, Ordering::SeqCst);
      String::from("config")
   });

   let first = holder.get_instance();
   for _ in 0..10 {
      let again = holder.get_instance();
      assert!(std::ptr::eq(first, again));
   }
   assert_eq!(first, "config");
   assert!(holder.is_ready());
   assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_hundred_concurrent_callers_share_one_instance() {
   let calls = Arc::new(AtomicUsize::new(0));
   let holder = Arc::new(LazySingletonHolder::new({
      let calls = Arc::clone(&calls);
      move || {
         calls.fetch_add(1, Ordering::SeqCst);
         thread::sleep(Duration::from_millis(1));
         Box::new([0u64; 16])
      }
   }));
   let start = Arc::new(Barrier::new(100));

   let threads: Vec<_> = (0..100)
      .map(|_| {
         let holder = Arc::clone(&holder);
         let start = Arc::clone(&start);
         thread::spawn(move || {
            start.wait();
            let instance: &Box<[u64; 16]> = holder.get_instance();
            &**instance as *const [u64; 16] as usize
         })
      })
      .collect();

   let addresses: Vec<usize> = threads.into_iter().map(|t| t.join().unwrap()).collect();
   assert!(addresses.iter().all(|&addr| addr == addresses[0]));
   assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_every_field_visible_from_every_thread() {
   struct Table {
      rows: Vec<usize>,
      checksum: usize,
      sealed: bool,
   }

   let holder: LazySingletonHolder<Table, _> = LazySingletonHolder::new(|| {
      let rows: Vec<usize> = (0..4096).collect();
      let checksum = rows.iter().sum();
      thread::sleep(Duration::from_millis(5));
      Table {
         rows,
         checksum,
         sealed: true,
      }
   });

   thread::scope(|s| {
      for _ in 0..16 {
         s.spawn(|| {
            let table = holder.get_instance();
            assert!(table.sealed);
            assert_eq!(table.rows.len(), 4096);
            assert_eq!(table.rows.iter().sum::<usize>(), table.checksum);
            assert!(table.rows.iter().enumerate().all(|(i, &row)| i == row));
         });
      }
   });
}

#[test]
fn test_fast_path_readers_see_published_instance() {
   let holder: LazySingletonHolder<Vec<u8>, _> = LazySingletonHolder::new(|| vec![7u8; 256]);
   let done = AtomicBool::new(false);

   thread::scope(|s| {
      for _ in 0..4 {
         s.spawn(|| {
            while !done.load(Ordering::Acquire) {
               if let Some(bytes) = holder.get() {
                  assert_eq!(bytes.len(), 256);
                  assert!(bytes.iter().all(|&b| b == 7));
               }
            }
         });
      }
      thread::sleep(Duration::from_millis(2));
      holder.get_instance();
      thread::sleep(Duration::from_millis(2));
      done.store(true, Ordering::Release);
   });
}

#[test]
fn test_distinct_holders_never_share() {
   let a = LazySingletonHolder::new(|| String::from("same"));
   let b = LazySingletonHolder::new(|| String::from("same"));

   let from_a = a.get_instance();
   let from_b = b.get_instance();
   assert_eq!(from_a, from_b);
   assert!(!std::ptr::eq(from_a, from_b));
}

#[test]
fn test_failure_then_success() {
   let attempts = AtomicUsize::new(0);
   let holder = LazySingletonHolder::new(|| {
      let attempt = attempts.fetch_add(1, Ordering::SeqCst);
      if attempt == 0 {
         Err(Refused(attempt))
      } else {
         Ok(format!("built on attempt {attempt}"))
      }
   });

   let first = holder.try_get_instance();
   assert_eq!(first, Err(Error::ConstructionFailure(Refused(0))));
   assert!(!holder.is_ready());
   assert_eq!(holder.get(), None);

   let second = holder.try_get_instance().expect("second attempt succeeds");
   assert_eq!(second, "built on attempt 1");
   assert!(holder.is_ready());

   // Published instances are returned without another attempt.
   assert_eq!(holder.try_get_instance().map(String::as_str), Ok("built on attempt 1"));
   assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_failure_surfaces_source() {
   let holder: LazySingletonHolder<u8, _> = LazySingletonHolder::new(|| Err(Refused(3)));
   let err = holder.try_get_instance().unwrap_err();
   assert_eq!(err.to_string(), "singleton construction failed: factory refused on attempt 3");
   assert_eq!(err.into_source(), Refused(3));
}

#[test]
fn test_panicking_factory_leaves_holder_retryable() {
   let attempts = AtomicUsize::new(0);
   let holder = LazySingletonHolder::new(|| {
      if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
         panic!("first construction blows up");
      }
      99u32
   });

   let outcome = panic::catch_unwind(AssertUnwindSafe(|| *holder.get_instance()));
   assert!(outcome.is_err());
   assert!(!holder.is_ready());

   assert_eq!(*holder.get_instance(), 99);
   assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_waiters_retry_after_failed_construction() {
   let attempts = Arc::new(AtomicUsize::new(0));
   let holder = Arc::new(LazySingletonHolder::new({
      let attempts = Arc::clone(&attempts);
      move || {
         let attempt = attempts.fetch_add(1, Ordering::SeqCst);
         thread::sleep(Duration::from_millis(20));
         if attempt == 0 {
            Err(Refused(attempt))
         } else {
            Ok(attempt)
         }
      }
   }));

   let threads: Vec<_> = (0..8)
      .map(|i| {
         let holder = Arc::clone(&holder);
         thread::spawn(move || {
            // Let the first thread win the lock so the others park behind it.
            if i > 0 {
               thread::sleep(Duration::from_millis(5));
            }
            holder.try_get_instance().copied()
         })
      })
      .collect();

   let results: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
   let failures = results.iter().filter(|r| r.is_err()).count();
   assert_eq!(failures, 1);
   assert!(results.iter().flatten().all(|&v| v == 1));
   assert_eq!(holder.get(), Some(&1));
   assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_get_mut_after_publish() {
   let mut holder: LazySingletonHolder<Vec<i32>, _> = LazySingletonHolder::new(|| vec![1, 2, 3]);
   assert_eq!(holder.get_mut(), None);

   holder.get_instance();
   holder.get_mut().unwrap().push(4);
   assert_eq!(holder.get(), Some(&vec![1, 2, 3, 4]));
}

#[test]
fn test_get_instance_mut_skips_lock() {
   let calls = AtomicUsize::new(0);
   let mut holder: LazySingletonHolder<String, _> = LazySingletonHolder::new(|| {
      calls.fetch_add(1, Ordering::SeqCst);
      String::from("a")
   });

   holder.get_instance_mut().push('b');
   holder.get_instance_mut().push('c');
   assert_eq!(holder.get_instance(), "abc");
   assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_into_inner() {
   let holder = LazySingletonHolder::new(|| String::from("owned"));
   holder.get_instance();
   assert_eq!(holder.into_inner(), Some(String::from("owned")));

   let untouched: LazySingletonHolder<String, _> = LazySingletonHolder::new(|| String::from("never built"));
   assert_eq!(untouched.into_inner(), None);
}

#[test]
fn test_drop_releases_instance_once() {
   struct Tracked(Arc<AtomicUsize>);

   impl Drop for Tracked {
      fn drop(&mut self) {
         self.0.fetch_add(1, Ordering::SeqCst);
      }
   }

   let drops = Arc::new(AtomicUsize::new(0));

   {
      let drops = Arc::clone(&drops);
      let holder = LazySingletonHolder::new(move || Tracked(Arc::clone(&drops)));
      holder.get_instance();
      holder.get_instance();
   }
   assert_eq!(drops.load(Ordering::SeqCst), 1);

   {
      let drops = Arc::clone(&drops);
      let _holder: LazySingletonHolder<Tracked, _> =
         LazySingletonHolder::new(move || Tracked(Arc::clone(&drops)));
   }
   assert_eq!(drops.load(Ordering::SeqCst), 1);
}

static STATIC_BUILDS: AtomicUsize = AtomicUsize::new(0);
static STATIC_HOLDER: LazySingletonHolder<Vec<&'static str>> = LazySingletonHolder::new(|| {
   STATIC_BUILDS.fetch_add(1, Ordering::SeqCst);
   vec!["alpha", "beta"]
});

#[test]
fn test_static_holder_through_deref() {
   thread::scope(|s| {
      for _ in 0..8 {
         s.spawn(|| {
            assert_eq!(STATIC_HOLDER.len(), 2);
            assert_eq!(STATIC_HOLDER[0], "alpha");
         });
      }
   });
   let instance: &'static Vec<&'static str> = STATIC_HOLDER.get_instance();
   assert_eq!(instance, &vec!["alpha", "beta"]);
   assert_eq!(STATIC_BUILDS.load(Ordering::SeqCst), 1);
}

proptest! {
   #[test]
   fn prop_factory_runs_until_first_success(outcomes in prop::collection::vec(any::<Option<u16>>(), 1..16)) {
      let attempts = AtomicUsize::new(0);
      let holder = LazySingletonHolder::new(|| {
         let attempt = attempts.fetch_add(1, Ordering::SeqCst);
         outcomes.get(attempt).copied().flatten().ok_or(Refused(attempt))
      });

      let first_success = outcomes.iter().position(Option::is_some);
      for _ in 0..outcomes.len() + 2 {
         let _ = holder.try_get_instance();
      }

      match first_success {
         Some(index) => {
            prop_assert_eq!(attempts.load(Ordering::SeqCst), index + 1);
            prop_assert_eq!(holder.get().copied(), outcomes[index]);
         }
         None => {
            prop_assert_eq!(attempts.load(Ordering::SeqCst), outcomes.len() + 2);
            prop_assert!(!holder.is_ready());
         }
      }
   }
}
