use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::yield_now;

use crate::server::dataloader::{BatchLoader, DataLoader, Dispatch, LoadError, wrap};
use crate::store::StoreError;

/// Keys at or above this are never found.
const MISSING: u32 = 100;
/// Batches containing this key wait for `Squares::gate`.
const SLOW: u32 = 7;

#[derive(Clone, Default)]
struct Squares {
    batches: Arc<Mutex<Vec<Vec<u32>>>>,
    failing: Arc<AtomicBool>,
    gate: Arc<Notify>,
}

impl Squares {
    fn batches(&self) -> Vec<Vec<u32>> {
        self.batches.lock().unwrap().clone()
    }
}

impl BatchLoader for Squares {
    type K = u32;
    type V = Option<u64>;

    fn load_batch(
        &self,
        mut keys: Vec<u32>,
    ) -> impl Future<Output = Result<HashMap<u32, Option<u64>>, LoadError>> + Send + 'static {
        keys.sort();
        self.batches.lock().unwrap().push(keys.clone());
        let failing = self.failing.load(Ordering::SeqCst);
        let gate = self.gate.clone();

        async move {
            if keys.contains(&SLOW) {
                gate.notified().await;
            }
            if failing {
                return Err(LoadError::from(StoreError::Unavailable { table: "squares" }));
            }
            // Answer in reverse order, the loader has to match keys itself.
            Ok(keys
                .iter()
                .rev()
                .filter(|k| **k < MISSING)
                .map(|k| (*k, Some(u64::from(*k) * u64::from(*k))))
                .collect())
        }
    }
}

#[tokio::test]
async fn test_one_batch_per_window() {
    let squares = Squares::default();
    let loader = DataLoader::new(squares.clone());

    let (a, b, c, again) = wrap(&[&loader], async {
        tokio::join!(loader.load(3), loader.load(1), loader.load(2), loader.load(3))
    })
    .await;

    assert_eq!(a.unwrap(), Some(9));
    assert_eq!(b.unwrap(), Some(1));
    assert_eq!(c.unwrap(), Some(4));
    assert_eq!(again.unwrap(), Some(9));
    assert_eq!(squares.batches(), [vec![1, 2, 3]]);
}

#[tokio::test]
async fn test_missing_keys_get_the_default() {
    let squares = Squares::default();
    let loader = DataLoader::new(squares.clone());

    let (found, missing) = wrap(&[&loader], async {
        tokio::join!(loader.load(5), loader.load(MISSING + 1))
    })
    .await;

    assert_eq!(found.unwrap(), Some(25));
    assert_eq!(missing.unwrap(), None);
}

#[tokio::test]
async fn test_results_are_cached() {
    let squares = Squares::default();
    let loader = DataLoader::new(squares.clone());

    let first = wrap(&[&loader], loader.load(4)).await.unwrap();
    let absent = wrap(&[&loader], loader.load(MISSING)).await.unwrap();
    let (second, absent_again) = wrap(&[&loader], async {
        tokio::join!(loader.load(4), loader.load(MISSING))
    })
    .await;

    assert_eq!(first, Some(16));
    assert_eq!(second.unwrap(), first);
    assert_eq!(absent, None);
    assert_eq!(absent_again.unwrap(), None);
    // The last window was answered from the cache.
    assert_eq!(squares.batches(), [vec![4], vec![MISSING]]);
}

#[tokio::test]
async fn test_load_many_keeps_key_order() {
    let squares = Squares::default();
    let loader = DataLoader::new(squares.clone());

    let values = wrap(&[&loader], loader.load_many([9, MISSING, 2, 9]))
        .await
        .unwrap();

    assert_eq!(values, [Some(81), None, Some(4), Some(81)]);
    assert_eq!(squares.batches(), [vec![2, 9, MISSING]]);
}

#[tokio::test]
async fn test_failure_reaches_every_waiter_and_is_not_cached() {
    let squares = Squares::default();
    let loader = DataLoader::new(squares.clone());
    squares.failing.store(true, Ordering::SeqCst);

    let (a, b) = wrap(&[&loader], async { tokio::join!(loader.load(1), loader.load(2)) }).await;
    assert!(matches!(a, Err(LoadError::Fetch(_))));
    assert!(matches!(b, Err(LoadError::Fetch(_))));

    squares.failing.store(false, Ordering::SeqCst);
    let retried = wrap(&[&loader], loader.load(1)).await;

    assert_eq!(retried.unwrap(), Some(1));
    assert_eq!(squares.batches(), [vec![1, 2], vec![1]]);
}

#[tokio::test]
async fn test_later_window_does_not_wait_for_earlier_batch() {
    let squares = Squares::default();
    let loader = DataLoader::new(squares.clone());

    let loaders = [&loader as &dyn Dispatch];
    let run = wrap(&loaders, async {
        let slow = loader.load(SLOW);
        // Let the first window close while `SLOW` is still loading.
        yield_now().await;

        let fast = loader.load(2).await;
        squares.gate.notify_one();
        (slow.await, fast)
    });
    let (slow, fast) = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("second window was blocked by the first");

    assert_eq!(slow.unwrap(), Some(49));
    assert_eq!(fast.unwrap(), Some(4));
    assert_eq!(squares.batches(), [vec![SLOW], vec![2]]);
}

#[tokio::test]
async fn test_flush_without_driver() {
    let squares = Squares::default();
    let loader = DataLoader::new(squares.clone());

    let a = loader.load(3);
    let b = loader.load(3);
    loader.flush().await;

    assert_eq!(a.await.unwrap(), Some(9));
    assert_eq!(b.await.unwrap(), Some(9));
    assert_eq!(squares.batches(), [vec![3]]);
}

#[tokio::test]
async fn test_dropped_batch_cancels_waiters() {
    let squares = Squares::default();
    let loader = DataLoader::new(squares.clone());

    let pending = loader.load(SLOW);
    let batch = loader.dispatch().unwrap();
    drop(batch);
    assert!(matches!(pending.await, Err(LoadError::Cancelled)));

    // The key was released, so a new window fetches it again.
    let retried = loader.load(SLOW);
    squares.gate.notify_one();
    loader.flush().await;
    assert_eq!(retried.await.unwrap(), Some(49));
    assert_eq!(squares.batches(), [vec![SLOW], vec![SLOW]]);
}

#[tokio::test]
async fn test_nothing_to_dispatch() {
    let loader = DataLoader::new(Squares::default());
    assert!(loader.dispatch().is_none());

    let value = wrap(&[&loader], async { 42 }).await;
    assert_eq!(value, 42);
}
