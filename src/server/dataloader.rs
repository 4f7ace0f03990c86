use std::any::type_name;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::poll_fn;
use std::hash::Hash;
use std::mem;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::Poll;

use futures_util::future::{BoxFuture, join_all};
use futures_util::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::store::StoreError;

#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("batch fetch failed: {0}")]
    Fetch(Arc<StoreError>),
    #[error("`{table}` returned {rows} rows for unique key `{key}`")]
    KeyShapeMismatch {
        table: &'static str,
        key: String,
        rows: usize,
    },
    #[error("the batch loading this key was dropped before it finished")]
    Cancelled,
}

impl From<StoreError> for LoadError {
    fn from(error: StoreError) -> Self {
        Self::Fetch(Arc::new(error))
    }
}

pub trait BatchLoader: Send + 'static {
    type K: Hash + Eq + Clone + Debug + Send + Sync + 'static;
    /// `V::default()` is handed to every key the batch did not return.
    type V: Clone + Default + Send + Sync + 'static;

    fn load_batch(
        &self,
        keys: Vec<Self::K>,
    ) -> impl Future<Output = Result<HashMap<Self::K, Self::V>, LoadError>> + Send + 'static;
}

type Reply<V> = oneshot::Sender<Result<V, LoadError>>;

enum Entry<V> {
    Requested(Vec<Reply<V>>),
    Ready(V),
}

enum Lookup<V> {
    Ready(V),
    Waiting(oneshot::Receiver<Result<V, LoadError>>),
}

struct LoaderInner<B: BatchLoader> {
    values: HashMap<B::K, Entry<B::V>>,
    pending_keys: HashMap<B::K, Vec<Reply<B::V>>>,
    load_batch: B,
}

impl<B: BatchLoader> LoaderInner<B> {
    fn lookup(&mut self, key: B::K) -> Lookup<B::V> {
        let (reply, receiver) = oneshot::channel();
        match self.values.get_mut(&key) {
            Some(Entry::Ready(v)) => return Lookup::Ready(v.clone()),
            Some(Entry::Requested(waiting)) => waiting.push(reply),
            None => self
                .pending_keys
                .entry(key)
                .or_insert_with_key(|key| {
                    tracing::trace!(?key, "queued key");
                    vec![]
                })
                .push(reply),
        }
        Lookup::Waiting(receiver)
    }

    fn settle(&mut self, keys: Vec<B::K>, result: Result<HashMap<B::K, B::V>, LoadError>) {
        match result {
            Ok(mut found) => {
                for k in keys {
                    let v = found.remove(&k).unwrap_or_default();
                    if let Some(Entry::Requested(waiting)) =
                        self.values.insert(k, Entry::Ready(v.clone()))
                    {
                        for reply in waiting {
                            // The caller may have stopped waiting.
                            let _ = reply.send(Ok(v.clone()));
                        }
                    }
                }
                if !found.is_empty() {
                    tracing::debug!(
                        loader = type_name::<B>(),
                        extra = found.len(),
                        "batch returned keys nobody asked for"
                    );
                }
            }
            Err(error) => {
                tracing::warn!(
                    loader = type_name::<B>(),
                    keys = keys.len(),
                    %error,
                    "batch failed"
                );
                // Failures are not cached, the next `load` opens a new window.
                for k in keys {
                    if let Some(Entry::Requested(waiting)) = self.values.remove(&k) {
                        for reply in waiting {
                            let _ = reply.send(Err(error.clone()));
                        }
                    }
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A batch that has been handed to the store. Dropping it before it finishes
/// releases its keys so they are neither stuck nor cached.
struct InFlight<B: BatchLoader> {
    inner: Arc<Mutex<LoaderInner<B>>>,
    keys: Vec<B::K>,
}

impl<B: BatchLoader> InFlight<B> {
    async fn run(
        mut self,
        fetch: impl Future<Output = Result<HashMap<B::K, B::V>, LoadError>> + Send,
    ) {
        let result = fetch.await;
        let keys = mem::take(&mut self.keys);
        lock(&self.inner).settle(keys, result);
    }
}

impl<B: BatchLoader> Drop for InFlight<B> {
    fn drop(&mut self) {
        if !self.keys.is_empty() {
            let keys = mem::take(&mut self.keys);
            lock(&self.inner).settle(keys, Err(LoadError::Cancelled));
        }
    }
}

/// A request-scoped batching cache in front of one [`BatchLoader`].
///
/// `load` only queues the key. Queued keys are handed to the batch loader
/// together once the surrounding execution stops making progress on its own,
/// see [`wrap`], or when [`DataLoader::flush`] is called.
pub struct DataLoader<B: BatchLoader> {
    inner: Arc<Mutex<LoaderInner<B>>>,
}
impl<B: BatchLoader> Clone for DataLoader<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: BatchLoader> DataLoader<B> {
    pub fn new(load_batch: B) -> Self {
        let inner = LoaderInner {
            load_batch,
            values: Default::default(),
            pending_keys: Default::default(),
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn load(
        &self,
        key: B::K,
    ) -> impl Future<Output = Result<B::V, LoadError>> + Send + 'static {
        let lookup = lock(&self.inner).lookup(key);
        async move {
            match lookup {
                Lookup::Ready(v) => Ok(v),
                Lookup::Waiting(receiver) => receiver.await.unwrap_or(Err(LoadError::Cancelled)),
            }
        }
    }

    /// Loads every key, answering in the order the keys were given.
    pub fn load_many(
        &self,
        keys: impl IntoIterator<Item = B::K>,
    ) -> impl Future<Output = Result<Vec<B::V>, LoadError>> + Send + 'static {
        let loads: Vec<_> = keys.into_iter().map(|k| self.load(k)).collect();
        async move { join_all(loads).await.into_iter().collect() }
    }

    /// Dispatches the open window right away and waits for it to settle.
    #[cfg(test)]
    pub async fn flush(&self) {
        if let Some(batch) = self.dispatch() {
            batch.await;
        }
    }
}

/// Type-erased access to a loader's open window.
pub trait Dispatch: Send + Sync {
    /// Closes the open window, returning the batch to drive if it had keys.
    fn dispatch(&self) -> Option<BoxFuture<'static, ()>>;
}

impl<B: BatchLoader> Dispatch for DataLoader<B> {
    fn dispatch(&self) -> Option<BoxFuture<'static, ()>> {
        let mut inner = lock(&self.inner);
        if inner.pending_keys.is_empty() {
            return None;
        }

        let mut keys = Vec::with_capacity(inner.pending_keys.len());
        for (k, waiting) in mem::take(&mut inner.pending_keys) {
            keys.push(k.clone());
            inner.values.insert(k, Entry::Requested(waiting));
        }
        tracing::debug!(loader = type_name::<B>(), keys = keys.len(), "dispatching batch");

        let fetch = inner.load_batch.load_batch(keys.clone());
        drop(inner);

        let batch = InFlight {
            inner: self.inner.clone(),
            keys,
        };
        Some(Box::pin(batch.run(fetch)))
    }
}

/// Drives `fut` to completion, dispatching the loaders' windows whenever it
/// stalls.
///
/// A poll of `fut` that returns `Pending` has queued every key reachable
/// without waiting on I/O, so that is where a window closes. Dispatched batches
/// run next to `fut` and next to each other; a window opened while another
/// batch is still loading does not wait for it.
pub async fn wrap<O>(loaders: &[&dyn Dispatch], fut: impl Future<Output = O>) -> O {
    let mut in_flight: FuturesUnordered<BoxFuture<'static, ()>> = FuturesUnordered::new();

    let mut fut = pin!(fut);
    poll_fn(move |cx| {
        // Settled batches wake their waiters, which live inside `fut`.
        while let Poll::Ready(Some(())) = in_flight.poll_next_unpin(cx) {}

        let res = fut.as_mut().poll(cx);
        if res.is_pending() {
            let dispatched = in_flight.len();
            in_flight.extend(loaders.iter().filter_map(|loader| loader.dispatch()));

            if in_flight.len() > dispatched {
                // Wake immediately, to instruct the runtime to call `poll` again.
                cx.waker().wake_by_ref();
            }
        }
        res
    })
    .await
}
