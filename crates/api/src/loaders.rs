//! Per-request batch loaders.
//!
//! Building a page of post views needs the author of every post and the
//! requesting user's own vote on every post. Loading those one row at a
//! time costs two queries per post; a loader collects every key requested
//! while the current task is still doing synchronous work, then resolves
//! the whole set with one grouped query and hands each caller its own
//! value back.
//!
//! Loaders are constructed fresh for every incoming request by
//! [`loaders_middleware`] and travel through request extensions. They hold
//! an unbounded memo of everything they have resolved, so sharing one
//! across requests would leak memory and serve stale rows.

use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
    sync::{Arc, Mutex},
};

use anyhow::anyhow;
use async_trait::async_trait;
use axum::{extract::State, http::Request, middleware::Next, response::Response};
use db::{
    models::{Updoot, User},
    types::DbId,
};
use diesel_async::{pooled_connection::deadpool::Pool, AsyncPgConnection};
use tokio::sync::oneshot;
use web::AppState;

/// The grouped fetch behind a loader: given every distinct key collected in
/// one batch, return whatever the store has for them. Keys with no row are
/// simply absent from the map.
#[async_trait]
pub trait BatchFn<K, V>: Send + Sync + 'static {
    async fn fetch(&self, keys: &[K]) -> anyhow::Result<HashMap<K, V>>;
}

type Waiter<V> = oneshot::Sender<Result<Option<V>, Arc<anyhow::Error>>>;

struct Shared<K, V> {
    waiters: Vec<(K, Waiter<V>)>,
    dispatch_scheduled: bool,
    /// Everything this loader has already resolved, absence included.
    /// Grows for the lifetime of one request and is dropped with it.
    resolved: HashMap<K, Option<V>>,
}

pub struct Loader<K, V> {
    batch_fn: Arc<dyn BatchFn<K, V>>,
    shared: Arc<Mutex<Shared<K, V>>>,
}

impl<K, V> Clone for Loader<K, V> {
    fn clone(&self) -> Self {
        Loader {
            batch_fn: Arc::clone(&self.batch_fn),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> Loader<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(batch_fn: impl BatchFn<K, V>) -> Self {
        Loader {
            batch_fn: Arc::new(batch_fn),
            shared: Arc::new(Mutex::new(Shared {
                waiters: Vec::new(),
                dispatch_scheduled: false,
                resolved: HashMap::new(),
            })),
        }
    }

    /// Queues `key` into the current batch and resolves once the batch is
    /// fetched. Duplicate keys are fetched once and answered to every
    /// caller; keys resolved earlier in the request are answered from the
    /// memo without touching the store. `None` means there is no row for
    /// the key.
    pub async fn load(&self, key: K) -> anyhow::Result<Option<V>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut shared = self.shared.lock().expect("loader mutex poisoned");

            if let Some(value) = shared.resolved.get(&key) {
                return Ok(value.clone());
            }
            shared.waiters.push((key, tx));

            if !shared.dispatch_scheduled {
                shared.dispatch_scheduled = true;
                let batch_fn = Arc::clone(&self.batch_fn);
                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    // Every load() issued during the current synchronous
                    // phase must get its key in before the batch closes.
                    tokio::task::yield_now().await;
                    dispatch(batch_fn, shared).await;
                });
            }
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(anyhow!("batched fetch failed: {}", err)),
            Err(_) => Err(anyhow!("batched fetch was dropped before resolving")),
        }
    }
}

async fn dispatch<K, V>(batch_fn: Arc<dyn BatchFn<K, V>>, shared: Arc<Mutex<Shared<K, V>>>)
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let waiters = {
        let mut shared = shared.lock().expect("loader mutex poisoned");
        shared.dispatch_scheduled = false;
        std::mem::take(&mut shared.waiters)
    };
    if waiters.is_empty() {
        return;
    }

    // Deduplicate, keeping first-request order.
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for (key, _) in &waiters {
        if seen.insert(key.clone()) {
            unique.push(key.clone());
        }
    }

    match batch_fn.fetch(&unique).await {
        Ok(values) => {
            {
                let mut shared = shared.lock().expect("loader mutex poisoned");
                for key in &unique {
                    shared
                        .resolved
                        .insert(key.clone(), values.get(key).cloned());
                }
            }
            for (key, waiter) in waiters {
                let _ = waiter.send(Ok(values.get(&key).cloned()));
            }
        }
        Err(err) => {
            // One failed fetch fails every caller waiting on this batch;
            // nothing is memoized, so a later load may retry.
            let err = Arc::new(err);
            for (_, waiter) in waiters {
                let _ = waiter.send(Err(Arc::clone(&err)));
            }
        }
    }
}

pub struct UserBatch {
    db_pool: Pool<AsyncPgConnection>,
}

#[async_trait]
impl BatchFn<DbId, User> for UserBatch {
    async fn fetch(&self, keys: &[DbId]) -> anyhow::Result<HashMap<DbId, User>> {
        let users = User::by_ids(keys, &self.db_pool).await?;
        Ok(users
            .into_iter()
            .map(|user| (user.id.clone(), user))
            .collect())
    }
}

pub struct VoteBatch {
    db_pool: Pool<AsyncPgConnection>,
}

#[async_trait]
impl BatchFn<(DbId, DbId), i32> for VoteBatch {
    async fn fetch(&self, keys: &[(DbId, DbId)]) -> anyhow::Result<HashMap<(DbId, DbId), i32>> {
        let updoots = Updoot::by_keys(keys, &self.db_pool).await?;

        // The store query matches a superset of the requested pairs; keep
        // only the exact keys this batch asked for.
        let mut by_key: HashMap<(DbId, DbId), i32> = updoots
            .into_iter()
            .map(|updoot| ((updoot.post_id, updoot.user_id), updoot.value))
            .collect();

        Ok(keys
            .iter()
            .filter_map(|key| by_key.remove(key).map(|value| (key.clone(), value)))
            .collect())
    }
}

pub type UserLoader = Loader<DbId, User>;
pub type VoteLoader = Loader<(DbId, DbId), i32>;

#[derive(Clone)]
pub struct Loaders {
    pub users: UserLoader,
    pub votes: VoteLoader,
}

impl Loaders {
    pub fn new(db_pool: &Pool<AsyncPgConnection>) -> Self {
        Loaders {
            users: Loader::new(UserBatch {
                db_pool: db_pool.clone(),
            }),
            votes: Loader::new(VoteBatch {
                db_pool: db_pool.clone(),
            }),
        }
    }
}

/// Hands every request its own pair of loaders.
pub async fn loaders_middleware<B>(
    State(state): State<Arc<AppState>>,
    mut request: Request<B>,
    next: Next<B>,
) -> Response {
    request
        .extensions_mut()
        .insert(Loaders::new(&state.db_pool));
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::join_all;

    use super::*;

    struct CountingBatch {
        calls: Arc<AtomicUsize>,
        batches: Arc<Mutex<Vec<Vec<u32>>>>,
    }

    #[async_trait]
    impl BatchFn<u32, String> for CountingBatch {
        async fn fetch(&self, keys: &[u32]) -> anyhow::Result<HashMap<u32, String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().unwrap().push(keys.to_vec());
            Ok(keys.iter().map(|key| (*key, format!("row-{key}"))).collect())
        }
    }

    struct FailingBatch;

    #[async_trait]
    impl BatchFn<u32, String> for FailingBatch {
        async fn fetch(&self, _keys: &[u32]) -> anyhow::Result<HashMap<u32, String>> {
            Err(anyhow!("connection reset"))
        }
    }

    struct SparseBatch;

    #[async_trait]
    impl BatchFn<u32, String> for SparseBatch {
        async fn fetch(&self, keys: &[u32]) -> anyhow::Result<HashMap<u32, String>> {
            Ok(keys
                .iter()
                .filter(|key| **key % 2 == 0)
                .map(|key| (*key, format!("row-{key}")))
                .collect())
        }
    }

    #[tokio::test]
    async fn ten_concurrent_loads_issue_one_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(Mutex::new(Vec::new()));
        let loader = Loader::new(CountingBatch {
            calls: Arc::clone(&calls),
            batches: Arc::clone(&batches),
        });

        let results = join_all((0..10u32).map(|key| loader.load(key))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for (key, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap(), Some(format!("row-{key}")));
        }
    }

    #[tokio::test]
    async fn duplicate_keys_fetch_once_and_answer_everyone() {
        let calls = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(Mutex::new(Vec::new()));
        let loader = Loader::new(CountingBatch {
            calls: Arc::clone(&calls),
            batches: Arc::clone(&batches),
        });

        let keys = [3u32, 1, 3, 2, 1, 3];
        let results = join_all(keys.iter().map(|key| loader.load(*key))).await;

        // Each caller gets the value for the key it asked for, in the
        // order it asked, duplicates included.
        for (key, result) in keys.iter().zip(results) {
            assert_eq!(result.unwrap(), Some(format!("row-{key}")));
        }

        // The underlying fetch saw each key once, first-request order.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*batches.lock().unwrap(), vec![vec![3, 1, 2]]);
    }

    #[tokio::test]
    async fn absent_rows_resolve_to_none() {
        let loader = Loader::new(SparseBatch);

        let results = join_all([2u32, 5, 4].map(|key| loader.load(key))).await;
        let results: Vec<Option<String>> = results.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(
            results,
            vec![Some(String::from("row-2")), None, Some(String::from("row-4"))]
        );
    }

    #[tokio::test]
    async fn fetch_failure_reaches_every_waiter() {
        let loader = Loader::new(FailingBatch);

        let results = join_all((0..4u32).map(|key| loader.load(key))).await;

        assert_eq!(results.len(), 4);
        for result in results {
            let err = result.unwrap_err();
            assert!(err.to_string().contains("connection reset"));
        }
    }

    #[tokio::test]
    async fn loads_after_dispatch_start_a_new_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(Mutex::new(Vec::new()));
        let loader = Loader::new(CountingBatch {
            calls: Arc::clone(&calls),
            batches: Arc::clone(&batches),
        });

        assert_eq!(loader.load(1).await.unwrap(), Some(String::from("row-1")));
        assert_eq!(loader.load(2).await.unwrap(), Some(String::from("row-2")));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*batches.lock().unwrap(), vec![vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn resolved_keys_are_served_from_the_memo() {
        let calls = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(Mutex::new(Vec::new()));
        let loader = Loader::new(CountingBatch {
            calls: Arc::clone(&calls),
            batches: Arc::clone(&batches),
        });

        assert_eq!(loader.load(7).await.unwrap(), Some(String::from("row-7")));
        assert_eq!(loader.load(7).await.unwrap(), Some(String::from("row-7")));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
