//! Background generation of derived results
//!
//! A [`ThumbnailWorker`] runs generators on one background thread that
//! owns a private [`Context`]. Scripts can be shared with it; contexts
//! never are. Requests wait in a queue guarded by a mutex and a condition
//! variable. Finished results land in a cache whose entries each have
//! their own lock, and in a per-owner inbox read with
//! [`poll`](ThumbnailWorker::poll).
//!
//! A generator that panics fails its own request only. The worker then
//! replaces its context with a fresh one and carries on.

use std::collections::VecDeque;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use dashmap::DashMap;
use tracing::{debug, error, warn};

use crate::context::Context;

/// Work to run on the worker's context.
pub type Generator<R> = Box<dyn FnOnce(&mut Context) -> anyhow::Result<R> + Send>;

/// State of a cached result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Never generated
    NotMade,

    /// Up to date
    Ok,

    /// Present but stale, a new one is wanted
    Changed,
}

/// One cached result.
#[derive(Debug, Clone)]
pub struct CacheEntry<R> {
    /// Whether `value` can be trusted
    pub status: CacheStatus,

    /// The last generated result
    pub value: Option<R>,
}

impl<R> Default for CacheEntry<R> {
    fn default() -> Self {
        Self {
            status: CacheStatus::NotMade,
            value: None,
        }
    }
}

/// A completed request, delivered by `poll`.
#[derive(Debug)]
pub struct Finished<R> {
    /// Cache key of the request
    pub key: String,

    /// What the generator returned
    pub result: anyhow::Result<R>,
}

struct Request<R> {
    owner: String,
    key: String,
    generator: Generator<R>,
}

struct Queue<R> {
    requests: VecDeque<Request<R>>,

    /// Owner of the request being generated
    in_flight: Option<String>,

    stop: bool,
}

struct Shared<R> {
    queue: Mutex<Queue<R>>,

    /// Signalled when a request is queued or the worker must stop
    wake: Condvar,

    /// Signalled when a request finishes
    idle: Condvar,

    cache: DashMap<String, Arc<Mutex<CacheEntry<R>>>>,
    finished: DashMap<String, Vec<Finished<R>>>,
}

impl<R> Shared<R> {
    fn lock_queue(&self) -> MutexGuard<'_, Queue<R>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, key: &str) -> Arc<Mutex<CacheEntry<R>>> {
        self.cache
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(CacheEntry::default())))
            .clone()
    }
}

/// A background thread producing results such as thumbnails.
///
/// # Example
///
/// ```
/// use cardscript::{Context, ScriptValue, ThumbnailWorker};
///
/// let worker = ThumbnailWorker::spawn(Context::with_prelude).unwrap();
/// worker.request("list", "n", Box::new(|ctx: &mut Context| {
///     ctx.set_variable("n", ScriptValue::Int(4));
///     Ok(ctx.get_variable("n")?)
/// }));
/// worker.wait_idle();
/// let done = worker.poll("list");
/// assert_eq!(done[0].result.as_ref().unwrap(), &ScriptValue::Int(4));
/// ```
pub struct ThumbnailWorker<R> {
    shared: Arc<Shared<R>>,
    handle: Option<JoinHandle<()>>,
}

impl<R> ThumbnailWorker<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Start the worker thread. `make_context` runs on that thread, once
    /// at start and again after a generator panics.
    pub fn spawn<F>(make_context: F) -> io::Result<Self>
    where
        F: Fn() -> Context + Send + 'static,
    {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                requests: VecDeque::new(),
                in_flight: None,
                stop: false,
            }),
            wake: Condvar::new(),
            idle: Condvar::new(),
            cache: DashMap::new(),
            finished: DashMap::new(),
        });
        let worker = shared.clone();
        let handle = std::thread::Builder::new()
            .name("thumbnail-worker".to_string())
            .spawn(move || {
                run(&worker, make_context);
            })?;
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Queue a generator for `key` on behalf of `owner`.
    ///
    /// A queued request for the same key is replaced. A result already in
    /// the cache is marked [`CacheStatus::Changed`] until the new one is
    /// ready.
    pub fn request(&self, owner: &str, key: &str, generator: Generator<R>) {
        // Entry before queue, the order the worker stores results in
        let entry = self.shared.entry(key);
        let mut entry = entry.lock().unwrap_or_else(PoisonError::into_inner);
        if entry.status == CacheStatus::Ok {
            entry.status = CacheStatus::Changed;
        }
        let mut queue = self.shared.lock_queue();
        queue.requests.retain(|r| r.key != key);
        queue.requests.push_back(Request {
            owner: owner.to_string(),
            key: key.to_string(),
            generator,
        });
        debug!(owner, key, queued = queue.requests.len(), "thumbnail requested");
        drop(queue);
        drop(entry);
        self.shared.wake.notify_one();
    }

    /// Take the finished requests of `owner`, oldest first.
    pub fn poll(&self, owner: &str) -> Vec<Finished<R>> {
        self.shared
            .finished
            .remove(owner)
            .map(|(_, done)| done)
            .unwrap_or_default()
    }

    /// Drop the queued requests of `owner` and discard its finished ones.
    ///
    /// A request of `owner` being generated right now is not interrupted;
    /// this waits for it to finish. Returns the number of requests removed
    /// from the queue.
    pub fn abort(&self, owner: &str) -> usize {
        let mut queue = self.shared.lock_queue();
        let before = queue.requests.len();
        queue.requests.retain(|r| r.owner != owner);
        let removed = before - queue.requests.len();
        while queue.in_flight.as_deref() == Some(owner) {
            queue = self
                .shared
                .idle
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(queue);
        self.shared.finished.remove(owner);
        debug!(owner, removed, "thumbnail requests aborted");
        removed
    }

    /// Mark a cached result as stale.
    pub fn invalidate(&self, key: &str) {
        if let Some(entry) = self.shared.cache.get(key) {
            let mut entry = entry.lock().unwrap_or_else(PoisonError::into_inner);
            if entry.status == CacheStatus::Ok {
                entry.status = CacheStatus::Changed;
            }
        }
    }

    /// The cache entry for `key`, if anything was ever requested for it.
    pub fn cached(&self, key: &str) -> Option<CacheEntry<R>> {
        let entry = self.shared.cache.get(key)?.clone();
        let entry = entry.lock().unwrap_or_else(PoisonError::into_inner);
        Some(entry.clone())
    }

    /// Number of queued requests, not counting one in progress.
    pub fn pending(&self) -> usize {
        self.shared.lock_queue().requests.len()
    }

    /// Block until the queue is empty and nothing is being generated.
    pub fn wait_idle(&self) {
        let mut queue = self.shared.lock_queue();
        while !queue.requests.is_empty() || queue.in_flight.is_some() {
            queue = self
                .shared
                .idle
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<R> Drop for ThumbnailWorker<R> {
    fn drop(&mut self) {
        self.shared.lock_queue().stop = true;
        self.shared.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("thumbnail worker panicked");
            }
        }
    }
}

fn run<R, F>(shared: &Shared<R>, make_context: F)
where
    R: Clone,
    F: Fn() -> Context,
{
    debug!("thumbnail worker started");
    let mut ctx = make_context();
    loop {
        let request = {
            let mut queue = shared.lock_queue();
            loop {
                if queue.stop {
                    debug!("thumbnail worker stopped");
                    return;
                }
                if let Some(request) = queue.requests.pop_front() {
                    queue.in_flight = Some(request.owner.clone());
                    break request;
                }
                queue = shared
                    .wake
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        let Request {
            owner,
            key,
            generator,
        } = request;
        let result = match panic::catch_unwind(AssertUnwindSafe(|| generator(&mut ctx))) {
            Ok(result) => result,
            Err(payload) => {
                error!(owner = %owner, key = %key, "thumbnail generator panicked");
                ctx = make_context();
                Err(anyhow::anyhow!(
                    "generator panicked: {}",
                    panic_message(payload.as_ref())
                ))
            }
        };
        match &result {
            Ok(value) => {
                let entry = shared.entry(&key);
                let mut entry = entry.lock().unwrap_or_else(PoisonError::into_inner);
                let requeued = shared.lock_queue().requests.iter().any(|r| r.key == key);
                entry.status = if requeued {
                    CacheStatus::Changed
                } else {
                    CacheStatus::Ok
                };
                entry.value = Some(value.clone());
                debug!(owner = %owner, key = %key, requeued, "thumbnail generated");
            }
            Err(err) => warn!(owner = %owner, key = %key, "thumbnail failed: {err:#}"),
        }
        shared
            .finished
            .entry(owner)
            .or_default()
            .push(Finished { key, result });

        shared.lock_queue().in_flight = None;
        shared.idle.notify_all();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
