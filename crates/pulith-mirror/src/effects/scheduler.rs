//! Deferred downloads that run outside the caller's task.
//!
//! A scheduler receives the group's shared pool and must report every failed
//! attempt through [`MirrorPool::apply_failure_outcome`], exactly as the
//! synchronous failover loop does.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::core::{MirrorPool, join_url};
use crate::data::{ActionOverride, ActionPolicy, FailureCallback, FailureContext, MirrorDescriptor, OptionOverrides};
use crate::data::fetcher::Fetcher;
use crate::error::{Error, ErrorLog, Result};

/// Everything a scheduler needs to run one download against a mirror pool.
pub struct ScheduledFetch {
    pub pool:             Arc<MirrorPool>,
    /// Fetcher for mirrors without their own.
    pub fetcher:          Arc<dyn Fetcher>,
    /// Mirrors to use instead of the pool; empty means the pool.
    pub local_mirrors:    Vec<MirrorDescriptor>,
    /// Extra option overrides for this download, keyed by mirror URL.
    pub local_overrides:  BTreeMap<String, OptionOverrides>,
    /// Mirror URLs not to try.
    pub excluded:         HashSet<String>,
    pub relative_url:     String,
    pub destination:      PathBuf,
    pub options:          OptionOverrides,
    /// Group default policy with the call default already layered on top.
    pub default_action:   ActionOverride,
    /// Consulted after every failed attempt, like the group's own failover loop.
    pub failure_callback: Option<FailureCallback>,
}

impl fmt::Debug for ScheduledFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledFetch")
            .field("local_mirrors", &self.local_mirrors)
            .field("local_overrides", &self.local_overrides)
            .field("excluded", &self.excluded)
            .field("relative_url", &self.relative_url)
            .field("destination", &self.destination)
            .field("options", &self.options)
            .field("default_action", &self.default_action)
            .field("failure_callback", &self.failure_callback.as_ref().map(|_| "{ ... }"))
            .finish_non_exhaustive()
    }
}

/// Handle to a download running elsewhere. Resolves to the written path.
pub struct DeferredFetch {
    inner: Pin<Box<dyn Future<Output = Result<PathBuf>> + Send>>,
}

impl DeferredFetch {
    pub fn new(future: impl Future<Output = Result<PathBuf>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(future),
        }
    }

    pub fn ready(result: Result<PathBuf>) -> Self { Self::new(std::future::ready(result)) }

    /// Wrap a spawned task; a panicked or cancelled task becomes [`Error::Scheduler`].
    pub fn from_handle(handle: tokio::task::JoinHandle<Result<PathBuf>>) -> Self {
        Self::new(async move { handle.await.map_err(|e| Error::Scheduler(e.to_string()))? })
    }
}

impl Future for DeferredFetch {
    type Output = Result<PathBuf>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> { self.inner.as_mut().poll(cx) }
}

impl fmt::Debug for DeferredFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.debug_struct("DeferredFetch").finish_non_exhaustive() }
}

/// Runs [`ScheduledFetch`]es in the background.
pub trait AsyncScheduler: Send + Sync + fmt::Debug {
    fn schedule(&self, request: ScheduledFetch) -> DeferredFetch;
}

/// Concurrency limits for [`TokioScheduler`].
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Maximum number of downloads running at once.
    pub max_concurrent: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self { Self { max_concurrent: 4 } }
}

#[derive(Debug)]
struct SchedulerState {
    global:  Arc<Semaphore>,
    mirrors: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl SchedulerState {
    /// Per-mirror connection gate, sized by the mirror's connection limit on first use.
    fn mirror_gate(&self, mirror: &MirrorDescriptor) -> Arc<Semaphore> {
        let mut gates = self.mirrors.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            gates
                .entry(mirror.url.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(mirror.connection_limit()))),
        )
    }
}

/// Scheduler backed by the current tokio runtime.
///
/// Bounds the total number of running downloads and the connections per mirror.
/// Each failed attempt is applied to the shared pool. With `remove_local` the mirror
/// is excluded for the rest of that download and the next attempt starts from a
/// fresh pool snapshot at the master cursor. With only `advance_local` the next
/// attempt starts just past the failed mirror; with neither it is retried.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    state: Arc<SchedulerState>,
}

impl Default for TokioScheduler {
    fn default() -> Self { Self::new(SchedulerOptions::default()) }
}

impl TokioScheduler {
    pub fn new(options: SchedulerOptions) -> Self {
        Self {
            state: Arc::new(SchedulerState {
                global:  Arc::new(Semaphore::new(options.max_concurrent.max(1))),
                mirrors: Mutex::new(HashMap::new()),
            }),
        }
    }

    async fn run(state: Arc<SchedulerState>, mut request: ScheduledFetch) -> Result<PathBuf> {
        let _running = Arc::clone(&state.global)
            .acquire_owned()
            .await
            .map_err(|e| Error::Scheduler(e.to_string()))?;
        let mut errors = ErrorLog::new();
        let mut tries = 0;
        let mut after: Option<String> = None;
        let mut pinned: Option<MirrorDescriptor> = None;

        loop {
            let Some(mirror) = pinned.take().or_else(|| next_candidate(&request, after.as_deref())) else {
                warn!(relative = %request.relative_url, attempts = errors.len(), "no more mirrors to try");
                return Err(Error::NoMoreMirrors { errors });
            };

            let url = join_url(&mirror.url, &request.relative_url);
            let fetcher = mirror.fetcher.clone().unwrap_or_else(|| Arc::clone(&request.fetcher));
            let mut options = fetcher.options().derive(&mirror.overrides);
            if let Some(local) = request.local_overrides.get(&mirror.url) {
                options = options.derive(local);
            }
            let options = options.derive(&request.options);

            let outcome = {
                let _connection = state
                    .mirror_gate(&mirror)
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::Scheduler(e.to_string()))?;
                tries += 1;
                debug!(%url, tries, "deferred attempt");
                fetcher.fetch_to_file(&url, &request.destination, &options).await
            };

            let error = match outcome {
                Ok(path) => return Ok(path),
                Err(e) => e,
            };
            debug!(%url, %error, "deferred attempt failed");
            errors.push(&url, error.to_string());

            let layer = match &request.failure_callback {
                Some(cb) => cb(&FailureContext {
                    error:        &error,
                    mirror:       &mirror,
                    tries,
                    relative_url: &request.relative_url,
                    url:          &url,
                }),
                None => ActionOverride::default(),
            };
            let policy = ActionPolicy::resolve(&request.default_action, &ActionOverride::default(), &layer);

            request.pool.apply_failure_outcome(&mirror, &policy);
            if policy.remove_local {
                request.excluded.insert(mirror.url.clone());
                after = None;
            } else if policy.advance_local {
                after = Some(mirror.url.clone());
            } else {
                pinned = Some(mirror.clone());
            }

            if policy.hard_fail {
                warn!(%url, attempts = errors.len(), "deferred failure is fatal for this request");
                return Err(Error::HardFail { source: error, errors });
            }
        }
    }
}

/// First non-excluded mirror, walking the local list or the pool from its cursor.
///
/// When `after` names a mirror still in the list, the walk starts just past it.
fn next_candidate(request: &ScheduledFetch, after: Option<&str>) -> Option<MirrorDescriptor> {
    let (mirrors, start) = if request.local_mirrors.is_empty() {
        let snapshot = request.pool.snapshot();
        (snapshot.mirrors, snapshot.next)
    } else {
        (request.local_mirrors.clone(), 0)
    };
    let len = mirrors.len();
    let start = after
        .and_then(|url| mirrors.iter().position(|m| m.url == url))
        .map_or(start, |i| i + 1);

    (0..len)
        .map(|i| &mirrors[(start + i) % len])
        .find(|m| !request.excluded.contains(&m.url))
        .cloned()
}

impl AsyncScheduler for TokioScheduler {
    fn schedule(&self, request: ScheduledFetch) -> DeferredFetch {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => DeferredFetch::from_handle(handle.spawn(Self::run(Arc::clone(&self.state), request))),
            Err(e) => DeferredFetch::ready(Err(Error::Scheduler(e.to_string()))),
        }
    }
}
