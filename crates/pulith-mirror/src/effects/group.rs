//! The mirror group: public fetch operations and the failover loop behind them.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::core::{
    CursorSelector, InitialOrder, MirrorPool, MirrorSelector, NoEstimates, PoolSnapshot, RequestState, SpeedEstimator,
    SpeedOrder, join_url,
};
use crate::data::{
    ActionOverride, ActionPolicy, FailureCallback, FailureContext, FetchOptions, GrabOptions, MirrorDescriptor,
    MirrorGroupConfig,
};
use crate::data::fetcher::{ByteStream, Fetcher};
use crate::effects::scheduler::{AsyncScheduler, DeferredFetch, ScheduledFetch};
use crate::error::{Error, Result, TransferError};

/// One of the fetcher operations a public call funnels through the failover loop.
#[async_trait]
trait Capability: Send + Sync {
    type Output: Send;

    async fn invoke(&self, fetcher: &dyn Fetcher, url: &str, options: &FetchOptions) -> Result<Self::Output, TransferError>;
}

struct ToFile<'a>(&'a Path);

#[async_trait]
impl Capability for ToFile<'_> {
    type Output = PathBuf;

    async fn invoke(&self, fetcher: &dyn Fetcher, url: &str, options: &FetchOptions) -> Result<PathBuf, TransferError> {
        fetcher.fetch_to_file(url, self.0, options).await
    }
}

struct OpenStream;

#[async_trait]
impl Capability for OpenStream {
    type Output = ByteStream;

    async fn invoke(&self, fetcher: &dyn Fetcher, url: &str, options: &FetchOptions) -> Result<ByteStream, TransferError> {
        fetcher.open_stream(url, options).await
    }
}

struct ReadAll(Option<usize>);

#[async_trait]
impl Capability for ReadAll {
    type Output = Bytes;

    async fn invoke(&self, fetcher: &dyn Fetcher, url: &str, options: &FetchOptions) -> Result<Bytes, TransferError> {
        fetcher.read_all(url, self.0, options).await
    }
}

/// Successful attempt: the fetcher's output plus the mirror that produced it.
struct Served<T> {
    output: T,
    mirror: MirrorDescriptor,
    url:    String,
}

/// Body of a successfully opened transfer and where it came from.
///
/// Failures while consuming `stream` happen outside the group's view; report them
/// with [`MirrorGroup::force_advance`] and `mirror`.
pub struct OpenedStream {
    pub mirror: MirrorDescriptor,
    pub url:    String,
    pub stream: ByteStream,
}

impl OpenedStream {
    pub fn into_inner(self) -> ByteStream { self.stream }
}

impl fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedStream")
            .field("mirror", &self.mirror)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Routes fetches of relative paths across a pool of interchangeable mirrors.
///
/// Each call works on its own copy of the pool, tries mirrors until one succeeds,
/// and reports every failure back to the shared pool according to the effective
/// [`ActionPolicy`].
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> pulith_mirror::Result<()> {
/// use std::sync::Arc;
/// use pulith_mirror::{GrabOptions, MirrorGroup, ReqwestFetcher};
///
/// let group = MirrorGroup::builder(Arc::new(ReqwestFetcher::new()?))
///     .mirror("http://foo.example/some/directory/")
///     .mirror("http://bar.example/maybe/somewhere/else/")
///     .build();
///
/// let path = group.fetch_to_file("relative/path.zip", "/tmp/path.zip", GrabOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
pub struct MirrorGroup {
    fetcher:          Arc<dyn Fetcher>,
    pool:             Arc<MirrorPool>,
    selector:         Arc<dyn MirrorSelector>,
    failure_callback: Option<FailureCallback>,
    default_action:   ActionOverride,
    scheduler:        Option<Arc<dyn AsyncScheduler>>,
}

impl fmt::Debug for MirrorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorGroup")
            .field("pool", &self.pool)
            .field("selector", &self.selector)
            .field("failure_callback", &self.failure_callback.as_ref().map(|_| "{ ... }"))
            .field("default_action", &self.default_action)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl MirrorGroup {
    pub fn builder(fetcher: Arc<dyn Fetcher>) -> MirrorGroupBuilder { MirrorGroupBuilder::new(fetcher) }

    /// Build a group with the default ordering from a plain list of mirrors.
    pub fn new<I, M>(fetcher: Arc<dyn Fetcher>, mirrors: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MirrorDescriptor>,
    {
        Self::builder(fetcher).mirrors(mirrors).build()
    }

    pub fn from_config(fetcher: Arc<dyn Fetcher>, config: MirrorGroupConfig) -> Self {
        Self::builder(fetcher)
            .mirrors(config.mirrors)
            .order(config.order.strategy())
            .default_action(config.default_action)
            .build()
    }

    /// The shared pool, for schedulers and other code that mutates it directly.
    pub fn pool(&self) -> &Arc<MirrorPool> { &self.pool }

    pub fn mirrors(&self) -> PoolSnapshot { self.pool.snapshot() }

    /// Download `relative` from the first mirror that serves it.
    ///
    /// A terminal error goes to [`GrabOptions::on_failure`] when one is set.
    pub async fn fetch_to_file(
        &self,
        relative: &str,
        destination: impl AsRef<Path>,
        grab: GrabOptions,
    ) -> Result<PathBuf> {
        match self.mirror_try(relative, &ToFile(destination.as_ref()), &grab).await {
            Ok(served) => Ok(served.output),
            Err(e) => match &grab.on_failure {
                Some(handler) => handler(relative, e),
                None => Err(e),
            },
        }
    }

    /// Open `relative` on the first mirror that accepts it.
    pub async fn open_stream(&self, relative: &str, grab: GrabOptions) -> Result<OpenedStream> {
        let served = self.mirror_try(relative, &OpenStream, &grab).await?;
        Ok(OpenedStream {
            mirror: served.mirror,
            url:    served.url,
            stream: served.output,
        })
    }

    /// Read `relative` completely, failing an attempt whose body exceeds `limit` bytes.
    pub async fn read_all(&self, relative: &str, limit: Option<usize>, grab: GrabOptions) -> Result<Bytes> {
        Ok(self.mirror_try(relative, &ReadAll(limit), &grab).await?.output)
    }

    /// Hand the download to the configured [`AsyncScheduler`] instead of running it here.
    ///
    /// The scheduler works against the same shared pool and applies failures to it
    /// with [`MirrorPool::apply_failure_outcome`]. The failure callback and
    /// [`GrabOptions::on_failure`] apply as they do for [`fetch_to_file`](Self::fetch_to_file).
    pub fn fetch_deferred(
        &self,
        relative: &str,
        destination: impl Into<PathBuf>,
        grab: GrabOptions,
    ) -> Result<DeferredFetch> {
        let scheduler = self
            .scheduler
            .as_ref()
            .ok_or_else(|| Error::Config("no async scheduler configured".into()))?;

        let GrabOptions {
            options,
            default_action,
            failure_callback,
            on_failure,
        } = grab;
        let deferred = scheduler.schedule(ScheduledFetch {
            pool:             Arc::clone(&self.pool),
            fetcher:          Arc::clone(&self.fetcher),
            local_mirrors:    Vec::new(),
            local_overrides:  BTreeMap::new(),
            excluded:         HashSet::new(),
            relative_url:     relative.to_string(),
            destination:      destination.into(),
            options,
            default_action:   self.default_action.overlay(&default_action),
            failure_callback: failure_callback.or_else(|| self.failure_callback.clone()),
        });

        let Some(handler) = on_failure else {
            return Ok(deferred);
        };
        let relative = relative.to_string();
        Ok(DeferredFetch::new(async move {
            match deferred.await {
                Ok(path) => Ok(path),
                Err(e) => handler(&relative, e),
            }
        }))
    }

    /// Report a failure the group could not see, such as a stream breaking mid-read.
    ///
    /// Applies the master half of the policy (group default overlaid with `action`)
    /// to `mirror` and returns the policy used.
    pub fn force_advance(&self, mirror: &MirrorDescriptor, action: Option<ActionOverride>) -> ActionPolicy {
        let policy = ActionPolicy::resolve(
            &self.default_action,
            &action.unwrap_or_default(),
            &ActionOverride::default(),
        );
        self.pool.apply_failure_outcome(mirror, &policy);
        debug!(mirror = %mirror.url, ?policy, "forced advance");
        policy
    }

    async fn mirror_try<C: Capability>(&self, relative: &str, capability: &C, grab: &GrabOptions) -> Result<Served<C::Output>> {
        let mut state = RequestState::new(self.pool.snapshot(), grab.options.clone());
        let callback = grab.failure_callback.as_ref().or(self.failure_callback.as_ref());

        loop {
            let selected = if state.is_exhausted() {
                None
            } else {
                let index = self.selector.select(&state);
                state.select(index).cloned()
            };
            let Some(mirror) = selected else {
                warn!(relative, attempts = state.errors().len(), "no more mirrors to try");
                return Err(Error::NoMoreMirrors {
                    errors: state.into_errors(),
                });
            };

            let url = join_url(&mirror.url, relative);
            let fetcher = mirror.fetcher.as_deref().unwrap_or(self.fetcher.as_ref());
            let options = fetcher.options().derive(&mirror.overrides).derive(state.options());

            debug!(relative, %url, tries = state.tries(), "trying mirror");
            let error = match capability.invoke(fetcher, &url, &options).await {
                Ok(output) => return Ok(Served { output, mirror, url }),
                Err(e) => e,
            };
            debug!(%url, %error, "mirror failed");
            state.record_failure(&url, error.to_string());

            let layer = match callback {
                Some(cb) => cb(&FailureContext {
                    error:        &error,
                    mirror:       &mirror,
                    tries:        state.tries(),
                    relative_url: relative,
                    url:          &url,
                }),
                None => ActionOverride::default(),
            };
            let policy = ActionPolicy::resolve(&self.default_action, &grab.default_action, &layer);

            self.pool.apply_failure_outcome(&mirror, &policy);
            state.apply_local(&policy);
            debug!(
                local = ?state.mirrors().iter().map(|m| m.url.as_str()).collect::<Vec<_>>(),
                local_next = state.cursor(),
                master_next = self.pool.cursor(),
                "failure applied"
            );

            if policy.hard_fail {
                warn!(%url, attempts = state.errors().len(), "mirror failure is fatal for this request");
                return Err(Error::HardFail {
                    source: error,
                    errors: state.into_errors(),
                });
            }
        }
    }
}

/// Consuming builder for [`MirrorGroup`].
pub struct MirrorGroupBuilder {
    fetcher:          Arc<dyn Fetcher>,
    mirrors:          Vec<MirrorDescriptor>,
    order:            Arc<dyn InitialOrder>,
    selector:         Arc<dyn MirrorSelector>,
    estimator:        Arc<dyn SpeedEstimator>,
    failure_callback: Option<FailureCallback>,
    default_action:   ActionOverride,
    scheduler:        Option<Arc<dyn AsyncScheduler>>,
}

impl MirrorGroupBuilder {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            mirrors: Vec::new(),
            order: Arc::new(SpeedOrder),
            selector: Arc::new(CursorSelector),
            estimator: Arc::new(NoEstimates),
            failure_callback: None,
            default_action: ActionOverride::default(),
            scheduler: None,
        }
    }

    #[must_use]
    pub fn mirror(mut self, mirror: impl Into<MirrorDescriptor>) -> Self {
        self.mirrors.push(mirror.into());
        self
    }

    #[must_use]
    pub fn mirrors<I, M>(mut self, mirrors: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MirrorDescriptor>,
    {
        self.mirrors.extend(mirrors.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn order(mut self, order: Arc<dyn InitialOrder>) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn selector(mut self, selector: Arc<dyn MirrorSelector>) -> Self {
        self.selector = selector;
        self
    }

    #[must_use]
    pub fn estimator(mut self, estimator: Arc<dyn SpeedEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    #[must_use]
    pub fn failure_callback(mut self, callback: FailureCallback) -> Self {
        self.failure_callback = Some(callback);
        self
    }

    #[must_use]
    pub fn default_action(mut self, action: ActionOverride) -> Self {
        self.default_action = action;
        self
    }

    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn AsyncScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self) -> MirrorGroup {
        let mut mirrors = self.mirrors;
        let next = self.order.arrange(&mut mirrors, self.estimator.as_ref());
        debug!(
            mirrors = ?mirrors.iter().map(|m| m.url.as_str()).collect::<Vec<_>>(),
            next,
            order = ?self.order,
            "mirror group built"
        );

        MirrorGroup {
            fetcher:          self.fetcher,
            pool:             Arc::new(MirrorPool::new(mirrors, next)),
            selector:         self.selector,
            failure_callback: self.failure_callback,
            default_action:   self.default_action,
            scheduler:        self.scheduler,
        }
    }
}
