//! Downloads handed to the tokio scheduler.

mod common;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use common::MockFetcher;
use futures_util::future::join_all;
use pulith_mirror::{
    ActionOverride, ByteStream, DEFAULT_MAX_CONNECTIONS, Error, FailureContext, FetchOptions, Fetcher, GrabOptions,
    MirrorDescriptor, MirrorGroup, SchedulerOptions, TokioScheduler, TransferError, TransferErrorKind,
};

const A: &str = "http://a.example/pub/";
const B: &str = "http://b.example/pub/";
const C: &str = "http://c.example/pub/";

fn scheduled(fetcher: Arc<dyn Fetcher>, mirrors: Vec<MirrorDescriptor>, options: SchedulerOptions) -> MirrorGroup {
    MirrorGroup::builder(fetcher)
        .mirrors(mirrors)
        .scheduler(Arc::new(TokioScheduler::new(options)))
        .build()
}

fn counter() -> (Arc<Mutex<usize>>, Arc<Mutex<usize>>) {
    let count = Arc::new(Mutex::new(0));
    (count.clone(), count)
}

#[tokio::test]
async fn test_call_callback_and_on_failure_apply() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::failing(&["http://"]));
    let (group_calls, group_sink) = counter();
    let (handler_calls, handler_sink) = counter();
    let group = MirrorGroup::builder(fetcher.clone())
        .mirrors([A, B, C])
        .failure_callback(Arc::new(move |_: &FailureContext<'_>| {
            *group_sink.lock().unwrap() += 1;
            ActionOverride::default()
        }))
        .scheduler(Arc::new(TokioScheduler::default()))
        .build();

    let grab = GrabOptions::default()
        .failure_callback(Arc::new(|_: &FailureContext<'_>| ActionOverride::default().hard_fail(true)))
        .on_failure(Arc::new(move |relative: &str, err: Error| -> pulith_mirror::Result<PathBuf> {
            assert_eq!(relative, "pkg.tar");
            *handler_sink.lock().unwrap() += 1;
            Err(err)
        }));
    let err = group
        .fetch_deferred("pkg.tar", dir.path().join("pkg.tar"), grab)
        .unwrap()
        .await
        .unwrap_err();

    assert!(matches!(&err, Error::HardFail { errors, .. } if errors.len() == 1));
    assert_eq!(fetcher.calls().len(), 1);
    assert_eq!(*group_calls.lock().unwrap(), 0);
    assert_eq!(*handler_calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_group_callback_sees_deferred_failures() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::failing(&[A]));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let group = MirrorGroup::builder(fetcher.clone())
        .mirrors([A, B])
        .failure_callback(Arc::new(move |ctx: &FailureContext<'_>| {
            sink.lock().unwrap().push((ctx.tries, ctx.url.to_string()));
            ActionOverride::default().remove_master(true)
        }))
        .scheduler(Arc::new(TokioScheduler::default()))
        .build();

    group
        .fetch_deferred("pkg.tar", dir.path().join("pkg.tar"), GrabOptions::default())
        .unwrap()
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(1, "http://a.example/pub/pkg.tar".to_string())]);
    assert_eq!(group.mirrors().mirrors.len(), 1);
}

#[tokio::test]
async fn test_on_failure_replaces_deferred_result() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::failing(&["http://"]));
    let group = scheduled(fetcher.clone(), vec![A.into(), B.into()], SchedulerOptions::default());
    let fallback = dir.path().join("cached.tar");
    let expected = fallback.clone();

    let grab = GrabOptions::default().on_failure(Arc::new(move |_: &str, err: Error| -> pulith_mirror::Result<PathBuf> {
        assert!(matches!(err, Error::NoMoreMirrors { .. }));
        Ok(fallback.clone())
    }));
    let path = group
        .fetch_deferred("pkg.tar", dir.path().join("pkg.tar"), grab)
        .unwrap()
        .await
        .unwrap();

    assert_eq!(path, expected);
}

#[tokio::test]
async fn test_advance_without_remove_keeps_mirror_eligible() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::failing(&[A, B]));
    let healer = fetcher.clone();
    let group = MirrorGroup::builder(fetcher.clone())
        .mirrors([A, B])
        .failure_callback(Arc::new(move |ctx: &FailureContext<'_>| {
            if ctx.mirror.url == B {
                healer.heal(A);
            }
            ActionOverride::default()
        }))
        .scheduler(Arc::new(TokioScheduler::default()))
        .build();

    let dest = dir.path().join("pkg.tar");
    let grab = GrabOptions::default().default_action(ActionOverride::default().remove_local(false));
    group.fetch_deferred("pkg.tar", &dest, grab).unwrap().await.unwrap();

    assert_eq!(fetcher.calls(), vec![
        "http://a.example/pub/pkg.tar",
        "http://b.example/pub/pkg.tar",
        "http://a.example/pub/pkg.tar",
    ]);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "http://a.example/pub/pkg.tar");
}

#[tokio::test]
async fn test_no_local_action_retries_same_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::failing(&[A]));
    let healer = fetcher.clone();
    let group = MirrorGroup::builder(fetcher.clone())
        .mirrors([A, B])
        .failure_callback(Arc::new(move |ctx: &FailureContext<'_>| {
            if ctx.tries == 2 {
                healer.heal(A);
            }
            ActionOverride::default().remove_local(false).advance_local(false)
        }))
        .scheduler(Arc::new(TokioScheduler::default()))
        .build();

    group
        .fetch_deferred("pkg.tar", dir.path().join("pkg.tar"), GrabOptions::default())
        .unwrap()
        .await
        .unwrap();

    assert_eq!(fetcher.calls(), vec!["http://a.example/pub/pkg.tar"; 3]);
}

#[derive(Debug, Default)]
struct Gauges {
    total:      usize,
    peak_total: usize,
    /// In-flight and peak transfers per host.
    hosts:      HashMap<String, (usize, usize)>,
}

/// Fetcher that holds every transfer open for a while and records how many overlap.
#[derive(Debug)]
struct GatedFetcher {
    gauges: Mutex<Gauges>,
    hold:   Duration,
}

impl GatedFetcher {
    fn new(hold: Duration) -> Self {
        Self {
            gauges: Mutex::new(Gauges::default()),
            hold,
        }
    }

    fn host(url: &str) -> String { url.split('/').nth(2).unwrap_or_default().to_string() }

    fn peak(&self, host: &str) -> usize { self.gauges.lock().unwrap().hosts.get(host).map_or(0, |h| h.1) }

    fn peak_total(&self) -> usize { self.gauges.lock().unwrap().peak_total }
}

#[async_trait]
impl Fetcher for GatedFetcher {
    async fn fetch_to_file(
        &self,
        url: &str,
        destination: &Path,
        _options: &FetchOptions,
    ) -> Result<PathBuf, TransferError> {
        let host = Self::host(url);
        {
            let mut gauges = self.gauges.lock().unwrap();
            gauges.total += 1;
            gauges.peak_total = gauges.peak_total.max(gauges.total);
            let entry = gauges.hosts.entry(host.clone()).or_default();
            entry.0 += 1;
            entry.1 = entry.1.max(entry.0);
        }

        tokio::time::sleep(self.hold).await;

        {
            let mut gauges = self.gauges.lock().unwrap();
            gauges.total -= 1;
            if let Some(entry) = gauges.hosts.get_mut(&host) {
                entry.0 -= 1;
            }
        }
        tokio::fs::write(destination, url.as_bytes()).await?;
        Ok(destination.to_path_buf())
    }

    async fn open_stream(&self, url: &str, _options: &FetchOptions) -> Result<ByteStream, TransferError> {
        Err(TransferError::new(TransferErrorKind::Other, format!("streaming not supported: {url}")))
    }

    async fn read_all(
        &self,
        url: &str,
        _limit: Option<usize>,
        _options: &FetchOptions,
    ) -> Result<Bytes, TransferError> {
        Err(TransferError::new(TransferErrorKind::Other, format!("reading not supported: {url}")))
    }
}

async fn run_downloads(group: &MirrorGroup, count: usize) {
    let dir = tempfile::tempdir().unwrap();
    let downloads: Vec<_> = (0..count)
        .map(|i| {
            group
                .fetch_deferred(&format!("file-{i}"), dir.path().join(format!("file-{i}")), GrabOptions::default())
                .unwrap()
        })
        .collect();

    for result in join_all(downloads).await {
        result.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_mirror_connections_are_bounded() {
    let fetcher = Arc::new(GatedFetcher::new(Duration::from_millis(50)));
    let mirror = MirrorDescriptor::new(A).max_connections(3);
    let limit = mirror.connection_limit();
    let group = scheduled(fetcher.clone(), vec![mirror], SchedulerOptions { max_concurrent: 32 });

    run_downloads(&group, 12).await;

    let peak = fetcher.peak("a.example");
    assert!(peak <= limit, "peak {peak} over limit {limit}");
    assert!(peak > 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_default_connection_limit_applies() {
    let fetcher = Arc::new(GatedFetcher::new(Duration::from_millis(50)));
    let group = scheduled(fetcher.clone(), vec![B.into()], SchedulerOptions { max_concurrent: 32 });

    run_downloads(&group, 8).await;

    let peak = fetcher.peak("b.example");
    assert!(peak <= DEFAULT_MAX_CONNECTIONS, "peak {peak} over default limit");
    assert!(peak > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_total_concurrency_is_bounded() {
    let fetcher = Arc::new(GatedFetcher::new(Duration::from_millis(50)));
    let group = scheduled(
        fetcher.clone(),
        vec![MirrorDescriptor::new(A).max_connections(10)],
        SchedulerOptions { max_concurrent: 2 },
    );

    run_downloads(&group, 10).await;

    let peak = fetcher.peak_total();
    assert!(peak <= 2, "peak {peak} over global limit");
    assert!(peak > 0);
}
