use std::fmt::Debug;

/// Estimated health of one mirror, consulted when the initial order is built.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeedEstimate {
    /// Throughput estimate; larger is faster. 0 for untested mirrors.
    pub speed:           f64,
    pub recently_failed: bool,
}

/// Source of [`SpeedEstimate`]s, keyed by mirror URL.
pub trait SpeedEstimator: Send + Sync + Debug {
    fn estimate(&self, url: &str) -> SpeedEstimate;
}

/// Treats every mirror as untested.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEstimates;

impl SpeedEstimator for NoEstimates {
    fn estimate(&self, _url: &str) -> SpeedEstimate { SpeedEstimate::default() }
}
