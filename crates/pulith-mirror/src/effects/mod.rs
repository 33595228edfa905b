//! I/O edge of mirror failover: the HTTP fetcher, the group that drives
//! fetchers, and background scheduling.

pub mod group;
mod http;
pub mod scheduler;
pub mod timings;

pub use group::{MirrorGroup, MirrorGroupBuilder, OpenedStream};
#[cfg(feature = "reqwest")]
pub use http::ReqwestFetcher;
pub use scheduler::{AsyncScheduler, DeferredFetch, ScheduledFetch, SchedulerOptions, TokioScheduler};
pub use timings::{DEFAULT_FAILURE_WINDOW, HostTimings};
