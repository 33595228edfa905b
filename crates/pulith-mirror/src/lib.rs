//! Mirror failover for fetching files that exist identically on several hosts.
//!
//! A [`MirrorGroup`] owns a shared, lock-guarded list of mirrors. Every fetch call
//! takes a private copy of it, tries mirrors one after another through a
//! [`Fetcher`], and reports each failure back to the shared list according to an
//! [`ActionPolicy`]. The call ends with the fetcher's result or with exactly one
//! terminal [`Error`] carrying the log of every attempt.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Configuration, descriptors, options, failure policy and the fetcher interface
//! - [`core`] - Pool and request state, ordering strategies, URL joining
//! - [`effects`] - HTTP fetcher, the failover loop and background scheduling
//!
//! # Failure policy
//!
//! The effective policy of a failed attempt is layered per field, lowest first:
//! built-in defaults, the group default, the call default, and whatever the
//! failure callback returns.

pub mod core;
pub mod data;
pub mod effects;
mod error;

pub use self::core::{
    CursorSelector, InitialOrder, MirrorPool, MirrorSelector, NoEstimates, PoolSnapshot, RandomOrder, RandomSelector,
    RandomStart, RequestState, SpeedEstimate, SpeedEstimator, SpeedOrder, join_url,
};
pub use self::data::{
    ActionOverride, ActionPolicy, BoxStream, ByteStream, DEFAULT_MAX_CONNECTIONS, DetailedMirror, FailureCallback,
    FailureContext, FailureHandler, FetchOptions, Fetcher, GrabOptions, MirrorDescriptor, MirrorGroupConfig, MirrorSpec,
    OptionOverrides, OrderKind,
};
#[cfg(feature = "reqwest")]
pub use self::effects::ReqwestFetcher;
pub use self::effects::{
    AsyncScheduler, DeferredFetch, HostTimings, MirrorGroup, MirrorGroupBuilder, OpenedStream, ScheduledFetch,
    SchedulerOptions, TokioScheduler,
};
pub use self::error::{AttemptError, Error, ErrorLog, Result, TransferError, TransferErrorKind};
