//! Pluggable ordering and selection strategies.
//!
//! An [`InitialOrder`] arranges the mirror list once, when the group is built.
//! A [`MirrorSelector`] picks which entry of a call's local list to try next.
//! Neither touches the failure handling, so they compose freely.

use std::cmp::Ordering;
use std::fmt::Debug;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::core::estimate::SpeedEstimator;
use crate::core::request::RequestState;
use crate::data::{MirrorDescriptor, OrderKind};

/// Arranges the initial mirror list and chooses the initial master cursor.
pub trait InitialOrder: Send + Sync + Debug {
    /// Reorder `mirrors` in place and return the starting cursor.
    fn arrange(&self, mirrors: &mut Vec<MirrorDescriptor>, estimator: &dyn SpeedEstimator) -> usize;
}

/// Healthy private mirrors first, then by estimated speed, fastest first.
///
/// The sort is stable: mirrors with equal scores (typically all the untested
/// ones) keep the order they were given in.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedOrder;

impl InitialOrder for SpeedOrder {
    fn arrange(&self, mirrors: &mut Vec<MirrorDescriptor>, estimator: &dyn SpeedEstimator) -> usize {
        let mut scored: Vec<((bool, f64), MirrorDescriptor)> = mirrors
            .drain(..)
            .map(|m| {
                let estimate = estimator.estimate(&m.url);
                ((m.private && !estimate.recently_failed, estimate.speed), m)
            })
            .collect();

        scored.sort_by(|(a, _), (b, _)| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal))
        });

        mirrors.extend(scored.into_iter().map(|(_, m)| m));
        0
    }
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// [`SpeedOrder`], then start at a uniformly random position.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomStart {
    seed: Option<u64>,
}

impl RandomStart {
    pub fn new() -> Self { Self::default() }

    pub fn with_seed(seed: u64) -> Self { Self { seed: Some(seed) } }
}

impl InitialOrder for RandomStart {
    fn arrange(&self, mirrors: &mut Vec<MirrorDescriptor>, estimator: &dyn SpeedEstimator) -> usize {
        SpeedOrder.arrange(mirrors, estimator);
        if mirrors.is_empty() {
            return 0;
        }
        rng_from(self.seed).gen_range(0..mirrors.len())
    }
}

/// [`SpeedOrder`], then shuffle the list once.
///
/// The order is fixed from then on; failures never reshuffle it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomOrder {
    seed: Option<u64>,
}

impl RandomOrder {
    pub fn new() -> Self { Self::default() }

    pub fn with_seed(seed: u64) -> Self { Self { seed: Some(seed) } }
}

impl InitialOrder for RandomOrder {
    fn arrange(&self, mirrors: &mut Vec<MirrorDescriptor>, estimator: &dyn SpeedEstimator) -> usize {
        SpeedOrder.arrange(mirrors, estimator);
        mirrors.shuffle(&mut rng_from(self.seed));
        0
    }
}

impl OrderKind {
    pub fn strategy(self) -> Arc<dyn InitialOrder> {
        match self {
            OrderKind::Speed => Arc::new(SpeedOrder),
            OrderKind::RandomStart => Arc::new(RandomStart::new()),
            OrderKind::RandomOrder => Arc::new(RandomOrder::new()),
        }
    }
}

/// Chooses which entry of a call's local list the next attempt uses.
pub trait MirrorSelector: Send + Sync + Debug {
    /// Index into `state.mirrors()`; only called when the list is non-empty.
    fn select(&self, state: &RequestState) -> usize;
}

/// Always the entry at the local cursor.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorSelector;

impl MirrorSelector for CursorSelector {
    fn select(&self, state: &RequestState) -> usize { state.cursor() }
}

/// A uniformly random entry for every attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector;

impl MirrorSelector for RandomSelector {
    fn select(&self, state: &RequestState) -> usize { rand::thread_rng().gen_range(0..state.mirrors().len()) }
}
