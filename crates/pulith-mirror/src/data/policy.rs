use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::data::descriptor::MirrorDescriptor;
use crate::error::{Error, Result, TransferError};

/// How to react to one failed attempt.
///
/// The `local` flags act on the mirror list of the current call only, the `master`
/// flags on the list shared by every call of the group. Advancing means "use the
/// next mirror", removing means "never use this mirror again" within that scope.
/// `hard_fail` aborts the current call immediately with [`Error::HardFail`].
///
/// With both local flags disabled the same mirror is retried until a callback
/// decides otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionPolicy {
    pub advance_local:  bool,
    pub advance_master: bool,
    pub remove_local:   bool,
    pub remove_master:  bool,
    pub hard_fail:      bool,
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self {
            advance_local:  true,
            advance_master: true,
            remove_local:   true,
            remove_master:  false,
            hard_fail:      false,
        }
    }
}

impl ActionPolicy {
    /// Apply the fields `layer` sets; unset fields keep their current value.
    #[must_use]
    pub fn merge(self, layer: &ActionOverride) -> ActionPolicy {
        ActionPolicy {
            advance_local:  layer.advance_local.unwrap_or(self.advance_local),
            advance_master: layer.advance_master.unwrap_or(self.advance_master),
            remove_local:   layer.remove_local.unwrap_or(self.remove_local),
            remove_master:  layer.remove_master.unwrap_or(self.remove_master),
            hard_fail:      layer.hard_fail.unwrap_or(self.hard_fail),
        }
    }

    /// Resolve the effective policy from its three layers, lowest precedence first:
    /// group default, call default, failure callback. Built-in defaults sit below all three.
    pub fn resolve(group: &ActionOverride, call: &ActionOverride, callback: &ActionOverride) -> ActionPolicy {
        ActionPolicy::default().merge(group).merge(call).merge(callback)
    }
}

/// Partial [`ActionPolicy`]. `None` falls through to the next lower layer.
///
/// # Examples
///
/// ```
/// use pulith_mirror::{ActionOverride, ActionPolicy};
///
/// let group = ActionOverride::default().hard_fail(false);
/// let call = ActionOverride::default().hard_fail(true).advance_local(false);
/// let callback = ActionOverride::default().hard_fail(false);
///
/// let policy = ActionPolicy::resolve(&group, &call, &callback);
/// assert!(!policy.hard_fail);
/// assert!(!policy.advance_local);
/// assert!(policy.remove_local);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActionOverride {
    pub advance_local:  Option<bool>,
    pub advance_master: Option<bool>,
    pub remove_local:   Option<bool>,
    pub remove_master:  Option<bool>,
    pub hard_fail:      Option<bool>,
}

impl ActionOverride {
    #[must_use]
    pub fn advance_local(mut self, value: bool) -> Self {
        self.advance_local = Some(value);
        self
    }

    #[must_use]
    pub fn advance_master(mut self, value: bool) -> Self {
        self.advance_master = Some(value);
        self
    }

    #[must_use]
    pub fn remove_local(mut self, value: bool) -> Self {
        self.remove_local = Some(value);
        self
    }

    #[must_use]
    pub fn remove_master(mut self, value: bool) -> Self {
        self.remove_master = Some(value);
        self
    }

    #[must_use]
    pub fn hard_fail(mut self, value: bool) -> Self {
        self.hard_fail = Some(value);
        self
    }

    /// Layer `higher` over `self`, keeping the fields `higher` leaves unset.
    #[must_use]
    pub fn overlay(self, higher: &ActionOverride) -> ActionOverride {
        ActionOverride {
            advance_local:  higher.advance_local.or(self.advance_local),
            advance_master: higher.advance_master.or(self.advance_master),
            remove_local:   higher.remove_local.or(self.remove_local),
            remove_master:  higher.remove_master.or(self.remove_master),
            hard_fail:      higher.hard_fail.or(self.hard_fail),
        }
    }
}

impl From<ActionPolicy> for ActionOverride {
    fn from(policy: ActionPolicy) -> Self {
        ActionOverride {
            advance_local:  Some(policy.advance_local),
            advance_master: Some(policy.advance_master),
            remove_local:   Some(policy.remove_local),
            remove_master:  Some(policy.remove_master),
            hard_fail:      Some(policy.hard_fail),
        }
    }
}

/// What a failure callback gets to see about one failed attempt.
///
/// Built fresh for every failure and only borrowed for the duration of the call.
#[derive(Debug)]
pub struct FailureContext<'a> {
    pub error:        &'a TransferError,
    pub mirror:       &'a MirrorDescriptor,
    /// Attempts made so far by this call, including the failed one.
    pub tries:        usize,
    pub relative_url: &'a str,
    pub url:          &'a str,
}

/// Decision hook consulted after every failed attempt.
///
/// Runs outside the pool lock, so it may call back into the group.
pub type FailureCallback = Arc<dyn Fn(&FailureContext<'_>) -> ActionOverride + Send + Sync>;

/// Top-level handler for the terminal error of a fetch-to-file call.
///
/// Receives the relative URL and the terminal error; whatever it returns becomes the
/// result of the call.
pub type FailureHandler = Arc<dyn Fn(&str, Error) -> Result<PathBuf> + Send + Sync>;
