use crate::core::pool::PoolSnapshot;
use crate::data::{ActionPolicy, MirrorDescriptor, OptionOverrides};
use crate::error::ErrorLog;

/// Per-call view of the pool: private mirror list, cursor, attempt log and the
/// call's own option overrides.
///
/// Owned by exactly one fetch call. Local advance/remove only change this copy.
#[derive(Debug, Clone)]
pub struct RequestState {
    mirrors: Vec<MirrorDescriptor>,
    next:    usize,
    errors:  ErrorLog,
    tries:   usize,
    options: OptionOverrides,
}

impl RequestState {
    pub fn new(snapshot: PoolSnapshot, options: OptionOverrides) -> Self {
        let mut state = Self {
            mirrors: snapshot.mirrors,
            next:    snapshot.next,
            errors:  ErrorLog::new(),
            tries:   0,
            options,
        };
        state.clamp();
        state
    }

    fn clamp(&mut self) {
        if self.next >= self.mirrors.len() {
            self.next = 0;
        }
    }

    pub fn mirrors(&self) -> &[MirrorDescriptor] { &self.mirrors }

    pub fn cursor(&self) -> usize { self.next }

    pub fn is_exhausted(&self) -> bool { self.mirrors.is_empty() }

    pub fn options(&self) -> &OptionOverrides { &self.options }

    pub fn errors(&self) -> &ErrorLog { &self.errors }

    pub fn into_errors(self) -> ErrorLog { self.errors }

    pub fn tries(&self) -> usize { self.tries }

    /// Move the cursor to `index` (wrapped into range) and return the mirror there.
    ///
    /// Counts as the start of a new attempt.
    pub fn select(&mut self, index: usize) -> Option<&MirrorDescriptor> {
        if self.mirrors.is_empty() {
            return None;
        }
        self.next = index % self.mirrors.len();
        self.tries += 1;
        self.mirrors.get(self.next)
    }

    pub fn record_failure(&mut self, url: impl Into<String>, message: impl Into<String>) {
        self.errors.push(url, message);
    }

    /// Apply the local half of `policy` to the mirror at the cursor.
    pub fn apply_local(&mut self, policy: &ActionPolicy) {
        if self.mirrors.is_empty() {
            return;
        }
        if policy.remove_local {
            self.mirrors.remove(self.next);
        } else if policy.advance_local {
            self.next += 1;
        }
        self.clamp();
    }
}
