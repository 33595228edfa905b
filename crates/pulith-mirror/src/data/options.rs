use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::data::policy::{ActionOverride, FailureCallback, FailureHandler};

/// Transfer options handed to a [`Fetcher`](crate::Fetcher) for a single attempt.
///
/// A fetcher exposes its own defaults through [`Fetcher::options`](crate::Fetcher::options);
/// mirror and call level settings are layered on top with [`FetchOptions::derive`].
///
/// # Examples
///
/// ```
/// use pulith_mirror::{FetchOptions, OptionOverrides};
/// use std::time::Duration;
///
/// let base = FetchOptions::default().header("User-Agent", "pulith/0.1");
/// let derived = base.derive(&OptionOverrides::default().timeout(Duration::from_secs(5)));
///
/// assert_eq!(derived.timeout, Some(Duration::from_secs(5)));
/// assert_eq!(derived.headers.len(), 1);
/// assert_eq!(base.timeout, None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    /// Custom headers sent with every request.
    ///
    /// Default: empty
    pub headers: Arc<[(String, String)]>,

    /// Overall timeout of one transfer. `None` leaves it to the fetcher.
    ///
    /// Default: None
    pub timeout: Option<Duration>,

    /// Transport-level retries performed by the fetcher before it reports a failure.
    ///
    /// These happen inside a single mirror attempt; the mirror group only sees the
    /// final outcome.
    ///
    /// Default: 0
    pub max_retries: u32,

    /// Base delay between transport-level retries.
    ///
    /// Default: 100ms
    pub retry_backoff: Duration,

    /// Free-form settings understood by specific fetchers.
    pub extra: BTreeMap<String, String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            headers:       Arc::new([]),
            timeout:       None,
            max_retries:   0,
            retry_backoff: Duration::from_millis(100),
            extra:         BTreeMap::new(),
        }
    }
}

impl FetchOptions {
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut headers: Vec<_> = self.headers.iter().cloned().collect();
        headers.push((key.into(), value.into()));
        self.headers = Arc::from(headers);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    /// Build a new layered copy with `overrides` applied. `self` is left untouched.
    ///
    /// Headers with the same name (case-insensitive) are replaced, others are appended.
    pub fn derive(&self, overrides: &OptionOverrides) -> FetchOptions {
        let mut derived = self.clone();

        if !overrides.headers.is_empty() {
            let mut headers: Vec<(String, String)> = self
                .headers
                .iter()
                .filter(|(k, _)| !overrides.headers.keys().any(|o| o.eq_ignore_ascii_case(k)))
                .cloned()
                .collect();
            headers.extend(overrides.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
            derived.headers = Arc::from(headers);
        }
        if let Some(timeout) = overrides.timeout {
            derived.timeout = Some(timeout);
        }
        if let Some(max_retries) = overrides.max_retries {
            derived.max_retries = max_retries;
        }
        if let Some(retry_backoff) = overrides.retry_backoff {
            derived.retry_backoff = retry_backoff;
        }
        derived
            .extra
            .extend(overrides.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        derived
    }
}

/// Partial [`FetchOptions`]: only the fields that are set take effect.
///
/// Used both for per-mirror settings and for the options of a single call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionOverrides {
    pub headers:       BTreeMap<String, String>,
    pub timeout:       Option<Duration>,
    pub max_retries:   Option<u32>,
    pub retry_backoff: Option<Duration>,
    pub extra:         BTreeMap<String, String>,
}

impl OptionOverrides {
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool { self == &OptionOverrides::default() }
}

/// Call-level settings for one public fetch operation.
///
/// # Examples
///
/// ```
/// use pulith_mirror::{ActionOverride, GrabOptions, OptionOverrides};
///
/// let options = GrabOptions::default()
///     .options(OptionOverrides::default().header("Accept", "*/*"))
///     .default_action(ActionOverride::default().remove_master(true));
/// ```
#[derive(Clone, Default)]
pub struct GrabOptions {
    /// Transfer options with the highest precedence for this call.
    pub options: OptionOverrides,

    /// Failure policy for this call, layered over the group default.
    pub default_action: ActionOverride,

    /// Replaces the group failure callback for this call.
    pub failure_callback: Option<FailureCallback>,

    /// Intercepts the terminal error of [`MirrorGroup::fetch_to_file`](crate::MirrorGroup::fetch_to_file).
    pub on_failure: Option<FailureHandler>,
}

impl fmt::Debug for GrabOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrabOptions")
            .field("options", &self.options)
            .field("default_action", &self.default_action)
            .field("failure_callback", &self.failure_callback.as_ref().map(|_| "{ ... }"))
            .field("on_failure", &self.on_failure.as_ref().map(|_| "{ ... }"))
            .finish()
    }
}

impl GrabOptions {
    #[must_use]
    pub fn options(mut self, options: OptionOverrides) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn default_action(mut self, action: ActionOverride) -> Self {
        self.default_action = action;
        self
    }

    #[must_use]
    pub fn failure_callback(mut self, callback: FailureCallback) -> Self {
        self.failure_callback = Some(callback);
        self
    }

    #[must_use]
    pub fn on_failure(mut self, handler: FailureHandler) -> Self {
        self.on_failure = Some(handler);
        self
    }
}
