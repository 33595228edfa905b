use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::data::options::OptionOverrides;
use crate::data::fetcher::Fetcher;

/// Concurrent connections allowed per mirror when none is configured.
pub const DEFAULT_MAX_CONNECTIONS: usize = 2;

/// One mirror: a base URL plus the settings used whenever it is tried.
///
/// Two descriptors are equal when their URL, overrides, connection limit and private
/// flag match and they use the same fetcher instance. The pool relies on this to find
/// a failed mirror again after other calls may have reshaped the list.
#[derive(Clone)]
pub struct MirrorDescriptor {
    pub url:             String,
    /// Fetcher used instead of the group fetcher for this mirror.
    pub fetcher:         Option<Arc<dyn Fetcher>>,
    pub overrides:       OptionOverrides,
    /// Connection limit hint for schedulers. `None` or `Some(0)` means the default.
    pub max_connections: Option<usize>,
    /// Private mirrors that are healthy sort ahead of everything else.
    pub private:         bool,
}

impl MirrorDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url:             url.into(),
            fetcher:         None,
            overrides:       OptionOverrides::default(),
            max_connections: None,
            private:         false,
        }
    }

    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[must_use]
    pub fn overrides(mut self, overrides: OptionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    #[must_use]
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    #[must_use]
    pub fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    pub fn connection_limit(&self) -> usize {
        match self.max_connections {
            Some(0) | None => DEFAULT_MAX_CONNECTIONS,
            Some(n) => n,
        }
    }
}

impl PartialEq for MirrorDescriptor {
    fn eq(&self, other: &Self) -> bool {
        let same_fetcher = match (&self.fetcher, &other.fetcher) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_fetcher
            && self.url == other.url
            && self.overrides == other.overrides
            && self.max_connections == other.max_connections
            && self.private == other.private
    }
}

impl Eq for MirrorDescriptor {}

impl fmt::Debug for MirrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorDescriptor")
            .field("url", &self.url)
            .field("fetcher", &self.fetcher.as_ref().map(|_| "{ ... }"))
            .field("overrides", &self.overrides)
            .field("max_connections", &self.max_connections)
            .field("private", &self.private)
            .finish()
    }
}

impl From<&str> for MirrorDescriptor {
    fn from(url: &str) -> Self { MirrorDescriptor::new(url) }
}

impl From<String> for MirrorDescriptor {
    fn from(url: String) -> Self { MirrorDescriptor::new(url) }
}

/// Mirror entry as written in configuration: a bare URL or a table.
///
/// ```toml
/// mirrors = [
///     "http://a.example/pub/",
///     { url = "http://b.example/pub/", max_connections = 4, timeout_secs = 10 },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MirrorSpec {
    Url(String),
    Detailed(DetailedMirror),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetailedMirror {
    pub url:             String,
    pub max_connections: Option<usize>,
    pub private:         bool,
    pub headers:         BTreeMap<String, String>,
    pub timeout_secs:    Option<u64>,
    pub max_retries:     Option<u32>,
    pub extra:           BTreeMap<String, String>,
}

impl From<MirrorSpec> for MirrorDescriptor {
    fn from(spec: MirrorSpec) -> Self {
        match spec {
            MirrorSpec::Url(url) => MirrorDescriptor::new(url),
            MirrorSpec::Detailed(d) => MirrorDescriptor {
                url:             d.url,
                fetcher:         None,
                overrides:       OptionOverrides {
                    headers:       d.headers,
                    timeout:       d.timeout_secs.map(Duration::from_secs),
                    max_retries:   d.max_retries,
                    retry_backoff: None,
                    extra:         d.extra,
                },
                max_connections: d.max_connections,
                private:         d.private,
            },
        }
    }
}
