use std::path::Path;

use serde::Deserialize;

use crate::data::descriptor::MirrorSpec;
use crate::data::policy::ActionOverride;
use crate::error::{Error, Result};

/// Initial ordering of the mirror list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderKind {
    /// Healthy private mirrors first, then by estimated speed.
    #[default]
    Speed,
    /// Speed order, starting at a random position.
    RandomStart,
    /// Speed order shuffled once at construction.
    RandomOrder,
}

/// Declarative description of a mirror group.
///
/// # Examples
///
/// ```
/// use pulith_mirror::{MirrorGroupConfig, OrderKind};
///
/// let config = MirrorGroupConfig::from_toml_str(r#"
///     mirrors = ["http://a.example/pub/", { url = "http://b.example/pub/", private = true }]
///     order = "random-start"
///
///     [default_action]
///     remove_master = true
/// "#).unwrap();
///
/// assert_eq!(config.mirrors.len(), 2);
/// assert_eq!(config.order, OrderKind::RandomStart);
/// assert_eq!(config.default_action.remove_master, Some(true));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorGroupConfig {
    pub mirrors:        Vec<MirrorSpec>,
    pub order:          OrderKind,
    pub default_action: ActionOverride,
}

impl MirrorGroupConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> { Ok(toml::from_str(s)?) }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }
}
