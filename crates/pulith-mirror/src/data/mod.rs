pub mod config;
pub mod descriptor;
pub mod fetcher;
pub mod options;
pub mod policy;

pub use config::{MirrorGroupConfig, OrderKind};
pub use descriptor::{DEFAULT_MAX_CONNECTIONS, DetailedMirror, MirrorDescriptor, MirrorSpec};
pub use fetcher::{BoxStream, ByteStream, Fetcher};
pub use options::{FetchOptions, GrabOptions, OptionOverrides};
pub use policy::{ActionOverride, ActionPolicy, FailureCallback, FailureContext, FailureHandler};
