//! Pure state and transformations behind mirror failover.
//!
//! Nothing in here performs I/O: the pool and request state are plain in-memory
//! structures, and the strategies only reorder or index into mirror lists.

pub mod estimate;
pub mod order;
pub mod pool;
pub mod request;
pub mod url;

pub use estimate::{NoEstimates, SpeedEstimate, SpeedEstimator};
pub use order::{CursorSelector, InitialOrder, MirrorSelector, RandomOrder, RandomSelector, RandomStart, SpeedOrder};
pub use pool::{MirrorPool, PoolSnapshot};
pub use request::RequestState;
pub use self::url::join_url;
