//! OAuth token caching with pluggable storage and refresh.

mod cache;
pub(crate) mod clock;
mod file;
mod record;
mod storage;

pub use cache::{Cache, DEFAULT_EXPIRY_SKEW_SECS};
pub use clock::{Clock, SystemClock};
pub use file::FileStorage;
pub use record::{Record, BEARER};
pub use storage::{MemoryStorage, Storage};
