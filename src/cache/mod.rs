//! The artifact caching engine: flat-directory file store, per-key
//! single-flight locks, and the download pipeline.

pub mod pipeline;
pub mod single_flight;
pub mod store;

pub use self::single_flight::DownloadLocks;
pub use self::store::CacheStore;
