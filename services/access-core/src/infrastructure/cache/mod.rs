//! 缓存层

mod access_cache;
mod keys;
mod local_cache;

pub use access_cache::AccessCache;
pub use keys::CacheKey;
pub use local_cache::LocalCache;
