//! uas-adapter-redis - Redis 缓存适配器

mod cache;
mod connection;

pub use cache::RedisCache;
pub use connection::connect;
