//! Bounded in-memory cache used by [`CachingToggleMap`](crate::CachingToggleMap), configured by a
//! declarative [`CacheSpec`].
mod bounded;
mod spec;

pub use bounded::BoundedCache;
pub use spec::CacheSpec;
