//! Memory management for frame metadata.
//!
//! - [`UserMetaPool`]: Bounded pool of user metadata slots
//! - [`UserMeta`]: RAII slot that releases its data and returns to the pool on drop
//! - [`UserMetaOps`]: Copy/release callbacks registered with a slot's data

mod meta_pool;

pub use meta_pool::{PoolStats, UserMeta, UserMetaData, UserMetaOps, UserMetaPool};
