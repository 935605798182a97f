//! Bounded pool of user metadata slots.
//!
//! Elements that want to hang their own data off a frame acquire a
//! [`UserMeta`] slot from the batch's [`UserMetaPool`], fill it with typed
//! data and register [`UserMetaOps`] callbacks:
//!
//! - `copy` runs when the carrying buffer is duplicated, producing the data
//!   for the new slot.
//! - `release` runs exactly once when the slot is reclaimed, receiving the
//!   data by value.
//!
//! Reclaiming happens when the `UserMeta` is dropped. Since the slot owns its
//! data and is not `Clone`, the release callback cannot run twice for the
//! same data.
//!
//! # Example
//!
//! ```rust
//! use parallax_msgconv::memory::UserMetaPool;
//! use parallax_msgconv::metadata::MetaType;
//!
//! let pool = UserMetaPool::new(2);
//! let mut slot = pool.acquire().expect("pool not exhausted");
//! slot.set_data(MetaType::User, Box::new(42u32), None);
//! assert_eq!(slot.data::<u32>(), Some(&42));
//! assert_eq!(pool.available(), 1);
//!
//! drop(slot);
//! assert_eq!(pool.available(), 2);
//! ```

use crate::error::{Error, Result};
use crate::metadata::MetaType;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Type-erased data stored in a user metadata slot.
pub type UserMetaData = Box<dyn Any + Send>;

/// Lifecycle callbacks for data stored in a [`UserMeta`].
pub trait UserMetaOps: Send + Sync {
    /// Produce a deep copy of `data` for a duplicated slot.
    ///
    /// Returning `None` leaves the duplicated slot empty.
    fn copy(&self, data: &UserMetaData) -> Option<UserMetaData>;

    /// Release `data` when its slot is reclaimed.
    fn release(&self, data: UserMetaData);
}

/// Statistics about pool usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total slots in the pool.
    pub capacity: usize,
    /// Currently available slots.
    pub available: usize,
    /// Currently in-use slots.
    pub in_use: usize,
    /// Total number of successful acquisitions.
    pub acquisitions: u64,
    /// Acquisitions that failed because the pool was exhausted.
    pub exhausted: u64,
}

/// Shared pool state (referenced by the pool and every slot).
struct PoolInner {
    capacity: usize,
    in_use: AtomicUsize,
    acquisitions: AtomicU64,
    exhausted: AtomicU64,
}

/// A bounded pool of [`UserMeta`] slots.
///
/// Cloning the pool is cheap and yields a handle to the same slots.
#[derive(Clone)]
pub struct UserMetaPool {
    inner: Arc<PoolInner>,
}

impl UserMetaPool {
    /// Create a pool with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                in_use: AtomicUsize::new(0),
                acquisitions: AtomicU64::new(0),
                exhausted: AtomicU64::new(0),
            }),
        }
    }

    /// Acquire an empty slot, or `None` if the pool is exhausted.
    pub fn acquire(&self) -> Option<UserMeta> {
        let inner = &self.inner;
        let acquired = inner
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < inner.capacity).then_some(n + 1)
            })
            .is_ok();

        if !acquired {
            inner.exhausted.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(capacity = inner.capacity, "user meta pool exhausted");
            return None;
        }

        inner.acquisitions.fetch_add(1, Ordering::Relaxed);
        Some(UserMeta {
            meta_type: MetaType::User,
            data: None,
            ops: None,
            pool: Arc::clone(&self.inner),
        })
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of slots currently available.
    pub fn available(&self) -> usize {
        self.inner
            .capacity
            .saturating_sub(self.inner.in_use.load(Ordering::Acquire))
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        let in_use = self.inner.in_use.load(Ordering::Acquire);
        PoolStats {
            capacity: self.inner.capacity,
            available: self.inner.capacity.saturating_sub(in_use),
            in_use,
            acquisitions: self.inner.acquisitions.load(Ordering::Relaxed),
            exhausted: self.inner.exhausted.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for UserMetaPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserMetaPool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

/// A pool-managed user metadata slot.
///
/// The slot returns to its pool when dropped, after handing its data to the
/// registered release callback.
pub struct UserMeta {
    meta_type: MetaType,
    data: Option<UserMetaData>,
    ops: Option<Arc<dyn UserMetaOps>>,
    pool: Arc<PoolInner>,
}

impl UserMeta {
    /// Store data in the slot together with its lifecycle callbacks.
    ///
    /// Data previously stored in the slot is released first.
    pub fn set_data(
        &mut self,
        meta_type: MetaType,
        data: UserMetaData,
        ops: Option<Arc<dyn UserMetaOps>>,
    ) {
        self.release_data();
        self.meta_type = meta_type;
        self.data = Some(data);
        self.ops = ops;
    }

    /// Type tag of the stored data.
    pub fn meta_type(&self) -> MetaType {
        self.meta_type
    }

    /// Whether the slot holds data.
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Borrow the stored data as `T`.
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.as_ref().and_then(|d| d.downcast_ref::<T>())
    }

    /// Copy this slot into a new slot acquired from `pool`.
    ///
    /// Data is copied through the registered `copy` callback; a slot without
    /// callbacks duplicates as an empty slot of the same type.
    pub fn duplicate(&self, pool: &UserMetaPool) -> Result<UserMeta> {
        let mut copy = pool.acquire().ok_or(Error::PoolExhausted)?;
        copy.meta_type = self.meta_type;

        if let (Some(data), Some(ops)) = (self.data.as_ref(), self.ops.as_ref()) {
            copy.data = ops.copy(data);
            copy.ops = Some(Arc::clone(ops));
        }

        Ok(copy)
    }

    fn release_data(&mut self) {
        if let Some(data) = self.data.take() {
            match self.ops.take() {
                Some(ops) => ops.release(data),
                None => drop(data),
            }
        }
    }
}

impl Drop for UserMeta {
    fn drop(&mut self) {
        self.release_data();
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for UserMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserMeta")
            .field("meta_type", &self.meta_type)
            .field("has_data", &self.data.is_some())
            .field("has_ops", &self.ops.is_some())
            .finish()
    }
}
