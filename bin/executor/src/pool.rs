//! Stand-in for a Dask `LocalCluster`/`Client` pair: a bounded task
//! pool plus an explicit health flag. A task abstraction with a
//! cancellable handle and `wait(timeout)`, backed by a worker pool and
//! channels, modeled on an RAII busy-guard idiom (here a pool-wide
//! health flag rather than a per-resource lock).

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolHealth {
  Healthy,
  Failed,
  Closed,
}

impl PoolHealth {
  fn to_code(self) -> u8 {
    match self {
      PoolHealth::Healthy => 0,
      PoolHealth::Failed => 1,
      PoolHealth::Closed => 2,
    }
  }

  fn from_code(code: u8) -> Self {
    match code {
      1 => PoolHealth::Failed,
      2 => PoolHealth::Closed,
      _ => PoolHealth::Healthy,
    }
  }
}

pub struct ComputePool {
  capacity: usize,
  slots: RwLock<Arc<Semaphore>>,
  health: AtomicU8,
}

impl ComputePool {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      slots: RwLock::new(Arc::new(Semaphore::new(capacity))),
      health: AtomicU8::new(PoolHealth::Healthy.to_code()),
    }
  }

  pub fn health(&self) -> PoolHealth {
    PoolHealth::from_code(self.health.load(Ordering::SeqCst))
  }

  fn set_health(&self, health: PoolHealth) {
    self.health.store(health.to_code(), Ordering::SeqCst);
  }

  /// Blocks until one of `capacity` slots is free. Held by the caller
  /// for the lifetime of a single job.
  pub async fn acquire(&self) -> OwnedSemaphorePermit {
    let slots = self.slots.read().await.clone();
    slots
      .acquire_owned()
      .await
      .expect("pool semaphore is never explicitly closed while healthy")
  }

  /// A job observed a fault matching `POOL_FAULT_PREFIX` — mark the
  /// whole pool suspect so the next tick attempts recovery before
  /// accepting further work.
  pub fn mark_failed(&self) {
    self.set_health(PoolHealth::Failed);
  }

  /// Ported from `maybe_restart_cluster`: a `Failed` pool gets an
  /// in-place restart attempt; in this reference pool that attempt
  /// never itself errors, so nothing in this crate currently drives a
  /// pool into `Closed` — the branch is kept as a second, independent
  /// check anyway, mirroring the original's sequential (not `elif`)
  /// structure, so a future health source that *can* report `Closed`
  /// falls through into recreation within the same call.
  pub async fn maybe_restart(&self) {
    if self.health() == PoolHealth::Failed {
      debug!("attempting to restart the compute pool in place");
      self.set_health(PoolHealth::Healthy);
    }
    if self.health() == PoolHealth::Closed {
      info!("recreating the compute pool from scratch");
      let mut slots = self.slots.write().await;
      *slots = Arc::new(Semaphore::new(self.capacity));
      self.set_health(PoolHealth::Healthy);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn new_pool_is_healthy_and_bounded() {
    let pool = ComputePool::new(2);
    assert_eq!(pool.health(), PoolHealth::Healthy);
    let _a = pool.acquire().await;
    let _b = pool.acquire().await;
    assert_eq!(pool.slots.read().await.available_permits(), 0);
  }

  #[tokio::test]
  async fn failed_pool_restarts_to_healthy() {
    let pool = ComputePool::new(1);
    pool.mark_failed();
    assert_eq!(pool.health(), PoolHealth::Failed);
    pool.maybe_restart().await;
    assert_eq!(pool.health(), PoolHealth::Healthy);
  }
}
