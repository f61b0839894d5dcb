//! Local connection scope.
//!
//! In-process calls draw from a bounded pool of permits. A call chain takes
//! one permit when it first enters the pool and every nested local call in
//! the same task reuses it, so deep chains cannot starve themselves.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use iris_core::{IrisError, IrisResult};
use tokio::sync::Semaphore;

tokio::task_local! {
    static HELD_POOLS: Vec<u64>;
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A bounded, reentrant pool of local connection permits.
///
/// # Example
///
/// ```
/// use iris_middleware::ConnectionPool;
///
/// # tokio_test::block_on(async {
/// let pool = ConnectionPool::new(1);
/// let nested = pool.clone();
///
/// let value = pool
///     .scope(async move { nested.scope(async { 42 }).await.unwrap() })
///     .await
///     .unwrap();
/// assert_eq!(value, 42);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    id: u64,
    permits: Arc<Semaphore>,
    size: usize,
}

impl ConnectionPool {
    /// Creates a pool of `size` permits (at least one).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Total number of permits.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Returns `true` if the current task already holds a permit.
    #[must_use]
    pub fn is_held(&self) -> bool {
        HELD_POOLS
            .try_with(|held| held.contains(&self.id))
            .unwrap_or(false)
    }

    /// Runs `future` holding a permit, reusing the task's permit if it
    /// already has one.
    pub async fn scope<F: Future>(&self, future: F) -> IrisResult<F::Output> {
        if self.is_held() {
            return Ok(future.await);
        }

        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| IrisError::internal_with_source("local connection pool closed", e))?;

        let mut held = HELD_POOLS.try_with(Clone::clone).unwrap_or_default();
        held.push(self.id);
        Ok(HELD_POOLS.scope(held, future).await)
    }
}
