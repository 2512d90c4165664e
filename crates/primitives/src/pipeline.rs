//! Bounded-parallelism work dispatch.
//!
//! Every item is turned into a future up front and waits on a semaphore permit, so a worker
//! that finishes hands its slot straight to the next queued item. Results come back in input
//! order; a failing item yields `None` and never affects its siblings.

use std::{fmt::Display, future::Future, sync::Arc};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::warn;

/// Which upstream endpoint an item was dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    /// The primary endpoint (even item indices).
    Primary,
    /// The alternate endpoint (odd item indices).
    Alternate,
}

impl Lane {
    /// Deterministic assignment of item `index`.
    pub const fn for_index(index: usize) -> Self {
        if index % 2 == 0 { Self::Primary } else { Self::Alternate }
    }
}

/// Run `worker` over `items` with at most `max_concurrency` invocations in flight.
pub async fn process<T, R, E, F, Fut>(
    items: Vec<T>,
    worker: F,
    max_concurrency: usize,
) -> Vec<Option<R>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Display,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let tasks = items.into_iter().enumerate().map(|(index, item)| {
        let semaphore = Arc::clone(&semaphore);
        let fut = worker(item);
        async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return None;
            };
            match fut.await {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(index, error = %e, "pipeline item failed");
                    None
                }
            }
        }
    });
    join_all(tasks).await
}

/// Two upstream clients sharing one concurrency budget.
#[derive(Debug)]
pub struct MultiProvider<P: ?Sized> {
    primary: Arc<P>,
    alternate: Arc<P>,
    primary_slots: usize,
    alternate_slots: usize,
    budget: usize,
}

impl<P: ?Sized> Clone for MultiProvider<P> {
    fn clone(&self) -> Self {
        Self {
            primary: Arc::clone(&self.primary),
            alternate: Arc::clone(&self.alternate),
            primary_slots: self.primary_slots,
            alternate_slots: self.alternate_slots,
            budget: self.budget,
        }
    }
}

impl<P: ?Sized> MultiProvider<P> {
    /// Split `max_concurrency` between `primary` (rounded up) and `alternate`.
    pub fn new(primary: Arc<P>, alternate: Arc<P>, max_concurrency: usize) -> Self {
        let primary_slots = max_concurrency.div_ceil(2).max(1);
        let alternate_slots = (max_concurrency / 2).max(1);
        let budget = max_concurrency.max(1);
        Self { primary, alternate, primary_slots, alternate_slots, budget }
    }

    /// Use the same client on both lanes.
    pub fn single(client: Arc<P>, max_concurrency: usize) -> Self {
        Self::new(Arc::clone(&client), client, max_concurrency)
    }

    /// The client serving `lane`.
    pub fn client(&self, lane: Lane) -> Arc<P> {
        match lane {
            Lane::Primary => Arc::clone(&self.primary),
            Lane::Alternate => Arc::clone(&self.alternate),
        }
    }

    /// The primary client.
    pub fn primary(&self) -> Arc<P> {
        Arc::clone(&self.primary)
    }

    /// Whether both lanes are served by the same client.
    pub fn is_single(&self) -> bool {
        Arc::ptr_eq(&self.primary, &self.alternate)
    }

    /// Concurrency slots per lane as `(primary, alternate)`.
    pub const fn slots(&self) -> (usize, usize) {
        (self.primary_slots, self.alternate_slots)
    }

    /// Like [`process`], but item `i` runs against lane `i % 2` under that lane's own
    /// semaphore, so a stalled endpoint cannot starve the other one. When both lanes share
    /// one client, they also share a single semaphore of the whole budget.
    pub async fn process<T, R, E, F, Fut>(&self, items: Vec<T>, worker: F) -> Vec<Option<R>>
    where
        F: Fn(Arc<P>, T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: Display,
    {
        let (primary_sem, alternate_sem) = if self.is_single() {
            let shared = Arc::new(Semaphore::new(self.budget));
            (Arc::clone(&shared), shared)
        } else {
            (
                Arc::new(Semaphore::new(self.primary_slots)),
                Arc::new(Semaphore::new(self.alternate_slots)),
            )
        };

        let tasks = items.into_iter().enumerate().map(|(index, item)| {
            let lane = Lane::for_index(index);
            let semaphore = match lane {
                Lane::Primary => Arc::clone(&primary_sem),
                Lane::Alternate => Arc::clone(&alternate_sem),
            };
            let fut = worker(self.client(lane), item);
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return None;
                };
                match fut.await {
                    Ok(result) => Some(result),
                    Err(e) => {
                        warn!(index, ?lane, error = %e, "pipeline item failed");
                        None
                    }
                }
            }
        });
        join_all(tasks).await
    }
}
