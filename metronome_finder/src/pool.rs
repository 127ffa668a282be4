//! Bounded fan-out of backend requests
use std::{future::Future, sync::Arc};

use futures::future::join_all;
use tokio::sync::Semaphore;

/// Runs futures with at most `size` of them in flight at any time
///
/// Clones share their permits, so one pool bounds every fetch it is used for.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run every task to completion and return their outputs in submission order
    ///
    /// Tasks are independent: one returning an error does not cancel its siblings.
    pub async fn run_all<I, F, T>(&self, tasks: I) -> Vec<T>
    where
        I: IntoIterator<Item = F> + Send,
        F: Future<Output = T> + Send,
        T: Send,
    {
        join_all(tasks.into_iter().map(|task| {
            let permits = Arc::clone(&self.permits);
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .expect("worker pool semaphore is never closed");
                task.await
            }
        }))
        .await
    }
}
