use crate::error::IngestError;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Bounded pool for CPU-bound work (text extraction, embedding).
///
/// Each admitted job holds one permit until its closure returns, even if
/// the caller stops awaiting it, so `shutdown` only completes once every
/// job that was started has finished.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn run<F, T>(&self, job: F) -> Result<T, IngestError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| IngestError::WorkerPool("pool is shut down".to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|error| IngestError::WorkerPool(error.to_string()))
    }

    /// Waits for in-flight jobs, then refuses further admissions.
    pub async fn shutdown(self) {
        let workers = u32::try_from(self.workers).unwrap_or(u32::MAX);
        if let Ok(all) = self.permits.acquire_many(workers).await {
            all.forget();
        }
        self.permits.close();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.permits.close();
    }
}
