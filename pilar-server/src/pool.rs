// Bounded pool for CPU-bound inference work

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Runs blocking jobs on tokio's blocking threads, at most `max_concurrent`
/// at a time, each bounded by `timeout` (queueing included)
#[derive(Debug, Clone)]
pub struct InferencePool {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Duration,
}

impl InferencePool {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout,
        }
    }

    /// Run `job` under a permit.
    ///
    /// On timeout the caller stops waiting, but the permit stays with the job
    /// until it actually finishes, so a stuck image keeps occupying its slot.
    pub async fn run<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let work = async move {
            let permit = semaphore.acquire_owned().await.map_err(|_| PoolError::Closed)?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            })
            .await
            .map_err(|e| PoolError::Failed(e.to_string()))
        };

        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| PoolError::Timeout(self.timeout))?
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.max_concurrent.saturating_sub(self.available())
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug)]
pub enum PoolError {
    Timeout(Duration),
    Closed,
    /// The job panicked or was cancelled
    Failed(String),
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::Timeout(after) => write!(f, "Inference pool timeout after {:?}", after),
            PoolError::Closed => write!(f, "Inference pool closed"),
            PoolError::Failed(reason) => write!(f, "Inference job failed: {}", reason),
        }
    }
}

impl std::error::Error for PoolError {}
