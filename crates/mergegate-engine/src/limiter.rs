//! Per-repository concurrency limiting.
//!
//! Many workflow instances execute concurrently, bounded per repository.
//! Suspended instances (waiting on review) hold no permit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{EngineError, EngineResult};

/// Hands out execution permits, one semaphore per repository.
#[derive(Debug)]
pub struct RepoLimiter {
    cap: usize,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl RepoLimiter {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire an execution permit for a repository, waiting if the
    /// repository is at its cap.
    pub async fn acquire(&self, repository: &str) -> EngineResult<OwnedSemaphorePermit> {
        let semaphore = {
            let mut semaphores = self.semaphores.lock().unwrap();
            semaphores
                .entry(repository.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.cap)))
                .clone()
        };
        semaphore
            .acquire_owned()
            .await
            .map_err(|e| EngineError::Internal(format!("limiter semaphore closed: {e}")))
    }

    /// Available permits for a repository. Test helper.
    pub fn available(&self, repository: &str) -> usize {
        let semaphores = self.semaphores.lock().unwrap();
        semaphores
            .get(repository)
            .map_or(self.cap, |s| s.available_permits())
    }
}
