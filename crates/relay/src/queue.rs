//! Bounded drop-oldest FIFO of pending forward jobs.

use std::{collections::VecDeque, sync::Mutex};

use tokio::{sync::Notify, time::Instant};

use crate::job::ForwardJob;

/// Shared queue drained by the worker pool.
///
/// Eviction happens under the same lock as the push it accompanies, so the
/// length never exceeds the capacity.
pub struct DispatchQueue {
    jobs: Mutex<VecDeque<ForwardJob>>,
    capacity: usize,
    notify: Notify,
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ForwardJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a job, dropping the oldest one when full. Returns the dropped
    /// job.
    pub fn push(&self, job: ForwardJob) -> Option<ForwardJob> {
        let evicted = {
            let mut jobs = self.lock();
            let evicted = if jobs.len() >= self.capacity {
                jobs.pop_front()
            } else {
                None
            };
            jobs.push_back(job);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    pub fn pop(&self) -> Option<ForwardJob> {
        self.lock().pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of the head job, the one waiting longest.
    #[must_use]
    pub fn oldest(&self) -> Option<ForwardJob> {
        self.lock().front().cloned()
    }

    /// How long the head job has been waiting.
    #[must_use]
    pub fn oldest_age(&self, now: Instant) -> Option<std::time::Duration> {
        self.lock()
            .front()
            .map(|job| now.saturating_duration_since(job.enqueued_at))
    }

    /// Resolves after the next push. A push with no waiter is remembered for
    /// one future waiter.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
