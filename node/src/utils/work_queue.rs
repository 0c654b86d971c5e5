//! Queue for self-expanding, finite work.
//!
//! The trie syncer discovers new jobs (child nodes) while processing existing
//! ones, so a plain channel cannot tell the workers when everything is done:
//! an empty queue may just mean another worker is about to push more jobs.
//! This queue tracks in-progress jobs and reports exhaustion only once the
//! queue is empty *and* nothing is in flight.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use tokio::sync::Notify;

/// Multi-producer, multi-consumer async job queue with an end condition.
///
/// Workers loop on [`WorkQueue::next_job`]; a returned [`JobHandle`] counts as
/// in-progress until dropped, so a worker must push any newly discovered jobs
/// *before* dropping the handle, or the queue may report completion early.
#[derive(Debug, Default)]
pub struct WorkQueue<T> {
    /// Jobs not yet handed to a worker.
    jobs: Mutex<VecDeque<T>>,
    /// Jobs handed out through `next_job` whose handle is still alive.
    in_progress: AtomicUsize,
    /// Wakes workers parked in `next_job`.
    notify: Notify,
}

impl<T> WorkQueue<T> {
    /// Pops a job from the queue.
    ///
    /// Waits while the queue is empty but other jobs are still in progress,
    /// since those may push new jobs.  Returns `None` once the queue is empty
    /// and nothing is in flight: all work is finished.
    pub async fn next_job(self: &Arc<Self>) -> Option<JobHandle<T>> {
        loop {
            let waiting;
            {
                let mut jobs = self.jobs.lock().expect("lock poisoned");
                match jobs.pop_front() {
                    Some(job) => {
                        self.in_progress.fetch_add(1, Ordering::SeqCst);
                        return Some(JobHandle {
                            job,
                            queue: self.clone(),
                        });
                    }
                    None => {
                        if self.in_progress.load(Ordering::SeqCst) == 0 {
                            return None;
                        }
                        waiting = self.notify.notified();
                    }
                }
            }

            // Wait outside the lock for a push or a completion.
            waiting.await;
        }
    }

    /// Pushes a job onto the queue, waking a parked worker if there is one.
    pub fn push_job(&self, job: T) {
        let mut jobs = self.jobs.lock().expect("lock poisoned");
        jobs.push_back(job);
        self.notify.notify_waiters();
    }

    /// Returns the number of queued (not yet handed out) jobs.
    pub fn num_jobs(&self) -> usize {
        self.jobs.lock().expect("lock poisoned").len()
    }

    /// Marks a handed-out job as finished.
    ///
    /// Takes the lock so that a concurrent `push_job` cannot interleave with
    /// the completion check of what looks like the final job.
    fn complete_job(&self) {
        let _jobs = self.jobs.lock().expect("lock poisoned");
        self.in_progress.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

/// A job popped from the queue; counts as in-progress until dropped.
#[derive(Debug)]
pub struct JobHandle<T> {
    job: T,
    queue: Arc<WorkQueue<T>>,
}

impl<T> JobHandle<T> {
    /// Returns a reference to the job itself.
    pub fn inner(&self) -> &T {
        &self.job
    }
}

impl<T> Drop for JobHandle<T> {
    fn drop(&mut self) {
        self.queue.complete_job()
    }
}
