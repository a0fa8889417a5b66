use std::time::{Duration, Instant};

use crate::job::{Ctl, FnJob, Job};
use crate::progress::ProgressIndicator;

/// Job queueing and lifecycle management, independent of how jobs are run.
///
/// Timeouts are milliseconds where `0` means wait forever.
pub trait Worker {
    /// Queue a job. Returns false, changing nothing, when `job` is `None`.
    fn push(&mut self, job: Option<Box<dyn Job>>) -> bool;

    /// True when nothing is queued, nothing is running and every message,
    /// including the last finalize, has been delivered.
    fn is_idle(&self) -> bool;

    /// Ask the running job to stop. Cooperative; returns immediately.
    fn cancel(&self);

    /// Drop every job that has not started yet, then [`Worker::cancel`].
    /// Dropped jobs get neither `process` nor `finalize`.
    fn cancel_all(&mut self);

    /// Deliver every message that is ready without blocking. Must be called
    /// from the main thread, typically on every UI tick.
    fn process_events(&mut self) -> anyhow::Result<()>;

    /// Block, delivering messages, until the running job has been finalized.
    /// Returns `Ok(false)` on timeout.
    fn wait_for_current_job(&mut self, timeout_ms: u64) -> anyhow::Result<bool>;

    /// Block, delivering messages, until [`Worker::is_idle`] holds.
    /// Returns `Ok(false)` on timeout.
    fn wait_for_idle(&mut self, timeout_ms: u64) -> anyhow::Result<bool>;

    fn progress_indicator(&mut self) -> Option<&mut (dyn ProgressIndicator + 'static)> {
        None
    }
}

impl<W: Worker + ?Sized> Worker for Box<W> {
    fn push(&mut self, job: Option<Box<dyn Job>>) -> bool {
        (**self).push(job)
    }

    fn is_idle(&self) -> bool {
        (**self).is_idle()
    }

    fn cancel(&self) {
        (**self).cancel();
    }

    fn cancel_all(&mut self) {
        (**self).cancel_all();
    }

    fn process_events(&mut self) -> anyhow::Result<()> {
        (**self).process_events()
    }

    fn wait_for_current_job(&mut self, timeout_ms: u64) -> anyhow::Result<bool> {
        (**self).wait_for_current_job(timeout_ms)
    }

    fn wait_for_idle(&mut self, timeout_ms: u64) -> anyhow::Result<bool> {
        (**self).wait_for_idle(timeout_ms)
    }

    fn progress_indicator(&mut self) -> Option<&mut (dyn ProgressIndicator + 'static)> {
        (**self).progress_indicator()
    }
}

pub fn push_job<W, J>(worker: &mut W, job: J) -> bool
where
    W: Worker + ?Sized,
    J: Job + 'static,
{
    worker.push(Some(Box::new(job)))
}

/// Queue a job built from a single process closure.
pub fn queue_job<W, P>(worker: &mut W, process: P) -> bool
where
    W: Worker + ?Sized,
    P: FnOnce(&dyn Ctl) -> anyhow::Result<()> + Send + 'static,
{
    queue_job_with_finish(worker, process, |_, _: &mut Option<anyhow::Error>| {})
}

pub fn queue_job_with_finish<W, P, F>(worker: &mut W, process: P, finish: F) -> bool
where
    W: Worker + ?Sized,
    P: FnOnce(&dyn Ctl) -> anyhow::Result<()> + Send + 'static,
    F: FnOnce(bool, &mut Option<anyhow::Error>) + Send + 'static,
{
    push_job(worker, FnJob::new(process, finish))
}

/// Discard everything outstanding and queue `job`. Does not wait.
pub fn replace_job<W>(worker: &mut W, job: Box<dyn Job>) -> bool
where
    W: Worker + ?Sized,
{
    worker.cancel_all();
    worker.push(Some(job))
}

pub fn stop_current_job<W>(worker: &mut W, timeout_ms: u64) -> anyhow::Result<bool>
where
    W: Worker + ?Sized,
{
    worker.cancel();
    worker.wait_for_current_job(timeout_ms)
}

pub fn stop_queue<W>(worker: &mut W, timeout_ms: u64) -> anyhow::Result<bool>
where
    W: Worker + ?Sized,
{
    worker.cancel_all();
    worker.wait_for_idle(timeout_ms)
}

/// Deadline for the zero-means-forever timeout convention.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    pub(crate) fn after_ms(timeout_ms: u64) -> Self {
        Self((timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms)))
    }

    /// Remaining time in the same convention, or `None` once expired.
    pub(crate) fn remaining_ms(&self) -> Option<u64> {
        let Some(at) = self.0 else {
            return Some(0);
        };
        let left = at.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return None;
        }
        Some(u64::try_from(left.as_millis()).unwrap_or(u64::MAX).max(1))
    }
}
