use std::collections::VecDeque;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::JobPanic;
use crate::job::{Ctl, Job, MainThreadFn, MainThreadFuture};
use crate::message::{JobEntry, WorkerMessage};
use crate::progress::ProgressIndicator;
use crate::worker::Worker;

/// Synchronous [`Worker`] that runs each job on the draining thread.
///
/// Meant as a deterministic stand-in for [`crate::ThreadWorker`] in tests.
/// Main-thread calls run immediately after the statuses queued before them,
/// so a job may wait on their futures without deadlocking.
pub struct InlineWorker {
    pending: VecDeque<Box<dyn Job>>,
    canceled: Arc<AtomicBool>,
    progress: Option<Box<dyn ProgressIndicator>>,
}

type ProgressSlot<'a> = Option<&'a mut (dyn ProgressIndicator + 'static)>;

struct InlineCtl<'a> {
    canceled: &'a AtomicBool,
    statuses: Mutex<Vec<WorkerMessage>>,
    progress: Mutex<ProgressSlot<'a>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InlineCtl<'_> {
    /// Delivers the statuses queued so far, in production order.
    fn flush(&self) {
        let statuses = mem::take(&mut *lock(&self.statuses));
        let mut progress = lock(&self.progress);
        for status in statuses {
            // Only finalize messages carry errors.
            let _ = status.deliver(progress.as_deref_mut());
        }
    }
}

impl Ctl for InlineCtl<'_> {
    fn update_status(&self, progress: i32, message: &str) {
        lock(&self.statuses).push(WorkerMessage::status(progress, message));
    }

    fn was_canceled(&self) -> bool {
        self.canceled.load(AtomicOrdering::SeqCst)
    }

    fn call_on_main_thread(&self, call: MainThreadFn) -> MainThreadFuture {
        self.flush();
        call();
        MainThreadFuture::ready()
    }
}

impl InlineWorker {
    pub fn new(mut progress: Option<Box<dyn ProgressIndicator>>) -> Self {
        let canceled = Arc::new(AtomicBool::new(false));
        if let Some(progress) = progress.as_mut() {
            let canceled = Arc::clone(&canceled);
            progress.set_cancel_callback(Box::new(move || {
                canceled.store(true, AtomicOrdering::SeqCst);
            }));
        }
        Self {
            pending: VecDeque::new(),
            canceled,
            progress,
        }
    }

    /// Runs the next queued job to completion. `None` when nothing is queued.
    fn run_next(&mut self) -> Option<anyhow::Result<()>> {
        let job = self.pending.pop_front()?;
        self.canceled.store(false, AtomicOrdering::SeqCst);

        let mut entry = JobEntry::new(job);
        let ctl = InlineCtl {
            canceled: &self.canceled,
            statuses: Mutex::new(Vec::new()),
            progress: Mutex::new(self.progress.as_deref_mut()),
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.job.process(&ctl)));
        entry.error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(error),
            Err(payload) => Some(JobPanic::from_payload(payload.as_ref()).into()),
        };
        entry.canceled = self.canceled.load(AtomicOrdering::SeqCst);

        ctl.flush();
        drop(ctl);
        Some(WorkerMessage::Finalize(entry).deliver(self.progress.as_deref_mut()))
    }
}

impl Worker for InlineWorker {
    fn push(&mut self, job: Option<Box<dyn Job>>) -> bool {
        match job {
            Some(job) => {
                self.pending.push_back(job);
                true
            }
            None => false,
        }
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    fn cancel(&self) {
        self.canceled.store(true, AtomicOrdering::SeqCst);
    }

    fn cancel_all(&mut self) {
        self.pending.clear();
        self.cancel();
    }

    fn process_events(&mut self) -> anyhow::Result<()> {
        while let Some(result) = self.run_next() {
            result?;
        }
        Ok(())
    }

    fn wait_for_current_job(&mut self, _timeout_ms: u64) -> anyhow::Result<bool> {
        if let Some(result) = self.run_next() {
            result?;
        }
        Ok(true)
    }

    fn wait_for_idle(&mut self, _timeout_ms: u64) -> anyhow::Result<bool> {
        self.process_events()?;
        Ok(true)
    }

    fn progress_indicator(&mut self) -> Option<&mut (dyn ProgressIndicator + 'static)> {
        self.progress.as_deref_mut()
    }
}
