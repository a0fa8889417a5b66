use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{JobPanic, WorkerError};
use crate::job::{Ctl, Job, MainThreadFn, MainThreadFuture};
use crate::message::{JobEntry, MainThreadCall, MessageKind, WorkerMessage};
use crate::progress::ProgressIndicator;
use crate::queue::{BlockingWait, SpscQueue};
use crate::worker::{Deadline, Worker};

pub const DEFAULT_WORKER_NAME: &str = "jobline-worker";
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 5_000;

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerOptions {
    /// Thread label, also used in log events.
    pub name: String,
    pub stack_size: Option<usize>,
    /// Upper bound for each shutdown phase when the worker is dropped.
    pub join_timeout: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            name: String::from(DEFAULT_WORKER_NAME),
            stack_size: None,
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT_MS),
        }
    }
}

impl WorkerOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }
}

/// State shared between the owning thread and the worker thread.
struct Shared {
    /// `None` is the stop sentinel.
    input: SpscQueue<Option<JobEntry>>,
    output: SpscQueue<WorkerMessage>,
    running: AtomicBool,
    canceled: AtomicBool,
}

impl Shared {
    fn cancel(&self) {
        self.canceled.store(true, AtomicOrdering::SeqCst);
    }
}

struct WorkerCtl<'a> {
    shared: &'a Shared,
}

impl Ctl for WorkerCtl<'_> {
    fn update_status(&self, progress: i32, message: &str) {
        self.shared
            .output
            .push(WorkerMessage::status(progress, message));
    }

    fn was_canceled(&self) -> bool {
        self.shared.canceled.load(AtomicOrdering::SeqCst)
    }

    fn call_on_main_thread(&self, call: MainThreadFn) -> MainThreadFuture {
        let (done, future) = MainThreadFuture::pair();
        self.shared
            .output
            .push(WorkerMessage::MainThreadCall(MainThreadCall { call, done }));
        future
    }
}

/// [`Worker`] backed by one dedicated background thread.
///
/// Jobs run strictly one at a time in push order. Messages produced by the
/// worker thread are delivered on whichever thread calls `process_events` or
/// one of the wait functions; that thread is the "main" thread.
pub struct ThreadWorker {
    name: String,
    shared: Arc<Shared>,
    progress: Option<Box<dyn ProgressIndicator>>,
    thread: Option<thread::JoinHandle<()>>,
    join_timeout: Duration,
}

impl ThreadWorker {
    pub fn new(
        options: WorkerOptions,
        mut progress: Option<Box<dyn ProgressIndicator>>,
    ) -> Result<Self, WorkerError> {
        let shared = Arc::new(Shared {
            input: SpscQueue::new(),
            output: SpscQueue::new(),
            running: AtomicBool::new(false),
            canceled: AtomicBool::new(false),
        });

        let mut builder = thread::Builder::new().name(options.name.clone());
        if let Some(stack_size) = options.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let thread = {
            let shared = Arc::clone(&shared);
            let name = options.name.clone();
            builder
                .spawn(move || run_worker_loop(&shared, &name))
                .map_err(|source| WorkerError::Spawn {
                    name: options.name.clone(),
                    source,
                })?
        };

        if let Some(progress) = progress.as_mut() {
            let shared = Arc::clone(&shared);
            progress.set_cancel_callback(Box::new(move || shared.cancel()));
        }

        Ok(Self {
            name: options.name,
            shared,
            progress,
            thread: Some(thread),
            join_timeout: options.join_timeout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queued_len(&self) -> usize {
        self.shared.input.len()
    }

    /// Delivers at most one message. `None` for `wait` never blocks.
    fn deliver_next(
        &mut self,
        wait: Option<BlockingWait<'_>>,
    ) -> Option<(MessageKind, anyhow::Result<()>)> {
        let progress = self.progress.as_deref_mut();
        let mut delivered = None;
        let consume = |message: WorkerMessage| {
            let kind = message.kind();
            delivered = Some((kind, message.deliver(progress)));
        };
        match wait {
            Some(wait) => self.shared.output.consume_one(wait, consume),
            None => self.shared.output.try_consume_one(consume),
        };
        delivered
    }

    fn shutdown(&mut self) {
        self.cancel_all();
        let deadline = Deadline::after_ms(duration_ms(self.join_timeout));
        loop {
            let Some(remaining) = deadline.remaining_ms() else {
                break;
            };
            match self.wait_for_idle(remaining) {
                Ok(_) => break,
                Err(error) => {
                    tracing::warn!(worker = %self.name, "job failed during shutdown: {error:#}");
                }
            }
        }

        // Undelivered main-thread calls would keep their callers waiting.
        let undelivered = self.shared.output.clear();
        if !undelivered.is_empty() {
            tracing::debug!(
                worker = %self.name,
                count = undelivered.len(),
                "dropping undelivered worker messages"
            );
        }
        drop(undelivered);

        self.shared.input.push(None);
        let Some(handle) = self.thread.take() else {
            return;
        };
        let join_deadline = Instant::now() + self.join_timeout;
        while !handle.is_finished() && Instant::now() < join_deadline {
            thread::sleep(JOIN_POLL_INTERVAL);
        }
        if !handle.is_finished() {
            tracing::error!(worker = %self.name, "could not join worker thread, detaching it");
            return;
        }
        if handle.join().is_err() {
            tracing::error!(worker = %self.name, "worker thread terminated abnormally");
        }
    }
}

impl Worker for ThreadWorker {
    fn push(&mut self, job: Option<Box<dyn Job>>) -> bool {
        let Some(job) = job else {
            return false;
        };
        tracing::trace!(worker = %self.name, job = job.name(), "job queued");
        self.shared.input.push(Some(JobEntry::new(job)));
        true
    }

    fn is_idle(&self) -> bool {
        // Order matters: `running` is raised before the input entry leaves the
        // queue and lowered together with queueing the finalize message.
        self.shared.input.is_empty()
            && self
                .shared
                .output
                .is_empty_and_lowered(&self.shared.running)
    }

    fn cancel(&self) {
        self.shared.cancel();
    }

    fn cancel_all(&mut self) {
        let discarded = self.shared.input.clear();
        if !discarded.is_empty() {
            tracing::debug!(worker = %self.name, count = discarded.len(), "discarding queued jobs");
        }
        self.cancel();
    }

    fn process_events(&mut self) -> anyhow::Result<()> {
        while let Some((_, result)) = self.deliver_next(None) {
            result?;
        }
        Ok(())
    }

    fn wait_for_current_job(&mut self, timeout_ms: u64) -> anyhow::Result<bool> {
        if self.is_idle() {
            return Ok(true);
        }
        let deadline = Deadline::after_ms(timeout_ms);
        loop {
            let Some(remaining) = deadline.remaining_ms() else {
                return Ok(false);
            };
            let Some((kind, result)) = self.deliver_next(Some(BlockingWait::timeout_ms(remaining)))
            else {
                return Ok(false);
            };
            result?;
            if kind == MessageKind::Finalize {
                return Ok(true);
            }
        }
    }

    fn wait_for_idle(&mut self, timeout_ms: u64) -> anyhow::Result<bool> {
        let deadline = Deadline::after_ms(timeout_ms);
        while !self.is_idle() {
            let Some(remaining) = deadline.remaining_ms() else {
                return Ok(false);
            };
            if !self.wait_for_current_job(remaining)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn progress_indicator(&mut self) -> Option<&mut (dyn ProgressIndicator + 'static)> {
        self.progress.as_deref_mut()
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker_loop(shared: &Shared, name: &str) {
    tracing::debug!(worker = name, "worker thread started");
    let mut stop = false;
    while !stop {
        shared.input.consume_one(
            BlockingWait::forever().with_pop_flag(&shared.running),
            |entry| match entry {
                Some(entry) => run_job(shared, name, entry),
                None => {
                    shared.running.store(false, AtomicOrdering::SeqCst);
                    stop = true;
                }
            },
        );
    }
    tracing::debug!(worker = name, "worker thread stopped");
}

fn run_job(shared: &Shared, name: &str, mut entry: JobEntry) {
    shared.canceled.store(false, AtomicOrdering::SeqCst);
    let job_name = entry.job.name();
    let started = Instant::now();
    tracing::debug!(worker = name, job = job_name, "job started");

    let ctl = WorkerCtl { shared };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.job.process(&ctl)));
    entry.error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(error),
        Err(payload) => Some(JobPanic::from_payload(payload.as_ref()).into()),
    };
    entry.canceled = shared.canceled.load(AtomicOrdering::SeqCst);

    tracing::debug!(
        worker = name,
        job = job_name,
        canceled = entry.canceled,
        failed = entry.error.is_some(),
        elapsed_ms = started.elapsed().as_millis(),
        "job processed"
    );
    shared
        .output
        .push_lowering(WorkerMessage::Finalize(entry), &shared.running);
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}
