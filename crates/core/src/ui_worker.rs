use std::sync::Arc;
use std::time::Instant;

use crate::busy_cursor::{BusyCursor, CursorSetter};
use crate::job::{Ctl, Job, MainThreadFn, MainThreadFuture};
use crate::progress::ProgressIndicator;
use crate::worker::Worker;

/// Hooks into the UI event loop that owns a [`UiWorker`].
pub trait UiHooks: Send + Sync {
    /// Ask the event loop for a prompt idle pass. Called from the worker
    /// thread whenever a message was queued for the main thread.
    fn wake_up_idle(&self);

    /// Show `message` to the user. Called on the main thread.
    fn show_error(&self, message: &str);

    /// Cursor toggled while any wrapped job processes.
    fn busy_cursor(&self) -> Option<Arc<dyn BusyCursor>> {
        None
    }
}

/// Adapts a [`Worker`] to a UI event loop.
///
/// Every pushed job is wrapped so that the event loop wakes up for each
/// message, durations are logged, and any error left unhandled by the job's
/// `finalize` is shown to the user and then consumed. The event loop must
/// still call [`Worker::process_events`] on every idle pass.
pub struct UiWorker<W> {
    inner: W,
    hooks: Arc<dyn UiHooks>,
}

impl<W: Worker> UiWorker<W> {
    pub fn new(inner: W, hooks: Arc<dyn UiHooks>) -> Self {
        Self { inner, hooks }
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl<W: Worker> Worker for UiWorker<W> {
    fn push(&mut self, job: Option<Box<dyn Job>>) -> bool {
        let job = job.map(|job| {
            Box::new(UiJob {
                job,
                hooks: Arc::clone(&self.hooks),
                process_ms: 0,
            }) as Box<dyn Job>
        });
        self.inner.push(job)
    }

    fn is_idle(&self) -> bool {
        self.inner.is_idle()
    }

    fn cancel(&self) {
        self.inner.cancel();
    }

    fn cancel_all(&mut self) {
        self.inner.cancel_all();
    }

    fn process_events(&mut self) -> anyhow::Result<()> {
        self.inner.process_events()
    }

    fn wait_for_current_job(&mut self, timeout_ms: u64) -> anyhow::Result<bool> {
        self.inner.wait_for_current_job(timeout_ms)
    }

    fn wait_for_idle(&mut self, timeout_ms: u64) -> anyhow::Result<bool> {
        self.inner.wait_for_idle(timeout_ms)
    }

    fn progress_indicator(&mut self) -> Option<&mut (dyn ProgressIndicator + 'static)> {
        self.inner.progress_indicator()
    }
}

struct UiJob {
    job: Box<dyn Job>,
    hooks: Arc<dyn UiHooks>,
    process_ms: u128,
}

/// Stores the elapsed time when dropped, so a panicking `process` is timed too.
struct ProcessTimer<'a> {
    started: Instant,
    elapsed_ms: &'a mut u128,
}

impl<'a> ProcessTimer<'a> {
    fn start(elapsed_ms: &'a mut u128) -> Self {
        Self {
            started: Instant::now(),
            elapsed_ms,
        }
    }
}

impl Drop for ProcessTimer<'_> {
    fn drop(&mut self) {
        *self.elapsed_ms = self.started.elapsed().as_millis();
    }
}

struct WakeUpCtl<'a> {
    ctl: &'a dyn Ctl,
    hooks: &'a dyn UiHooks,
}

impl Ctl for WakeUpCtl<'_> {
    fn update_status(&self, progress: i32, message: &str) {
        self.ctl.update_status(progress, message);
        self.hooks.wake_up_idle();
    }

    fn was_canceled(&self) -> bool {
        self.ctl.was_canceled()
    }

    fn call_on_main_thread(&self, call: MainThreadFn) -> MainThreadFuture {
        let future = self.ctl.call_on_main_thread(call);
        self.hooks.wake_up_idle();
        future
    }
}

impl Job for UiJob {
    fn process(&mut self, ctl: &dyn Ctl) -> anyhow::Result<()> {
        let ctl = WakeUpCtl {
            ctl,
            hooks: self.hooks.as_ref(),
        };
        let _cursor = self
            .hooks
            .busy_cursor()
            .map(|cursor| CursorSetter::new(&ctl, cursor));

        let _timer = ProcessTimer::start(&mut self.process_ms);
        self.job.process(&ctl)
    }

    fn finalize(&mut self, canceled: bool, error: &mut Option<anyhow::Error>) {
        let started = Instant::now();
        self.job.finalize(canceled, error);
        let finalize_ms = started.elapsed().as_millis();

        tracing::info!(
            job = self.job.name(),
            canceled,
            process_ms = self.process_ms,
            finalize_ms,
            total_ms = self.process_ms + finalize_ms,
            "job finished"
        );

        if let Some(error) = error.take() {
            let message = format!("An unexpected error occurred: {error:#}");
            tracing::warn!(job = self.job.name(), "{message}");
            self.hooks.show_error(&message);
        }
    }

    fn name(&self) -> &'static str {
        self.job.name()
    }
}
