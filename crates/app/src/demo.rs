use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, anyhow};
use jobline_core::{BusyCursor, BusyCursored, Ctl, DemoSettings, Job, Worker, replace_job};
use jobline_ui::JobStatus;

use crate::dashboard::{SharedDashboard, lock};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum DemoKind {
    Arrange,
    Slice,
    Fail,
}

impl DemoKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Arrange => "arrange",
            Self::Slice => "slice",
            Self::Fail => "fail",
        }
    }
}

/// Simulated plater job. Reports progress in `steps` increments and stops
/// early when canceled.
pub(crate) struct DemoJob {
    kind: DemoKind,
    id: u64,
    dashboard: SharedDashboard,
    steps: u32,
    step_delay: Duration,
}

impl DemoJob {
    fn new(kind: DemoKind, id: u64, dashboard: SharedDashboard, settings: &DemoSettings) -> Self {
        Self {
            kind,
            id,
            dashboard,
            steps: settings.steps.max(1),
            step_delay: Duration::from_millis(settings.step_delay_ms),
        }
    }

    fn percent(&self, step: u32) -> i32 {
        (u64::from(step) * 100 / u64::from(self.steps)) as i32
    }

    /// Moves the dashboard row to running. Queued behind earlier messages, so
    /// the job does not wait for it.
    fn mark_started(&self, ctl: &dyn Ctl) {
        let dashboard = Arc::clone(&self.dashboard);
        let id = self.id;
        drop(ctl.call_on_main_thread(Box::new(move || lock(&dashboard).start(id))));
    }

    /// Returns false once the job was canceled.
    fn run_steps(&self, ctl: &dyn Ctl, verb: &str) -> bool {
        for step in 1..=self.steps {
            if ctl.was_canceled() {
                return false;
            }
            thread::sleep(self.step_delay);
            ctl.update_status(
                self.percent(step),
                &format!("{verb} {step}/{}", self.steps),
            );
        }
        !ctl.was_canceled()
    }

    fn arrange(&self, ctl: &dyn Ctl) -> anyhow::Result<()> {
        ctl.update_status(0, "Arranging objects");
        if !self.run_steps(ctl, "Arranging object") {
            ctl.update_status(-1, "Arranging canceled");
            return Ok(());
        }
        let dashboard = Arc::clone(&self.dashboard);
        ctl.call_on_main_thread(Box::new(move || {
            lock(&dashboard).set_status("Arrangement applied to plate");
        }))
        .wait()
        .context("arrangement could not be applied")?;
        ctl.update_status(100, "Arranging done");
        Ok(())
    }

    fn slice(&self, ctl: &dyn Ctl) -> anyhow::Result<()> {
        ctl.update_status(-1, "Preparing slicing");
        if !self.run_steps(ctl, "Slicing layer") {
            ctl.update_status(-1, "Slicing canceled");
            return Ok(());
        }
        let layers = self.steps;
        let dashboard = Arc::clone(&self.dashboard);
        ctl.call_on_main_thread(Box::new(move || {
            lock(&dashboard).set_status(format!("Sliced {layers} layers"));
        }))
        .wait()?;
        ctl.update_status(100, "Slicing done");
        Ok(())
    }

    fn fail(&self, ctl: &dyn Ctl) -> anyhow::Result<()> {
        let failing_step = (self.steps / 2).max(1);
        for step in 1..=failing_step {
            if ctl.was_canceled() {
                return Ok(());
            }
            thread::sleep(self.step_delay);
            ctl.update_status(self.percent(step), &format!("Checking layer {step}"));
        }
        Err(anyhow!("layer {failing_step} has no printable region"))
            .context("slicing validation failed")
    }
}

impl Job for DemoJob {
    fn process(&mut self, ctl: &dyn Ctl) -> anyhow::Result<()> {
        self.mark_started(ctl);
        match self.kind {
            DemoKind::Arrange => self.arrange(ctl),
            DemoKind::Slice => self.slice(ctl),
            DemoKind::Fail => self.fail(ctl),
        }
    }

    fn finalize(&mut self, canceled: bool, error: &mut Option<anyhow::Error>) {
        let status = if error.is_some() {
            JobStatus::Failed
        } else if canceled {
            JobStatus::Canceled
        } else {
            JobStatus::Finished
        };
        let message = error.as_ref().map(|error| format!("{error:#}"));
        lock(&self.dashboard).finish(self.id, status, message);
    }

    fn name(&self) -> &'static str {
        self.kind.label()
    }
}

/// Builds the job for `kind` and records it in the dashboard. Arranging
/// shows the busy marker while it runs.
pub(crate) fn build_job(
    kind: DemoKind,
    dashboard: &SharedDashboard,
    cursor: &Arc<dyn BusyCursor>,
    settings: &DemoSettings,
) -> (u64, Box<dyn Job>) {
    let id = lock(dashboard).submit(kind.label());
    let job = DemoJob::new(kind, id, Arc::clone(dashboard), settings);
    let job: Box<dyn Job> = match kind {
        DemoKind::Arrange => Box::new(BusyCursored::new(job, Arc::clone(cursor))),
        DemoKind::Slice | DemoKind::Fail => Box::new(job),
    };
    (id, job)
}

pub(crate) fn submit<W: Worker + ?Sized>(
    worker: &mut W,
    kind: DemoKind,
    dashboard: &SharedDashboard,
    cursor: &Arc<dyn BusyCursor>,
    settings: &DemoSettings,
) {
    let (id, job) = build_job(kind, dashboard, cursor, settings);
    if worker.push(Some(job)) {
        tracing::debug!(job = kind.label(), id, "job queued");
    } else {
        reject(dashboard, id, kind);
    }
}

/// Drops everything queued and starts `kind` in its place.
pub(crate) fn replace<W: Worker + ?Sized>(
    worker: &mut W,
    kind: DemoKind,
    dashboard: &SharedDashboard,
    cursor: &Arc<dyn BusyCursor>,
    settings: &DemoSettings,
) {
    let discarded = lock(dashboard).discard_pending();
    let (id, job) = build_job(kind, dashboard, cursor, settings);
    if replace_job(worker, job) {
        tracing::info!(job = kind.label(), discarded, "queue replaced");
    } else {
        reject(dashboard, id, kind);
    }
}

fn reject(dashboard: &SharedDashboard, id: u64, kind: DemoKind) {
    tracing::warn!(job = kind.label(), id, "worker rejected job");
    lock(dashboard).finish(id, JobStatus::Failed, Some(String::from("worker rejected job")));
}
