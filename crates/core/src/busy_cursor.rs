use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::job::{Ctl, Job};

/// Main-thread busy indicator, toggled from the worker through
/// [`Ctl::call_on_main_thread`].
pub trait BusyCursor: Send + Sync {
    fn begin_busy(&self);

    fn end_busy(&self);
}

/// Shows the busy cursor for as long as it lives.
///
/// Both transitions are scheduled on the main thread without waiting. The
/// revert on drop never panics; a failure to schedule it is logged.
pub struct CursorSetter<'a> {
    ctl: &'a dyn Ctl,
    cursor: Arc<dyn BusyCursor>,
}

impl<'a> CursorSetter<'a> {
    pub fn new(ctl: &'a dyn Ctl, cursor: Arc<dyn BusyCursor>) -> Self {
        let begin = Arc::clone(&cursor);
        let _ = ctl.call_on_main_thread(Box::new(move || begin.begin_busy()));
        Self { ctl, cursor }
    }
}

impl Drop for CursorSetter<'_> {
    fn drop(&mut self) {
        let end = Arc::clone(&self.cursor);
        let ctl = self.ctl;
        let scheduled = panic::catch_unwind(AssertUnwindSafe(move || {
            let _ = ctl.call_on_main_thread(Box::new(move || end.end_busy()));
        }));
        if scheduled.is_err() {
            tracing::error!("can't revert cursor from busy to normal");
        }
    }
}

/// Wraps a job so the busy cursor is shown while it processes.
pub struct BusyCursored<J> {
    job: J,
    cursor: Arc<dyn BusyCursor>,
}

impl<J: Job> BusyCursored<J> {
    pub fn new(job: J, cursor: Arc<dyn BusyCursor>) -> Self {
        Self { job, cursor }
    }

    pub fn into_inner(self) -> J {
        self.job
    }
}

impl<J: Job> Job for BusyCursored<J> {
    fn process(&mut self, ctl: &dyn Ctl) -> anyhow::Result<()> {
        let _cursor = CursorSetter::new(ctl, Arc::clone(&self.cursor));
        self.job.process(ctl)
    }

    fn finalize(&mut self, canceled: bool, error: &mut Option<anyhow::Error>) {
        self.job.finalize(canceled, error);
    }

    fn name(&self) -> &'static str {
        self.job.name()
    }
}
