use std::collections::VecDeque;

use chrono::{DateTime, Local};

pub const KEY_HINTS: &str =
    "a arrange | s slice | f fail | r replace | c cancel | x stop queue | q quit";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    Canceled,
    Failed,
    Discarded,
}

impl JobStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Finished => "ok",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Discarded => "discarded",
        }
    }

    /// Not finished yet, whether started or not.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

#[derive(Clone, Debug)]
pub struct JobRecord {
    pub id: u64,
    pub label: String,
    pub status: JobStatus,
    pub last_progress: Option<i32>,
    pub last_error: Option<String>,
    pub submitted_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct JobCounts {
    pub queued: usize,
    pub running: usize,
    pub finished: usize,
    pub canceled: usize,
    pub failed: usize,
}

/// Everything the dashboard draws. Mutated only on the thread that drains
/// the worker.
#[derive(Clone, Debug)]
pub struct DashboardState {
    pub worker_name: String,
    pub percent: Option<i32>,
    pub status_text: String,
    pub busy: bool,
    pub idle: bool,
    pub status_line: String,
    pub error_popup: Option<String>,
    jobs: VecDeque<JobRecord>,
    history_limit: usize,
    next_id: u64,
}

impl DashboardState {
    pub fn new(worker_name: impl Into<String>, history_limit: usize) -> Self {
        Self {
            worker_name: worker_name.into(),
            percent: None,
            status_text: String::new(),
            busy: false,
            idle: true,
            status_line: String::from(KEY_HINTS),
            error_popup: None,
            jobs: VecDeque::new(),
            history_limit: history_limit.max(1),
            next_id: 1,
        }
    }

    pub fn jobs(&self) -> &VecDeque<JobRecord> {
        &self.jobs
    }

    pub fn job(&self, id: u64) -> Option<&JobRecord> {
        self.jobs.iter().find(|job| job.id == id)
    }

    /// Records a submitted job and returns its id.
    pub fn submit(&mut self, label: impl Into<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.push_back(JobRecord {
            id,
            label: label.into(),
            status: JobStatus::Queued,
            last_progress: None,
            last_error: None,
            submitted_at: Local::now(),
            finished_at: None,
        });
        self.idle = false;
        self.trim_history();
        id
    }

    pub fn finish(&mut self, id: u64, status: JobStatus, error: Option<String>) {
        let percent = self.percent;
        if let Some(job) = self.jobs.iter_mut().find(|job| job.id == id) {
            job.status = status;
            job.last_progress = percent.or(job.last_progress);
            job.last_error = error;
            job.finished_at = Some(Local::now());
        }
    }

    /// Marks a queued job as picked up by the worker.
    pub fn start(&mut self, id: u64) {
        if let Some(job) = self
            .jobs
            .iter_mut()
            .find(|job| job.id == id && job.status == JobStatus::Queued)
        {
            job.status = JobStatus::Running;
        }
    }

    /// Marks every job that never started as dropped without a finalize.
    /// Running jobs keep their row until their finalize arrives.
    pub fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        for job in self
            .jobs
            .iter_mut()
            .filter(|job| job.status == JobStatus::Queued)
        {
            job.status = JobStatus::Discarded;
            job.finished_at = Some(Local::now());
            discarded += 1;
        }
        discarded
    }

    pub fn set_progress(&mut self, percent: i32) {
        self.percent = Some(percent.clamp(0, 100));
        if let Some(job) = self
            .jobs
            .iter_mut()
            .find(|job| job.status == JobStatus::Running)
        {
            job.last_progress = self.percent;
        }
    }

    pub fn set_status_text(&mut self, text: &str) {
        self.status_text = text.to_string();
    }

    pub fn clear_percent(&mut self) {
        self.percent = None;
    }

    pub fn show_error(&mut self, message: impl Into<String>) {
        self.error_popup = Some(message.into());
    }

    pub fn dismiss_error(&mut self) -> bool {
        self.error_popup.take().is_some()
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_line = message.into();
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in &self.jobs {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Finished => counts.finished += 1,
                JobStatus::Canceled | JobStatus::Discarded => counts.canceled += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    fn trim_history(&mut self) {
        while self.jobs.len() > self.history_limit {
            let Some(index) = self.jobs.iter().position(|job| !job.status.is_pending()) else {
                break;
            };
            self.jobs.remove(index);
        }
    }
}
