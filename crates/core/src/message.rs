use std::fmt;

use tokio::sync::oneshot;

use crate::job::{Job, MainThreadFn};
use crate::progress::ProgressIndicator;

/// A pushed job together with the outcome recorded when it stopped running.
pub struct JobEntry {
    pub job: Box<dyn Job>,
    pub canceled: bool,
    pub error: Option<anyhow::Error>,
}

impl JobEntry {
    pub fn new(job: Box<dyn Job>) -> Self {
        Self {
            job,
            canceled: false,
            error: None,
        }
    }
}

impl fmt::Debug for JobEntry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("JobEntry")
            .field("job", &self.job.name())
            .field("canceled", &self.canceled)
            .field("error", &self.error)
            .finish()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusInfo {
    pub progress: i32,
    pub message: String,
}

pub struct MainThreadCall {
    pub call: MainThreadFn,
    pub done: oneshot::Sender<()>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageKind {
    Empty,
    Status,
    Finalize,
    MainThreadCall,
}

/// Worker to main thread traffic on the output queue.
pub enum WorkerMessage {
    Empty,
    Status(StatusInfo),
    Finalize(JobEntry),
    MainThreadCall(MainThreadCall),
}

impl WorkerMessage {
    pub fn status(progress: i32, message: impl Into<String>) -> Self {
        Self::Status(StatusInfo {
            progress,
            message: message.into(),
        })
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Empty => MessageKind::Empty,
            Self::Status(_) => MessageKind::Status,
            Self::Finalize(_) => MessageKind::Finalize,
            Self::MainThreadCall(_) => MessageKind::MainThreadCall,
        }
    }

    /// Handles the message on the main thread. A job error that `finalize`
    /// left in place comes back as `Err`, after `finalize` ran.
    pub fn deliver(
        self,
        progress: Option<&mut (dyn ProgressIndicator + 'static)>,
    ) -> anyhow::Result<()> {
        match self {
            Self::Empty => Ok(()),
            Self::Status(info) => {
                if let Some(progress) = progress {
                    if info.progress < 0 {
                        progress.clear_percent();
                    } else {
                        progress.set_progress(info.progress);
                    }
                    progress.set_status_text(&info.message);
                }
                Ok(())
            }
            Self::Finalize(mut entry) => {
                entry.job.finalize(entry.canceled, &mut entry.error);
                match entry.error.take() {
                    Some(error) => {
                        tracing::debug!(
                            job = entry.job.name(),
                            "job error left unhandled by finalize"
                        );
                        Err(error)
                    }
                    None => Ok(()),
                }
            }
            Self::MainThreadCall(MainThreadCall { call, done }) => {
                call();
                let _ = done.send(());
                Ok(())
            }
        }
    }
}

impl fmt::Debug for WorkerMessage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => formatter.write_str("Empty"),
            Self::Status(info) => formatter.debug_tuple("Status").field(info).finish(),
            Self::Finalize(entry) => formatter.debug_tuple("Finalize").field(entry).finish(),
            Self::MainThreadCall(_) => formatter.write_str("MainThreadCall"),
        }
    }
}
