use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::WorkerError;

/// Work scheduled onto the main thread by a running job.
pub type MainThreadFn = Box<dyn FnOnce() + Send + 'static>;

/// A unit of background work with two phases.
///
/// `process` runs on the worker thread. `finalize` runs on the main thread
/// exactly once after `process` returned, failed or panicked. A job discarded
/// from the queue before it started sees neither call, so cleanup that must
/// always happen belongs in `Drop`.
pub trait Job: Send {
    fn process(&mut self, ctl: &dyn Ctl) -> anyhow::Result<()>;

    /// `error` holds whatever `process` failed with. Taking it marks the
    /// failure as handled; anything left in it is returned to the caller that
    /// drained the finalize message.
    fn finalize(&mut self, canceled: bool, error: &mut Option<anyhow::Error>) {
        let _ = (canceled, error);
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<J: Job + ?Sized> Job for Box<J> {
    fn process(&mut self, ctl: &dyn Ctl) -> anyhow::Result<()> {
        (**self).process(ctl)
    }

    fn finalize(&mut self, canceled: bool, error: &mut Option<anyhow::Error>) {
        (**self).finalize(canceled, error);
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Capabilities a job may use while `process` runs.
///
/// Shared by reference, so helper threads spawned inside `process` (for
/// example with `std::thread::scope`) may poll and report through it too.
pub trait Ctl: Sync {
    /// Queue a status update for the main thread. A negative `progress`
    /// clears the percentage display.
    fn update_status(&self, progress: i32, message: &str);

    /// Cooperative cancellation check; long loops should poll this.
    fn was_canceled(&self) -> bool;

    /// Run `f` on the main thread during its next drain. The returned future
    /// resolves once `f` has executed.
    fn call_on_main_thread(&self, f: MainThreadFn) -> MainThreadFuture;
}

/// Completion handle for [`Ctl::call_on_main_thread`].
pub struct MainThreadFuture {
    rx: oneshot::Receiver<()>,
    outcome: Option<bool>,
}

impl MainThreadFuture {
    pub fn pair() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx, outcome: None })
    }

    pub fn ready() -> Self {
        let (tx, future) = Self::pair();
        let _ = tx.send(());
        future
    }

    /// Block the calling thread until the main thread ran the call. Must not
    /// be used from the main thread itself, which would never drain it.
    pub fn wait(self) -> Result<(), WorkerError> {
        let ran = match self.outcome {
            Some(ran) => ran,
            None => self.rx.blocking_recv().is_ok(),
        };
        outcome_result(ran)
    }

    /// Non-blocking check; true once the call ran or can no longer run.
    pub fn is_ready(&mut self) -> bool {
        if self.outcome.is_none() {
            self.outcome = match self.rx.try_recv() {
                Ok(()) => Some(true),
                Err(oneshot::error::TryRecvError::Closed) => Some(false),
                Err(oneshot::error::TryRecvError::Empty) => None,
            };
        }
        self.outcome.is_some()
    }
}

fn outcome_result(ran: bool) -> Result<(), WorkerError> {
    if ran {
        Ok(())
    } else {
        Err(WorkerError::MainThreadCallDropped)
    }
}

impl Future for MainThreadFuture {
    type Output = Result<(), WorkerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(ran) = self.outcome {
            return Poll::Ready(outcome_result(ran));
        }
        let ran = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(result) => result.is_ok(),
            Poll::Pending => return Poll::Pending,
        };
        self.outcome = Some(ran);
        Poll::Ready(outcome_result(ran))
    }
}

impl fmt::Debug for MainThreadFuture {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("MainThreadFuture").finish_non_exhaustive()
    }
}

/// Job assembled from a process closure and a finalize closure.
pub struct FnJob<P, F> {
    process: Option<P>,
    finish: Option<F>,
}

impl<P, F> FnJob<P, F>
where
    P: FnOnce(&dyn Ctl) -> anyhow::Result<()> + Send,
    F: FnOnce(bool, &mut Option<anyhow::Error>) + Send,
{
    pub fn new(process: P, finish: F) -> Self {
        Self {
            process: Some(process),
            finish: Some(finish),
        }
    }
}

impl<P, F> Job for FnJob<P, F>
where
    P: FnOnce(&dyn Ctl) -> anyhow::Result<()> + Send,
    F: FnOnce(bool, &mut Option<anyhow::Error>) + Send,
{
    fn process(&mut self, ctl: &dyn Ctl) -> anyhow::Result<()> {
        match self.process.take() {
            Some(process) => process(ctl),
            None => Ok(()),
        }
    }

    fn finalize(&mut self, canceled: bool, error: &mut Option<anyhow::Error>) {
        if let Some(finish) = self.finish.take() {
            finish(canceled, error);
        }
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<P>()
    }
}
