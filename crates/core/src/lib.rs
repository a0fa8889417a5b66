#![forbid(unsafe_code)]

//! Single background thread job engine with main-thread message delivery.
//!
//! A [`Job`] is processed on the worker thread and finalized on the thread
//! that drains the [`Worker`], usually a UI event loop calling
//! [`Worker::process_events`] on every tick.

pub mod busy_cursor;
pub mod error;
pub mod inline_worker;
pub mod job;
pub mod message;
pub mod progress;
pub mod queue;
pub mod settings;
pub mod settings_io;
pub mod thread_worker;
pub mod ui_worker;
pub mod worker;

pub use busy_cursor::{BusyCursor, BusyCursored, CursorSetter};
pub use error::{JobPanic, WorkerError};
pub use inline_worker::InlineWorker;
pub use job::{Ctl, FnJob, Job, MainThreadFn, MainThreadFuture};
pub use message::{JobEntry, MessageKind, StatusInfo, WorkerMessage};
pub use progress::{CancelCallback, ProgressIndicator};
pub use queue::{BlockingWait, SpscQueue};
pub use settings::{DemoSettings, Settings, UiSettings, WorkerSettings};
pub use settings_io::{load_settings, save_settings, settings_path};
pub use thread_worker::{DEFAULT_JOIN_TIMEOUT_MS, DEFAULT_WORKER_NAME, ThreadWorker, WorkerOptions};
pub use ui_worker::{UiHooks, UiWorker};
pub use worker::{
    Worker, push_job, queue_job, queue_job_with_finish, replace_job, stop_current_job, stop_queue,
};
