/// Invoked on the main thread when the user asks to cancel the running job.
pub type CancelCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Main-thread sink for job progress.
///
/// Every method is called from the thread that drains the worker, never from
/// the worker thread.
pub trait ProgressIndicator: Send {
    fn set_progress(&mut self, percent: i32);

    fn set_status_text(&mut self, text: &str);

    fn set_cancel_callback(&mut self, callback: CancelCallback);

    fn clear_percent(&mut self);

    fn show_error_info(&mut self, message: &str, code: i32, description: &str);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub(crate) enum ProgressCall {
        Progress(i32),
        Status(String),
        ClearPercent,
        Error(String, i32),
    }

    /// Records every call so tests can inspect delivery order.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingProgress {
        pub(crate) calls: Arc<Mutex<Vec<ProgressCall>>>,
        pub(crate) cancel: Arc<Mutex<Option<CancelCallback>>>,
    }

    impl RecordingProgress {
        pub(crate) fn calls(&self) -> Vec<ProgressCall> {
            self.calls.lock().expect("progress log should lock").clone()
        }

        pub(crate) fn request_cancel(&self) {
            if let Some(callback) = self
                .cancel
                .lock()
                .expect("cancel slot should lock")
                .as_ref()
            {
                callback();
            }
        }
    }

    impl ProgressIndicator for RecordingProgress {
        fn set_progress(&mut self, percent: i32) {
            self.calls
                .lock()
                .expect("progress log should lock")
                .push(ProgressCall::Progress(percent));
        }

        fn set_status_text(&mut self, text: &str) {
            self.calls
                .lock()
                .expect("progress log should lock")
                .push(ProgressCall::Status(text.to_string()));
        }

        fn set_cancel_callback(&mut self, callback: CancelCallback) {
            *self.cancel.lock().expect("cancel slot should lock") = Some(callback);
        }

        fn clear_percent(&mut self) {
            self.calls
                .lock()
                .expect("progress log should lock")
                .push(ProgressCall::ClearPercent);
        }

        fn show_error_info(&mut self, message: &str, code: i32, _description: &str) {
            self.calls
                .lock()
                .expect("progress log should lock")
                .push(ProgressCall::Error(message.to_string(), code));
        }
    }
}
