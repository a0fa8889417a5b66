use std::any::Any;
use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("main thread call was dropped before it ran")]
    MainThreadCallDropped,
}

/// A panic caught while a job was processing, carried to the main thread as an error.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("job panicked: {message}")]
pub struct JobPanic {
    pub message: String,
}

impl JobPanic {
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&'static str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            String::from("unknown panic payload")
        };
        Self { message }
    }
}
