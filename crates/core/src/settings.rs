use std::time::Duration;

use crate::thread_worker::{DEFAULT_JOIN_TIMEOUT_MS, DEFAULT_WORKER_NAME, WorkerOptions};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Settings {
    pub worker: WorkerSettings,
    pub ui: UiSettings,
    pub demo: DemoSettings,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerSettings {
    pub name: String,
    pub stack_size: Option<usize>,
    pub join_timeout_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            name: String::from(DEFAULT_WORKER_NAME),
            stack_size: None,
            join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
        }
    }
}

impl WorkerSettings {
    pub fn to_options(&self) -> WorkerOptions {
        let mut options = WorkerOptions::named(self.name.clone())
            .with_join_timeout(Duration::from_millis(self.join_timeout_ms));
        if let Some(stack_size) = self.stack_size {
            options = options.with_stack_size(stack_size);
        }
        options
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UiSettings {
    pub tick_rate_ms: u64,
    pub history_limit: usize,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            tick_rate_ms: 100,
            history_limit: 64,
        }
    }
}

/// Pacing of the bundled demo jobs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DemoSettings {
    pub steps: u32,
    pub step_delay_ms: u64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            steps: 20,
            step_delay_ms: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_settings_map_to_options() {
        let settings = WorkerSettings {
            name: String::from("calib_worker"),
            stack_size: Some(512 * 1024),
            join_timeout_ms: 250,
        };
        let options = settings.to_options();
        assert_eq!(options.name, "calib_worker");
        assert_eq!(options.stack_size, Some(512 * 1024));
        assert_eq!(options.join_timeout, Duration::from_millis(250));

        assert_eq!(WorkerSettings::default().to_options(), WorkerOptions::default());
    }
}
