use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jobline_core::{BusyCursor, CancelCallback, ProgressIndicator, UiHooks};
use jobline_ui::DashboardState;

pub(crate) type SharedDashboard = Arc<Mutex<DashboardState>>;

pub(crate) fn lock(dashboard: &SharedDashboard) -> MutexGuard<'_, DashboardState> {
    dashboard.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Slot holding the worker's cancel callback, shared with the key handler.
pub(crate) type CancelSlot = Arc<Mutex<Option<CancelCallback>>>;

/// Progress sink drawing into the dashboard. Owned by the worker and only
/// touched while the event loop drains it.
pub(crate) struct TerminalProgress {
    dashboard: SharedDashboard,
    cancel: CancelSlot,
}

impl TerminalProgress {
    pub(crate) fn new(dashboard: SharedDashboard) -> (Self, CancelSlot) {
        let cancel = CancelSlot::default();
        let progress = Self {
            dashboard,
            cancel: Arc::clone(&cancel),
        };
        (progress, cancel)
    }
}

impl ProgressIndicator for TerminalProgress {
    fn set_progress(&mut self, percent: i32) {
        lock(&self.dashboard).set_progress(percent);
    }

    fn set_status_text(&mut self, text: &str) {
        lock(&self.dashboard).set_status_text(text);
    }

    fn set_cancel_callback(&mut self, callback: CancelCallback) {
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn clear_percent(&mut self) {
        lock(&self.dashboard).clear_percent();
    }

    fn show_error_info(&mut self, message: &str, code: i32, description: &str) {
        let text = if description.is_empty() {
            format!("{message} (code {code})")
        } else {
            format!("{message} (code {code}): {description}")
        };
        lock(&self.dashboard).show_error(text);
    }
}

pub(crate) struct TerminalHooks {
    dashboard: SharedDashboard,
    wake: Arc<AtomicBool>,
}

impl TerminalHooks {
    pub(crate) fn new(dashboard: SharedDashboard, wake: Arc<AtomicBool>) -> Self {
        Self { dashboard, wake }
    }
}

impl UiHooks for TerminalHooks {
    fn wake_up_idle(&self) {
        self.wake.store(true, AtomicOrdering::Release);
    }

    fn show_error(&self, message: &str) {
        lock(&self.dashboard).show_error(message);
    }
}

/// Busy marker in the title bar.
pub(crate) struct DashboardCursor {
    dashboard: SharedDashboard,
}

impl DashboardCursor {
    pub(crate) fn new(dashboard: SharedDashboard) -> Self {
        Self { dashboard }
    }
}

impl BusyCursor for DashboardCursor {
    fn begin_busy(&self) {
        lock(&self.dashboard).busy = true;
    }

    fn end_busy(&self) {
        lock(&self.dashboard).busy = false;
    }
}
