#![forbid(unsafe_code)]

mod dashboard;
mod demo;

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use jobline_core::{
    BusyCursor, DemoSettings, Settings, ThreadWorker, UiWorker, Worker, load_settings,
    settings_path, stop_queue,
};
use jobline_ui::DashboardState;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing_subscriber::EnvFilter;

use crate::dashboard::{
    CancelSlot, DashboardCursor, SharedDashboard, TerminalHooks, TerminalProgress, lock,
};
use crate::demo::DemoKind;

const WAKE_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Parser)]
#[command(version, about = "Background job worker demo for a slicer plater")]
struct Cli {
    /// Settings file, defaults to ~/.config/jobline/settings.ini
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    tick_rate_ms: Option<u64>,
    #[arg(long)]
    worker_name: Option<String>,
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("jobline.log"));
    init_tracing(&log_file)?;

    let settings = resolve_settings(&cli)?;
    tracing::info!(
        worker = %settings.worker.name,
        tick_rate_ms = settings.ui.tick_rate_ms,
        "starting"
    );
    run_app(&settings)
}

fn init_tracing(log_file: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobline=info,warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init();
    Ok(())
}

fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match cli.config.clone().or_else(settings_path) {
        Some(path) => load_settings(&path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(tick_rate_ms) = cli.tick_rate_ms {
        settings.ui.tick_rate_ms = tick_rate_ms.max(1);
    }
    if let Some(name) = cli.worker_name.as_ref().filter(|name| !name.is_empty()) {
        settings.worker.name = name.clone();
    }
    Ok(settings)
}

struct App {
    worker: UiWorker<ThreadWorker>,
    dashboard: SharedDashboard,
    cancel: CancelSlot,
    wake: Arc<AtomicBool>,
    cursor: Arc<dyn BusyCursor>,
    demo: DemoSettings,
    stop_timeout_ms: u64,
}

impl App {
    fn new(settings: &Settings) -> Result<Self> {
        let dashboard: SharedDashboard = Arc::new(Mutex::new(DashboardState::new(
            settings.worker.name.clone(),
            settings.ui.history_limit,
        )));
        let wake = Arc::new(AtomicBool::new(false));
        let (progress, cancel) = TerminalProgress::new(Arc::clone(&dashboard));
        let thread_worker =
            ThreadWorker::new(settings.worker.to_options(), Some(Box::new(progress)))
                .context("failed to start the job worker")?;
        let hooks = Arc::new(TerminalHooks::new(Arc::clone(&dashboard), Arc::clone(&wake)));
        let cursor: Arc<dyn BusyCursor> = Arc::new(DashboardCursor::new(Arc::clone(&dashboard)));

        Ok(Self {
            worker: UiWorker::new(thread_worker, hooks),
            dashboard,
            cancel,
            wake,
            cursor,
            demo: settings.demo.clone(),
            stop_timeout_ms: settings.worker.join_timeout_ms,
        })
    }

    /// Delivers whatever the worker produced since the last pass.
    fn pump(&mut self) {
        if let Err(error) = self.worker.process_events() {
            let message = format!("{error:#}");
            tracing::error!(%message, "job error reached the event loop");
            match self.worker.progress_indicator() {
                Some(progress) => progress.show_error_info("Job failed", 1, &message),
                None => lock(&self.dashboard).show_error(message),
            }
        }
        let idle = self.worker.is_idle();
        lock(&self.dashboard).idle = idle;
    }

    /// Returns true when the app should quit.
    fn handle_key(&mut self, key_event: KeyEvent) -> bool {
        match key_event.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('a') => self.submit(DemoKind::Arrange),
            KeyCode::Char('s') => self.submit(DemoKind::Slice),
            KeyCode::Char('f') => self.submit(DemoKind::Fail),
            KeyCode::Char('r') => {
                self.pump();
                demo::replace(
                    &mut self.worker,
                    DemoKind::Slice,
                    &self.dashboard,
                    &self.cursor,
                    &self.demo,
                );
            }
            KeyCode::Char('c') => self.cancel_current(),
            KeyCode::Char('x') => self.stop_queue(),
            KeyCode::Esc => {
                lock(&self.dashboard).dismiss_error();
            }
            _ => {}
        }
        false
    }

    fn submit(&mut self, kind: DemoKind) {
        demo::submit(&mut self.worker, kind, &self.dashboard, &self.cursor, &self.demo);
    }

    fn cancel_current(&self) {
        match self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(cancel) => cancel(),
            None => self.worker.cancel(),
        }
        lock(&self.dashboard).set_status("cancel requested");
    }

    fn stop_queue(&mut self) {
        self.pump();
        let discarded = lock(&self.dashboard).discard_pending();
        let status = match stop_queue(&mut self.worker, self.stop_timeout_ms) {
            Ok(true) => format!("queue stopped, {discarded} job(s) dropped"),
            Ok(false) => String::from("queue stop timed out, job still running"),
            Err(error) => {
                let message = format!("{error:#}");
                lock(&self.dashboard).show_error(message.clone());
                format!("queue stopped with error: {message}")
            }
        };
        tracing::info!(discarded, "{status}");
        lock(&self.dashboard).set_status(status);
    }

    fn shutdown(self) {
        let started = Instant::now();
        drop(self.worker);
        tracing::info!(elapsed_ms = started.elapsed().as_millis(), "worker shut down");
    }
}

fn run_app(settings: &Settings) -> Result<()> {
    let mut app = App::new(settings)?;

    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;

    let loop_result = run_event_loop(
        &mut terminal,
        &mut app,
        Duration::from_millis(settings.ui.tick_rate_ms),
    );
    app.shutdown();
    let restore_result = restore_terminal(&mut terminal);

    loop_result?;
    restore_result?;
    Ok(())
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to restore cursor")?;
    Ok(())
}

fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        app.pump();

        {
            let state = lock(&app.dashboard);
            terminal
                .draw(|frame| jobline_ui::render(frame, &state))
                .context("failed to draw frame")?;
        }

        let timeout = if app.wake.swap(false, AtomicOrdering::AcqRel) {
            Duration::ZERO
        } else {
            tick_rate.saturating_sub(last_tick.elapsed()).min(WAKE_POLL)
        };
        if event::poll(timeout).context("failed to poll input")? {
            if let Event::Key(key_event) = event::read().context("failed to read input event")? {
                if key_event.kind == KeyEventKind::Press && app.handle_key(key_event) {
                    return Ok(());
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}
