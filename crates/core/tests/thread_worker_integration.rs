#![forbid(unsafe_code)]

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use jobline_core::{
    CancelCallback, Ctl, ProgressIndicator, ThreadWorker, Worker, WorkerOptions, queue_job,
    queue_job_with_finish, stop_current_job,
};

const STEP: Duration = Duration::from_millis(2);

type Log = Arc<Mutex<Vec<String>>>;

fn spawn_worker(label: &str) -> ThreadWorker {
    ThreadWorker::new(WorkerOptions::named(format!("it-{label}")), None)
        .expect("worker thread should spawn")
}

fn push_logged(worker: &mut ThreadWorker, log: &Log, name: &'static str) {
    let process_log = Arc::clone(log);
    let finish_log = Arc::clone(log);
    queue_job_with_finish(
        worker,
        move |_| {
            process_log
                .lock()
                .expect("log should lock")
                .push(format!("{name}-process"));
            Ok(())
        },
        move |_, _: &mut Option<anyhow::Error>| {
            finish_log
                .lock()
                .expect("log should lock")
                .push(format!("{name}-finalize"));
        },
    );
}

/// Pushes a job that spins until canceled and reports when it started.
fn push_spinning(worker: &mut ThreadWorker, canceled_seen: Arc<Mutex<Option<bool>>>) -> Receiver<()> {
    let (started_tx, started_rx) = mpsc::channel();
    queue_job_with_finish(
        worker,
        move |ctl| {
            let _ = started_tx.send(());
            while !ctl.was_canceled() {
                thread::sleep(STEP);
            }
            assert!(ctl.was_canceled(), "cancellation stays visible");
            Ok(())
        },
        move |canceled, _: &mut Option<anyhow::Error>| {
            *canceled_seen.lock().expect("slot should lock") = Some(canceled);
        },
    );
    started_rx
}

fn drain_until(worker: &mut ThreadWorker, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition should be met in time");
        worker.process_events().expect("drain should succeed");
        thread::sleep(STEP);
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum ProgressCall {
    Progress(i32),
    Status(String),
    Finalized,
}

#[derive(Clone, Default)]
struct SharedProgress(Arc<Mutex<Vec<ProgressCall>>>);

impl SharedProgress {
    fn record(&self, call: ProgressCall) {
        self.0.lock().expect("progress log should lock").push(call);
    }

    fn calls(&self) -> Vec<ProgressCall> {
        self.0.lock().expect("progress log should lock").clone()
    }
}

impl ProgressIndicator for SharedProgress {
    fn set_progress(&mut self, percent: i32) {
        self.record(ProgressCall::Progress(percent));
    }

    fn set_status_text(&mut self, text: &str) {
        self.record(ProgressCall::Status(text.to_string()));
    }

    fn set_cancel_callback(&mut self, _callback: CancelCallback) {}

    fn clear_percent(&mut self) {}

    fn show_error_info(&mut self, _message: &str, _code: i32, _description: &str) {}
}

#[derive(Debug)]
struct PrinterOffline {
    serial: String,
}

impl fmt::Display for PrinterOffline {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "printer {} is offline", self.serial)
    }
}

impl std::error::Error for PrinterOffline {}

#[test]
fn status_reaches_progress_sink_before_finalize() {
    let progress = SharedProgress::default();
    let mut worker = ThreadWorker::new(
        WorkerOptions::named("it-status"),
        Some(Box::new(progress.clone())),
    )
    .expect("worker thread should spawn");

    let finalized = Arc::new(AtomicBool::new(false));
    let finish_progress = progress.clone();
    let finish_flag = Arc::clone(&finalized);
    queue_job_with_finish(
        &mut worker,
        |ctl| {
            ctl.update_status(50, "half");
            Ok(())
        },
        move |_, _: &mut Option<anyhow::Error>| {
            finish_progress.record(ProgressCall::Finalized);
            finish_flag.store(true, AtomicOrdering::SeqCst);
        },
    );

    drain_until(&mut worker, || finalized.load(AtomicOrdering::SeqCst));
    assert_eq!(
        progress.calls(),
        vec![
            ProgressCall::Progress(50),
            ProgressCall::Status(String::from("half")),
            ProgressCall::Finalized,
        ]
    );
}

#[test]
fn process_error_is_returned_once_after_finalize() {
    let mut worker = spawn_worker("error");
    let finalize_saw_error = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&finalize_saw_error);
    queue_job_with_finish(
        &mut worker,
        |_| {
            Err(PrinterOffline {
                serial: String::from("01P00A"),
            }
            .into())
        },
        move |_, error: &mut Option<anyhow::Error>| {
            seen.store(error.is_some(), AtomicOrdering::SeqCst);
        },
    );

    let error = worker
        .wait_for_current_job(0)
        .expect_err("unhandled error should surface on the main thread");
    assert!(finalize_saw_error.load(AtomicOrdering::SeqCst));
    assert_eq!(error.to_string(), "printer 01P00A is offline");
    let original = error
        .downcast_ref::<PrinterOffline>()
        .expect("the same error value should come back");
    assert_eq!(original.serial, "01P00A");

    assert!(worker.is_idle());
    worker
        .process_events()
        .expect("the error is not delivered twice");
}

#[test]
fn boom_scenario_surfaces_message() {
    let mut worker = spawn_worker("boom");
    queue_job(&mut worker, |_| anyhow::bail!("boom"));
    let error = worker
        .wait_for_current_job(0)
        .expect_err("boom should surface");
    assert_eq!(error.to_string(), "boom");
}

#[test]
fn jobs_process_and_finalize_in_push_order() {
    let mut worker = spawn_worker("order");
    let log = Log::default();
    for name in ["A", "B", "C"] {
        push_logged(&mut worker, &log, name);
    }

    assert!(worker.wait_for_idle(0).expect("jobs should succeed"));
    assert_eq!(
        *log.lock().expect("log should lock"),
        vec![
            "A-process",
            "A-finalize",
            "B-process",
            "B-finalize",
            "C-process",
            "C-finalize",
        ]
    );
}

#[test]
fn worker_is_busy_until_finalize_is_delivered() {
    let mut worker = spawn_worker("busy");
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (processed_tx, processed_rx) = mpsc::channel();
    let finalized = Arc::new(AtomicBool::new(false));
    let finish_flag = Arc::clone(&finalized);
    queue_job_with_finish(
        &mut worker,
        move |_| {
            release_rx
                .recv_timeout(Duration::from_secs(5))
                .map_err(|error| anyhow::anyhow!("release never came: {error}"))?;
            let _ = processed_tx.send(());
            Ok(())
        },
        move |_, _: &mut Option<anyhow::Error>| {
            finish_flag.store(true, AtomicOrdering::SeqCst);
        },
    );

    assert!(!worker.is_idle(), "a queued job keeps the worker busy");
    release_tx.send(()).expect("job should be waiting");
    processed_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("process should return");
    thread::sleep(Duration::from_millis(20));
    assert!(
        !worker.is_idle(),
        "an undelivered finalize keeps the worker busy"
    );

    drain_until(&mut worker, || finalized.load(AtomicOrdering::SeqCst));
    assert!(worker.is_idle());
}

#[test]
fn cancel_reaches_running_job_and_resets_for_the_next() {
    let mut worker = spawn_worker("cancel");
    let canceled_seen = Arc::new(Mutex::new(None));
    let started = push_spinning(&mut worker, Arc::clone(&canceled_seen));
    started
        .recv_timeout(Duration::from_secs(5))
        .expect("job should start");

    worker.cancel();
    assert!(worker.wait_for_current_job(0).expect("job should stop"));
    assert_eq!(*canceled_seen.lock().expect("slot should lock"), Some(true));

    let next_saw_cancel = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&next_saw_cancel);
    queue_job(&mut worker, move |ctl| {
        *slot.lock().expect("slot should lock") = Some(ctl.was_canceled());
        Ok(())
    });
    assert!(worker.wait_for_idle(0).expect("next job should run"));
    assert_eq!(*next_saw_cancel.lock().expect("slot should lock"), Some(false));
}

#[test]
fn cancel_all_drops_queued_jobs_without_callbacks() {
    let mut worker = spawn_worker("cancel-all");
    let canceled_seen = Arc::new(Mutex::new(None));
    let started = push_spinning(&mut worker, Arc::clone(&canceled_seen));
    let log = Log::default();
    push_logged(&mut worker, &log, "second");
    push_logged(&mut worker, &log, "third");
    started
        .recv_timeout(Duration::from_secs(5))
        .expect("first job should start");

    worker.cancel_all();
    assert_eq!(worker.queued_len(), 0);
    assert!(worker.wait_for_idle(0).expect("worker should settle"));

    assert_eq!(*canceled_seen.lock().expect("slot should lock"), Some(true));
    assert!(
        log.lock().expect("log should lock").is_empty(),
        "discarded jobs get neither process nor finalize"
    );
}

#[test]
fn short_wait_times_out_without_breaking_later_waits() {
    let mut worker = spawn_worker("timeout");
    let (release_tx, release_rx) = mpsc::channel::<()>();
    queue_job(&mut worker, move |_| {
        let _ = release_rx.recv_timeout(Duration::from_secs(5));
        Ok(())
    });

    assert!(!worker.wait_for_idle(5).expect("timeout is not an error"));
    assert!(
        !worker
            .wait_for_current_job(5)
            .expect("timeout is not an error")
    );
    release_tx.send(()).expect("job should be waiting");
    assert!(worker.wait_for_idle(0).expect("infinite wait should finish"));
    assert!(worker.is_idle());
}

#[test]
fn stop_current_job_cancels_and_waits_for_finalize() {
    let mut worker = spawn_worker("stop-current");
    let canceled_seen = Arc::new(Mutex::new(None));
    let started = push_spinning(&mut worker, Arc::clone(&canceled_seen));
    started
        .recv_timeout(Duration::from_secs(5))
        .expect("job should start");

    assert!(stop_current_job(&mut worker, 0).expect("job should stop"));
    assert_eq!(*canceled_seen.lock().expect("slot should lock"), Some(true));
    assert!(worker.is_idle());
}

#[test]
fn stop_current_job_gives_up_on_a_job_that_ignores_cancel() {
    let mut worker = spawn_worker("stop-stubborn");
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let canceled_seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&canceled_seen);
    queue_job_with_finish(
        &mut worker,
        move |_| {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
            Ok(())
        },
        move |canceled, _: &mut Option<anyhow::Error>| {
            *slot.lock().expect("slot should lock") = Some(canceled);
        },
    );

    assert!(
        !stop_current_job(&mut worker, 20).expect("timeout is not an error"),
        "the job is still running"
    );
    assert_eq!(*canceled_seen.lock().expect("slot should lock"), None);

    release_tx.send(()).expect("job should be waiting");
    assert!(worker.wait_for_idle(0).expect("job should finish"));
    assert_eq!(*canceled_seen.lock().expect("slot should lock"), Some(true));
}

#[test]
fn helper_threads_share_the_job_ctl() {
    let progress = SharedProgress::default();
    let mut worker = ThreadWorker::new(
        WorkerOptions::named("it-helpers"),
        Some(Box::new(progress.clone())),
    )
    .expect("worker thread should spawn");
    let (reported_tx, reported_rx) = mpsc::channel();
    let canceled_seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&canceled_seen);
    queue_job_with_finish(
        &mut worker,
        move |ctl| {
            thread::scope(|scope| {
                for part in 0..2 {
                    let reported = reported_tx.clone();
                    scope.spawn(move || {
                        ctl.update_status(50, &format!("island {part}"));
                        let _ = reported.send(part);
                        while !ctl.was_canceled() {
                            thread::sleep(STEP);
                        }
                    });
                }
            });
            Ok(())
        },
        move |canceled, _: &mut Option<anyhow::Error>| {
            *slot.lock().expect("slot should lock") = Some(canceled);
        },
    );

    for _ in 0..2 {
        reported_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("both helpers should report");
    }
    worker.cancel();
    assert!(worker.wait_for_current_job(0).expect("job should stop"));
    assert_eq!(*canceled_seen.lock().expect("slot should lock"), Some(true));

    let mut statuses: Vec<ProgressCall> = progress
        .calls()
        .into_iter()
        .filter(|call| matches!(call, ProgressCall::Status(_)))
        .collect();
    statuses.sort_by_key(|call| format!("{call:?}"));
    assert_eq!(
        statuses,
        vec![
            ProgressCall::Status(String::from("island 0")),
            ProgressCall::Status(String::from("island 1")),
        ]
    );
}

#[test]
fn main_thread_call_completes_only_after_it_ran_on_the_draining_thread() {
    let mut worker = spawn_worker("main-call");
    let main_thread = thread::current().id();
    let ran_on = Arc::new(Mutex::new(None));
    let observed_after_wait = Arc::new(Mutex::new(None));

    let call_slot = Arc::clone(&ran_on);
    let check_slot = Arc::clone(&ran_on);
    let observed = Arc::clone(&observed_after_wait);
    queue_job(&mut worker, move |ctl| {
        let future = ctl.call_on_main_thread(Box::new(move || {
            *call_slot.lock().expect("slot should lock") = Some(thread::current().id());
        }));
        future.wait()?;
        *observed.lock().expect("slot should lock") =
            *check_slot.lock().expect("slot should lock");
        Ok(())
    });

    assert!(worker.wait_for_idle(0).expect("job should succeed"));
    assert_eq!(*ran_on.lock().expect("slot should lock"), Some(main_thread));
    assert_eq!(
        *observed_after_wait.lock().expect("slot should lock"),
        Some(main_thread),
        "the future resolved after the call had run"
    );
}

#[test]
fn dropping_worker_mid_job_cancels_and_joins() {
    let mut worker = ThreadWorker::new(
        WorkerOptions::named("it-drop").with_join_timeout(Duration::from_secs(5)),
        None,
    )
    .expect("worker thread should spawn");
    let canceled_seen = Arc::new(Mutex::new(None));
    let started = push_spinning(&mut worker, Arc::clone(&canceled_seen));
    started
        .recv_timeout(Duration::from_secs(5))
        .expect("job should start");

    let begun = Instant::now();
    drop(worker);
    assert!(begun.elapsed() < Duration::from_secs(5));
    assert_eq!(*canceled_seen.lock().expect("slot should lock"), Some(true));
}
