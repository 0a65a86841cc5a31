use crate::common::fake_tools::{FakeTools, LONG_RUNNING_BODY, QUIT_ON_Q_BODY, STUBBORN_BODY};
use hwconvert::engine::{
    BuiltinPreset, CANCELLED_MESSAGE, ConversionProgress, ConversionRequest, ConversionResult,
    Converter, GpuEncoderError, GpuVendor,
};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Start a run on another thread, cancel it once the first progress sample
/// arrives, and return the run's result along with how long the cancel took.
fn run_and_cancel(
    converter: &Converter,
    request: &ConversionRequest,
    force: bool,
) -> (Result<ConversionResult, GpuEncoderError>, Duration) {
    let (tx, rx) = mpsc::channel();
    thread::scope(|s| {
        let run = s.spawn(move || {
            let mut sink = move |p: &ConversionProgress| {
                let _ = tx.send(p.percent);
            };
            converter.run(request, &mut sink)
        });

        rx.recv_timeout(Duration::from_secs(10))
            .expect("run should report progress");
        assert!(converter.is_active());

        let started = Instant::now();
        assert!(converter.cancel(force));
        let result = run.join().expect("runner thread panicked");
        (result, started.elapsed())
    })
}

fn long_request(tools: &FakeTools) -> ConversionRequest {
    ConversionRequest::new(
        tools.input(),
        tools.output_dir(),
        Arc::new(BuiltinPreset::H264Mp4),
        GpuVendor::Cpu,
    )
}

fn assert_cancelled(converter: &Converter, result: &ConversionResult) {
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some(CANCELLED_MESSAGE));
    assert!(result.is_cancelled());
    assert!(!result.output_path.exists(), "partial output should be removed");
    assert!(!converter.is_active());
    assert!(!converter.cancel(false), "cancel after completion is a no-op");
}

#[test]
fn cancel_when_idle_is_noop() {
    let tools = FakeTools::new(&["libx264"], &[], 120.0, LONG_RUNNING_BODY);
    let converter = Converter::new(tools.runner_config(Duration::from_secs(5)));
    assert!(!converter.cancel(false));
    assert!(!converter.cancel(true));
    assert!(!converter.cancel_handle().is_active());
}

#[test]
fn polite_cancel_stops_and_cleans_up() {
    let tools = FakeTools::new(&["libx264"], &[], 120.0, LONG_RUNNING_BODY);
    let converter = Converter::new(tools.runner_config(Duration::from_secs(30)));
    let request = long_request(&tools);

    let (result, elapsed) = run_and_cancel(&converter, &request, false);
    let result = result.unwrap();

    assert_cancelled(&converter, &result);
    // The script honours SIGTERM, so the grace timer never had to fire.
    assert!(elapsed < Duration::from_secs(10), "took {:?}", elapsed);
}

#[test]
fn cancel_wins_over_clean_exit_after_quit() {
    let tools = FakeTools::new(&["libx264"], &[], 120.0, QUIT_ON_Q_BODY);
    let converter = Converter::new(tools.runner_config(Duration::from_secs(30)));
    let request = long_request(&tools);

    let (result, elapsed) = run_and_cancel(&converter, &request, false);
    let result = result.unwrap();

    // The script exits 0 on `q`, yet the run still reports a cancellation.
    assert_cancelled(&converter, &result);
    assert!(elapsed < Duration::from_secs(10), "took {:?}", elapsed);
}

#[test]
fn forced_cancel_kills_without_waiting_for_grace() {
    let tools = FakeTools::new(&["libx264"], &[], 120.0, STUBBORN_BODY);
    let converter = Converter::new(tools.runner_config(Duration::from_secs(60)));
    let request = long_request(&tools);

    let (result, elapsed) = run_and_cancel(&converter, &request, true);
    let result = result.unwrap();

    assert_cancelled(&converter, &result);
    assert!(elapsed < Duration::from_secs(10), "took {:?}", elapsed);
}

#[test]
fn grace_timer_escalates_to_kill() {
    let tools = FakeTools::new(&["libx264"], &[], 120.0, STUBBORN_BODY);
    let converter = Converter::new(tools.runner_config(Duration::from_millis(300)));
    let request = long_request(&tools);

    let (result, elapsed) = run_and_cancel(&converter, &request, false);
    let result = result.unwrap();

    assert_cancelled(&converter, &result);
    assert!(elapsed >= Duration::from_millis(250), "killed before grace: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(10), "took {:?}", elapsed);
}

#[test]
fn cancel_handle_works_from_another_thread() {
    let tools = FakeTools::new(&["libx264"], &[], 120.0, LONG_RUNNING_BODY);
    let converter = Converter::new(tools.runner_config(Duration::from_secs(30)));
    let handle = converter.cancel_handle();
    let request = long_request(&tools);

    let (tx, rx) = mpsc::channel();
    let result = thread::scope(|s| {
        let run = s.spawn(|| {
            let mut sink = move |_: &ConversionProgress| {
                let _ = tx.send(());
            };
            converter.run(&request, &mut sink)
        });
        s.spawn(move || {
            rx.recv_timeout(Duration::from_secs(10)).expect("progress");
            assert!(handle.cancel(false));
        });
        run.join().unwrap()
    });

    assert_cancelled(&converter, &result.unwrap());
}
