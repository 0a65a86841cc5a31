use crate::common::fake_tools::{FakeTools, SUCCESS_BODY};
use hwconvert::engine::{
    BuiltinPreset, ConversionProgress, ConversionRequest, Converter, GpuVendor, ProgressSink,
};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

const GRACE: Duration = Duration::from_secs(5);

fn request(tools: &FakeTools, preset: BuiltinPreset, vendor: GpuVendor) -> ConversionRequest {
    ConversionRequest::new(tools.input(), tools.output_dir(), Arc::new(preset), vendor)
}

#[derive(Default)]
struct RecordingSink {
    percents: Vec<f64>,
    lines: Vec<String>,
}

impl ProgressSink for RecordingSink {
    fn on_progress(&mut self, progress: &ConversionProgress) {
        self.percents.push(progress.percent);
    }

    fn on_output_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

#[test]
fn cpu_conversion_reports_progress_and_succeeds() {
    let tools = FakeTools::new(&["libx264"], &[], 120.0, SUCCESS_BODY);
    let converter = Converter::new(tools.runner_config(GRACE));
    let req = request(&tools, BuiltinPreset::H264Mp4, GpuVendor::Cpu);

    let mut percents = Vec::new();
    let mut sink = |p: &ConversionProgress| percents.push(p.percent);
    let result = converter.run(&req, &mut sink).expect("cpu never fails pre-flight");

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.error, None);
    assert_eq!(result.output_path, tools.output_dir().join("input.mp4"));
    assert_eq!(fs::read_to_string(&result.output_path).unwrap(), "partial");
    // One sample per -progress block, even though each block repeats the position three ways
    assert_eq!(percents, vec![25.0, 50.0]);
    assert!(!converter.is_active());

    let runs = tools.conversion_invocations();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].starts_with("-y -nostats -progress pipe:1 -i "));
    assert!(runs[0].contains("-c:v libx264"));
    assert!(!runs[0].contains("-hwaccel"));
}

#[test]
fn output_lines_reach_the_sink() {
    let tools = FakeTools::new(&["libx264"], &[], 120.0, SUCCESS_BODY);
    let converter = Converter::new(tools.runner_config(GRACE));
    let req = request(&tools, BuiltinPreset::H264Mp4, GpuVendor::Cpu);

    let mut sink = RecordingSink::default();
    let result = converter.run(&req, &mut sink).unwrap();

    assert!(result.success);
    assert!(sink.lines.iter().any(|l| l == "ffmpeg version fake"));
    assert!(sink.lines.iter().any(|l| l == "progress=end"));
    assert_eq!(sink.percents, vec![25.0, 50.0]);
}

#[test]
fn carriage_return_stats_lines_are_split() {
    let body = r#"
printf 'frame=1 fps=0 time=00:00:30.00 speed=1x\rframe=2 fps=0 time=00:01:00.00 speed=1x\r' >&2
printf 'done' > "$out"
exit 0
"#;
    let tools = FakeTools::new(&["libx264"], &[], 120.0, body);
    let converter = Converter::new(tools.runner_config(GRACE));
    let req = request(&tools, BuiltinPreset::H264Mp4, GpuVendor::Cpu);

    let mut sink = RecordingSink::default();
    assert!(converter.run(&req, &mut sink).unwrap().success);
    assert_eq!(sink.percents, vec![25.0, 50.0]);
}

#[test]
fn unknown_duration_reports_zero_percent() {
    let tools = FakeTools::new(&["libx264"], &[], 0.0, SUCCESS_BODY);
    let converter = Converter::new(tools.runner_config(GRACE));
    let req = request(&tools, BuiltinPreset::H264Mp4, GpuVendor::Cpu);

    let mut sink = RecordingSink::default();
    assert!(converter.run(&req, &mut sink).unwrap().success);
    assert_eq!(sink.percents, vec![0.0, 0.0]);
}

#[test]
fn failed_run_carries_stderr() {
    let body = r#"
echo "input.mov: Invalid data found when processing input" >&2
exit 1
"#;
    let tools = FakeTools::new(&["libx264"], &[], 120.0, body);
    let converter = Converter::new(tools.runner_config(GRACE));
    let req = request(&tools, BuiltinPreset::H264Mp4, GpuVendor::Cpu);

    let mut sink = RecordingSink::default();
    let result = converter.run(&req, &mut sink).unwrap();

    assert!(!result.success);
    assert!(!result.is_cancelled());
    assert!(result.error.as_deref().unwrap().contains("Invalid data found"));
    // Software runs are never treated as GPU failures.
    assert!(req.classify_failure(&result).is_none());
    assert!(!converter.is_active());
}

#[test]
fn silent_failure_reports_exit_status() {
    let tools = FakeTools::new(&["libx264"], &[], 120.0, "exit 3\n");
    let converter = Converter::new(tools.runner_config(GRACE));
    let req = request(&tools, BuiltinPreset::H264Mp4, GpuVendor::Cpu);

    let mut sink = RecordingSink::default();
    let result = converter.run(&req, &mut sink).unwrap();

    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.starts_with("ffmpeg exited with status"), "{}", error);
}

#[test]
fn nvidia_run_uses_cuda_decode_when_cuvid_is_built() {
    let tools = FakeTools::new(&["h264_nvenc"], &["h264_cuvid"], 120.0, SUCCESS_BODY);
    let converter = Converter::new(tools.runner_config(GRACE));
    let req = request(&tools, BuiltinPreset::H264Mp4, GpuVendor::Nvidia);

    let mut sink = RecordingSink::default();
    assert!(converter.run(&req, &mut sink).unwrap().success);

    let runs = tools.conversion_invocations();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].starts_with("-y -nostats -progress pipe:1 -hwaccel cuda -c:v h264_cuvid -i "));
    assert!(runs[0].contains("-c:v h264_nvenc"));
}

#[test]
fn remux_needs_no_encoder() {
    let tools = FakeTools::new(&[], &["h264_cuvid"], 120.0, SUCCESS_BODY);
    let converter = Converter::new(tools.runner_config(GRACE));
    let req = request(&tools, BuiltinPreset::RemuxMkv, GpuVendor::Nvidia);

    let mut sink = RecordingSink::default();
    let result = converter.run(&req, &mut sink).unwrap();
    assert!(result.success);
    assert_eq!(result.output_path, tools.output_dir().join("input.mkv"));

    let runs = tools.conversion_invocations();
    assert!(runs[0].contains("-map 0 -c copy"));
    assert!(!runs[0].contains("-hwaccel"));
}

#[test]
fn sequential_runs_reuse_the_capability_cache() {
    let tools = FakeTools::new(&["h264_nvenc"], &[], 120.0, SUCCESS_BODY);
    let converter = Converter::new(tools.runner_config(GRACE));

    for _ in 0..2 {
        let req = request(&tools, BuiltinPreset::H264Mp4, GpuVendor::Nvidia);
        let mut sink = RecordingSink::default();
        assert!(converter.run(&req, &mut sink).unwrap().success);
    }

    let encoder_queries = tools
        .invocations()
        .iter()
        .filter(|line| line.as_str() == "-hide_banner -encoders")
        .count();
    assert_eq!(encoder_queries, 1);
    assert_eq!(tools.conversion_invocations().len(), 2);
}
