//! Conversion runner: pre-flight, argument assembly, process supervision.
//!
//! A [`Converter`] owns its capability cache and process registry, so separate
//! converters are fully isolated. Each [`Converter::run`] call drives one
//! ffmpeg process to exactly one [`ConversionResult`].

use std::collections::VecDeque;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cancel::{ActiveProcess, CancelHandle, DEFAULT_CANCEL_GRACE, ProcessRegistry};
use super::capabilities::CapabilityProber;
use super::classify::classify_failure;
use super::decode::{DEFAULT_RENDER_DEVICE, plan_decode_args};
use super::encoders::{EncoderAvailability, resolve_encoder};
use super::error::GpuEncoderError;
use super::preset::{Preset, PresetCategory, PresetContext};
use super::probe::{MediaInfo, probe_media};
use super::progress::parse_progress_line;
use super::types::{CodecFamily, ConversionProgress, ConversionResult, GpuVendor, HostPlatform};

/// Flags that precede every invocation: overwrite, progress only on the machine-readable stdout channel
const GLOBAL_ARGS: [&str; 4] = ["-y", "-nostats", "-progress", "pipe:1"];

/// Diagnostic lines kept from stderr for the failure payload
const DIAGNOSTIC_LINES: usize = 200;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Engine settings; built by the host from its own configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub render_device: PathBuf,
    pub cancel_grace: Duration,
    pub platform: HostPlatform,
    /// Appended to preset arguments right before the output path
    pub extra_args: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            render_device: PathBuf::from(DEFAULT_RENDER_DEVICE),
            cancel_grace: DEFAULT_CANCEL_GRACE,
            platform: HostPlatform::current(),
            extra_args: Vec::new(),
        }
    }
}

/// One conversion to perform
#[derive(Clone)]
pub struct ConversionRequest {
    pub input_path: PathBuf,
    pub output_directory: PathBuf,
    pub preset: Arc<dyn Preset>,
    pub gpu_vendor: GpuVendor,
}

impl ConversionRequest {
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_directory: impl Into<PathBuf>,
        preset: Arc<dyn Preset>,
        gpu_vendor: GpuVendor,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_directory: output_directory.into(),
            preset,
            gpu_vendor,
        }
    }

    /// Where this request writes its output
    pub fn output_path(&self) -> PathBuf {
        output_path_for(&self.input_path, &self.output_directory, self.preset.extension())
    }

    /// GPU error for a finished run of this request, when the failure qualifies
    pub fn classify_failure(&self, result: &ConversionResult) -> Option<GpuEncoderError> {
        classify_failure(result, self.preset.category(), self.gpu_vendor)
    }
}

impl std::fmt::Debug for ConversionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("input_path", &self.input_path)
            .field("output_directory", &self.output_directory)
            .field("preset", &self.preset.id())
            .field("gpu_vendor", &self.gpu_vendor)
            .finish()
    }
}

/// `<dir>/<stem>.<ext>`, with `_converted` added when that would be the input itself
pub fn output_path_for(input: &Path, output_dir: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let candidate = output_dir.join(format!("{}.{}", stem, extension));

    let same_file = candidate == input
        || matches!(
            (fs::canonicalize(&candidate), fs::canonicalize(input)),
            (Ok(a), Ok(b)) if a == b
        );
    if same_file {
        output_dir.join(format!("{}_converted.{}", stem, extension))
    } else {
        candidate
    }
}

/// Receiver of progress samples and raw output lines, called on the runner's thread in order
pub trait ProgressSink {
    fn on_progress(&mut self, progress: &ConversionProgress);

    /// Every raw stdout/stderr line, for diagnostics logging
    fn on_output_line(&mut self, _line: &str) {}
}

impl<F> ProgressSink for F
where
    F: FnMut(&ConversionProgress),
{
    fn on_progress(&mut self, progress: &ConversionProgress) {
        self(progress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

struct OutputLine {
    stream: Stream,
    text: String,
}

pub struct Converter {
    config: RunnerConfig,
    prober: CapabilityProber,
    registry: ProcessRegistry,
}

impl Converter {
    pub fn new(config: RunnerConfig) -> Self {
        let prober = CapabilityProber::new(config.ffmpeg.clone());
        Self::with_prober(config, prober)
    }

    /// Converter that answers capability questions from an existing prober
    pub fn with_prober(config: RunnerConfig, prober: CapabilityProber) -> Self {
        Self {
            config,
            prober,
            registry: ProcessRegistry::new(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn prober(&self) -> &CapabilityProber {
        &self.prober
    }

    pub fn resolve_encoder(&self, vendor: GpuVendor, codec: CodecFamily) -> EncoderAvailability {
        resolve_encoder(&self.prober, vendor, codec)
    }

    /// Hardware decode arguments for a source codec under this converter's settings
    pub fn plan_decode_args(&self, vendor: GpuVendor, source_codec: Option<&str>) -> Vec<String> {
        plan_decode_args(
            &self.prober,
            vendor,
            self.config.platform,
            source_codec,
            &self.config.render_device,
        )
    }

    /// Handle that can cancel this converter's active run from any thread
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(self.registry.clone(), self.config.cancel_grace)
    }

    /// Cancel the active run; no-op when idle
    pub fn cancel(&self, force: bool) -> bool {
        self.cancel_handle().cancel(force)
    }

    pub fn is_active(&self) -> bool {
        self.registry.is_active()
    }

    /// Full ffmpeg argument vector for a request
    pub fn build_args(
        &self,
        request: &ConversionRequest,
        media: &MediaInfo,
        encoder: Option<&str>,
    ) -> Vec<String> {
        let output = request.output_path();
        let mut args: Vec<String> = GLOBAL_ARGS.iter().map(|s| s.to_string()).collect();

        if let PresetCategory::Video(_) = request.preset.category() {
            args.extend(self.plan_decode_args(request.gpu_vendor, media.video_codec.as_deref()));
        }

        args.extend(request.preset.build_args(&PresetContext {
            input: &request.input_path,
            output: &output,
            vendor: request.gpu_vendor,
            encoder,
            extra_args: &self.config.extra_args,
        }));
        args
    }

    /// Run one conversion to completion.
    ///
    /// `Err` is only returned for pre-flight encoder failures, before anything is
    /// spawned. Every started run ends in `Ok` with a success, failure or
    /// cancellation result.
    pub fn run(
        &self,
        request: &ConversionRequest,
        sink: &mut dyn ProgressSink,
    ) -> Result<ConversionResult, GpuEncoderError> {
        let output_path = request.output_path();

        let encoder = match request.preset.category().video_codec() {
            Some(codec) => Some(
                self.resolve_encoder(request.gpu_vendor, codec)
                    .into_result()?,
            ),
            None => None,
        };

        if let Err(e) = fs::create_dir_all(&request.output_directory) {
            return Ok(ConversionResult::failed(
                output_path,
                format!(
                    "Failed to create output directory {}: {}",
                    request.output_directory.display(),
                    e
                ),
            ));
        }

        let media = match probe_media(&self.config.ffprobe, &request.input_path) {
            Ok(media) => media,
            Err(e) => {
                warn!(input = %request.input_path.display(), error = %e, "probe failed, progress will read 0%");
                MediaInfo::default()
            }
        };

        let args = self.build_args(request, &media, encoder.as_deref());
        info!(
            input = %request.input_path.display(),
            output = %output_path.display(),
            preset = request.preset.id(),
            vendor = %request.gpu_vendor,
            encoder = encoder.as_deref().unwrap_or("-"),
            duration_s = media.duration_s,
            "starting conversion"
        );
        debug!(command = %format_command(&self.config.ffmpeg, &args), "ffmpeg invocation");

        Ok(self.execute(&args, output_path, media.duration_s, sink))
    }

    fn execute(
        &self,
        args: &[String],
        output_path: PathBuf,
        duration_s: f64,
        sink: &mut dyn ProgressSink,
    ) -> ConversionResult {
        let mut child = match Command::new(&self.config.ffmpeg)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(ffmpeg = %self.config.ffmpeg.display(), error = %e, "failed to spawn ffmpeg");
                return ConversionResult::failed(output_path, format!("Failed to start ffmpeg: {}", e));
            }
        };

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, Stream::Stderr, tx.clone());
        }
        drop(tx);

        let run_id = Uuid::new_v4();
        self.registry
            .register(ActiveProcess::new(run_id, child, output_path.clone()));

        let mut diagnostics: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_LINES);
        for line in rx {
            sink.on_output_line(&line.text);
            match parse_progress_line(&line.text, duration_s) {
                Some(progress) => sink.on_progress(&progress),
                None if line.stream == Stream::Stderr => {
                    if diagnostics.len() == DIAGNOSTIC_LINES {
                        diagnostics.pop_front();
                    }
                    diagnostics.push_back(line.text);
                }
                None => {}
            }
        }

        let exit = self.wait_for_exit(run_id);
        let cancelled = self
            .registry
            .release(run_id)
            .is_some_and(|active| active.cancelled);

        if cancelled {
            remove_partial_output(&output_path);
            info!(output = %output_path.display(), "conversion cancelled");
            return ConversionResult::cancelled(output_path);
        }

        match exit {
            Ok(status) if status.success() => {
                info!(output = %output_path.display(), "conversion finished");
                ConversionResult::succeeded(output_path)
            }
            Ok(status) => {
                let text = Vec::from(diagnostics).join("\n");
                warn!(%status, "ffmpeg failed");
                let error = if text.trim().is_empty() {
                    format!("ffmpeg exited with status: {}", status)
                } else {
                    text
                };
                ConversionResult::failed(output_path, error)
            }
            Err(e) => {
                warn!(error = %e, "lost track of ffmpeg process");
                ConversionResult::failed(output_path, format!("Failed to wait for ffmpeg: {}", e))
            }
        }
    }

    fn wait_for_exit(&self, run_id: Uuid) -> std::io::Result<ExitStatus> {
        loop {
            if let Some(status) = self.registry.poll_exit(run_id)? {
                return Ok(status);
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

/// Forward output as lines, splitting on `\n` and on the `\r` ffmpeg uses to redraw its stats line
fn spawn_line_reader<R>(mut reader: R, stream: Stream, tx: Sender<OutputLine>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        let mut pending: Vec<u8> = Vec::new();
        let send = |bytes: &[u8]| {
            let text = String::from_utf8_lossy(bytes).trim_end().to_string();
            if text.is_empty() {
                return true;
            }
            tx.send(OutputLine { stream, text }).is_ok()
        };

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            for &byte in &buf[..n] {
                if byte == b'\n' || byte == b'\r' {
                    if !send(&pending) {
                        return;
                    }
                    pending.clear();
                } else {
                    pending.push(byte);
                }
            }
        }
        send(&pending);
    });
}

fn remove_partial_output(path: &Path) {
    if !path.exists() {
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "removed partial output"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial output"),
    }
}

/// Shell-quoted command line, for logs
pub fn format_command(program: &Path, args: &[String]) -> String {
    let program = program.to_string_lossy();
    let parts = std::iter::once(program.as_ref()).chain(args.iter().map(String::as_str));
    shlex::try_join(parts.clone()).unwrap_or_else(|_| parts.collect::<Vec<_>>().join(" "))
}
