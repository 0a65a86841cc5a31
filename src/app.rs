use crate::cli::{Cli, Commands};
use hwconvert::config::Config;
use hwconvert::engine::{
    self, BuiltinPreset, CancelHandle, CodecFamily, ConversionProgress, ConversionRequest,
    ConversionResult, Converter, GpuEncoderError, GpuVendor, Preset, ProgressSink,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub fn run(cli: Cli) {
    match cli.command {
        Commands::Encoders => handle_encoders(),
        Commands::Decoders => handle_decoders(),
        Commands::Resolve {
            vendor,
            codec,
            json,
        } => handle_resolve(vendor, codec, json),
        Commands::PlanDecode { vendor, input } => handle_plan_decode(vendor, &input),
        Commands::Convert {
            inputs,
            preset,
            vendor,
            output_dir,
            cpu_fallback,
        } => handle_convert(&inputs, &preset, vendor, output_dir, cpu_fallback),
        Commands::InitConfig => handle_init_config(),
    }
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: {:#}", e);
        Config::default()
    })
}

fn converter(config: &Config) -> Converter {
    match config.runner_config() {
        Ok(runner) => Converter::new(runner),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn print_sorted(title: &str, names: &std::collections::HashSet<String>) {
    let mut names: Vec<&String> = names.iter().collect();
    names.sort();
    println!("{} ({}):", title, names.len());
    for name in names {
        println!("  {}", name);
    }
}

fn handle_encoders() {
    let config = load_config();
    if let Err(e) = engine::tool_version(&config.tools.ffmpeg) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
    let converter = converter(&config);
    print_sorted("Encoders", converter.prober().list_encoders());
}

fn handle_decoders() {
    let config = load_config();
    if let Err(e) = engine::tool_version(&config.tools.ffmpeg) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
    let converter = converter(&config);
    print_sorted("Decoders", converter.prober().list_decoders());
    println!();
    print_sorted("Hardware acceleration methods", converter.prober().list_hwaccels());
}

fn handle_resolve(vendor: GpuVendor, codec: CodecFamily, json: bool) {
    let config = load_config();
    let availability = converter(&config).resolve_encoder(vendor, codec);

    if json {
        match serde_json::to_string_pretty(&availability) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
    } else if let Some(name) = availability.encoder_name.as_deref().filter(|_| availability.available) {
        println!(
            "{} encoder on {}: {}",
            codec.display_name(),
            vendor.display_name(),
            name
        );
    } else if let Some(err) = &availability.error {
        print_gpu_error(err);
    }

    if !availability.available {
        process::exit(1);
    }
}

fn handle_plan_decode(vendor: Option<GpuVendor>, input: &Path) {
    let config = load_config();
    let vendor = vendor.unwrap_or(config.conversion.gpu_vendor);
    let media = match engine::probe_media(&config.tools.ffprobe, input) {
        Ok(media) => media,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let converter = converter(&config);
    let args = converter.plan_decode_args(vendor, media.video_codec.as_deref());
    println!(
        "Source codec: {}",
        media.video_codec.as_deref().unwrap_or("(none)")
    );
    if args.is_empty() {
        println!("Hardware decode: none (software decode)");
    } else {
        println!("Hardware decode: {}", args.join(" "));
    }
}

/// Prints progress to the terminal and copies raw ffmpeg output into hwconvert.log
struct CliSink {
    last_percent: i64,
    log_enabled: bool,
}

impl CliSink {
    fn new() -> Self {
        Self {
            last_percent: -1,
            log_enabled: true,
        }
    }

    fn finish_line(&self) {
        if self.last_percent >= 0 {
            eprintln!();
        }
    }
}

impl ProgressSink for CliSink {
    fn on_progress(&mut self, progress: &ConversionProgress) {
        let percent = progress.percent.floor() as i64;
        if percent == self.last_percent {
            return;
        }
        self.last_percent = percent;
        eprint!(
            "\r  {:>3}%  time {}  speed {}  ",
            percent, progress.time, progress.speed
        );
        let _ = std::io::stderr().flush();
    }

    fn on_output_line(&mut self, line: &str) {
        if !self.log_enabled {
            return;
        }
        if let Err(e) = engine::write_debug_log(line) {
            tracing::warn!(error = %e, "disabling ffmpeg output log");
            self.log_enabled = false;
        }
    }
}

/// Ctrl+C state for a batch: the first press cancels politely and stops the
/// batch, a second press kills the running ffmpeg
#[derive(Clone)]
struct Interrupt {
    requested: Arc<AtomicBool>,
    cancel: CancelHandle,
}

impl Interrupt {
    fn new(cancel: CancelHandle) -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            cancel,
        }
    }

    /// Returns true when this press forced the cancel
    fn trigger(&self) -> bool {
        let force = self.requested.swap(true, Ordering::SeqCst);
        self.cancel.cancel(force);
        force
    }

    fn requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn install(&self) {
        let interrupt = self.clone();
        let installed = ctrlc::set_handler(move || {
            if interrupt.trigger() {
                eprintln!("\nReceived Ctrl+C again, stopping ffmpeg now...");
            } else {
                eprintln!("\nReceived Ctrl+C, cancelling (press again to force)...");
            }
        });
        if let Err(e) = installed {
            tracing::warn!(error = %e, "could not install Ctrl+C handler");
        }
    }
}

fn handle_convert(
    inputs: &[PathBuf],
    preset_id: &str,
    vendor: Option<GpuVendor>,
    output_dir: Option<PathBuf>,
    cpu_fallback: bool,
) {
    let Some(preset) = BuiltinPreset::from_id(preset_id) else {
        let ids: Vec<String> = BuiltinPreset::ALL.iter().map(|p| p.to_string()).collect();
        eprintln!("Unknown preset '{}'. Available: {}", preset_id, ids.join(", "));
        process::exit(2);
    };
    let preset: Arc<dyn Preset> = Arc::new(preset);

    let config = load_config();
    let vendor = vendor.unwrap_or(config.conversion.gpu_vendor);
    let output_dir = output_dir.or_else(|| config.conversion.output_directory.clone());

    let files = match engine::scan::collect_inputs(inputs) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error scanning inputs: {:#}", e);
            process::exit(1);
        }
    };
    if files.is_empty() {
        println!("No media files found.");
        return;
    }

    let converter = converter(&config);
    let interrupt = Interrupt::new(converter.cancel_handle());
    interrupt.install();

    let mut failures = 0usize;
    for input in files {
        if interrupt.requested() {
            println!("Interrupted, skipping remaining files.");
            break;
        }
        let directory = output_dir
            .clone()
            .or_else(|| {
                input
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
            })
            .unwrap_or_else(|| PathBuf::from("."));
        let request = ConversionRequest::new(input, directory, Arc::clone(&preset), vendor);
        if !convert_one(&converter, request, cpu_fallback) {
            failures += 1;
        }
    }

    if failures > 0 {
        eprintln!("{} conversion(s) failed", failures);
        process::exit(1);
    }
}

/// Run one request, retrying in software when allowed; true on success
fn convert_one(converter: &Converter, request: ConversionRequest, cpu_fallback: bool) -> bool {
    println!(
        "Converting {} -> {} ({}, {})",
        request.input_path.display(),
        request.output_path().display(),
        request.preset.id(),
        request.gpu_vendor.api_name()
    );

    let mut sink = CliSink::new();
    let outcome = converter.run(&request, &mut sink);
    sink.finish_line();

    let gpu_error = match outcome {
        Ok(result) if result.is_cancelled() => {
            println!("Cancelled, partial output removed");
            return false;
        }
        Ok(result) => match report_result(&request, &result) {
            Some(err) => err,
            None => return result.success,
        },
        Err(err) => err,
    };

    print_gpu_error(&gpu_error);
    if cpu_fallback && gpu_error.can_retry_with_cpu && request.gpu_vendor.is_hardware() {
        println!("Retrying with software encoding...");
        let retry = ConversionRequest {
            gpu_vendor: GpuVendor::Cpu,
            ..request
        };
        return convert_one(converter, retry, false);
    }
    false
}

/// Print a finished result; returns the GPU error when the failure classifies as one
fn report_result(request: &ConversionRequest, result: &ConversionResult) -> Option<GpuEncoderError> {
    if result.success {
        println!("Done: {}", result.output_path.display());
        return None;
    }
    if result.is_cancelled() {
        println!("Cancelled");
        return None;
    }
    if let Some(err) = request.classify_failure(result) {
        return Some(err);
    }
    eprintln!(
        "Failed: {}",
        result.error.as_deref().unwrap_or("unknown error")
    );
    None
}

fn print_gpu_error(err: &GpuEncoderError) {
    eprintln!("GPU error [{}]: {}", err.kind.as_str(), err.message);
    if !err.details.is_empty() {
        eprintln!("  Details: {}", err.details.replace('\n', "\n           "));
    }
    if !err.suggestion.is_empty() {
        eprintln!("  Suggestion: {}", err.suggestion);
    }
    if err.can_retry_with_cpu {
        eprintln!("  Software encoding can be used instead (--cpu-fallback).");
    }
}

fn handle_init_config() {
    match Config::load() {
        Ok(cfg) => {
            match Config::config_path() {
                Ok(path) => println!("Config loaded successfully from {}", path.display()),
                Err(e) => println!("Config loaded, but config path unknown: {:#}", e),
            }
            println!("{:#?}", cfg);
        }
        Err(e) => {
            println!("Config missing or invalid: {:#}", e);
            println!("Creating default config...");

            let cfg = Config::default();
            if let Err(err) = cfg.save() {
                eprintln!("Failed to save default config: {:#}", err);
                process::exit(1);
            } else {
                match Config::config_path() {
                    Ok(path) => println!("Default config saved to {}", path.display()),
                    Err(e) => println!("Default config saved (path unknown): {:#}", e),
                }
            }
        }
    }
}
