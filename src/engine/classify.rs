//! Classification of failed-run diagnostics into GPU error kinds.
//!
//! Rules are evaluated in order and the first match wins. Vendor rules come
//! first and only apply to their vendor; generic rules follow. New rules are
//! added by appending to the relevant group in [`RULES`].

use super::error::{GpuEncoderError, GpuErrorKind, av1_generation_requirement};
use super::preset::PresetCategory;
use super::types::{CodecFamily, ConversionResult, GpuVendor};

/// Lines of diagnostic text kept in `details`
const DETAIL_TAIL_LINES: usize = 12;

struct Context<'a> {
    vendor: GpuVendor,
    codec: Option<CodecFamily>,
    details: &'a str,
}

struct Rule {
    /// `None` applies to every vendor
    vendor: Option<GpuVendor>,
    /// Receives the lowercased diagnostic text
    matches: fn(&str) -> bool,
    build: fn(&Context<'_>) -> GpuEncoderError,
}

const RULES: &[Rule] = &[
    // NVIDIA
    Rule {
        vendor: Some(GpuVendor::Nvidia),
        matches: nvenc_init_failed,
        build: nvenc_init_error,
    },
    Rule {
        vendor: Some(GpuVendor::Nvidia),
        matches: not_capable_or_unsupported,
        build: vendor_unsupported_error,
    },
    // AMD
    Rule {
        vendor: Some(GpuVendor::Amd),
        matches: amf_failed,
        build: vendor_runtime_error,
    },
    Rule {
        vendor: Some(GpuVendor::Amd),
        matches: not_supported,
        build: vendor_unsupported_error,
    },
    // Intel
    Rule {
        vendor: Some(GpuVendor::Intel),
        matches: qsv_failed,
        build: vendor_runtime_error,
    },
    // Apple
    Rule {
        vendor: Some(GpuVendor::Apple),
        matches: videotoolbox_failed,
        build: vendor_runtime_error,
    },
    // Generic
    Rule {
        vendor: None,
        matches: encoder_not_found,
        build: encoder_not_found_error,
    },
    Rule {
        vendor: None,
        matches: library_load_failed,
        build: driver_error,
    },
];

/// Classify diagnostic output from a failed run.
///
/// Returns `None` when nothing matches; the caller then shows the raw text as a
/// generic failure.
pub fn classify(
    diagnostics: &str,
    vendor: GpuVendor,
    codec: Option<CodecFamily>,
) -> Option<GpuEncoderError> {
    let lower = diagnostics.to_lowercase();
    let tail = tail_lines(diagnostics, DETAIL_TAIL_LINES);
    let ctx = Context {
        vendor,
        codec,
        details: &tail,
    };

    RULES
        .iter()
        .filter(|rule| rule.vendor.is_none_or(|v| v == vendor))
        .find(|rule| (rule.matches)(&lower))
        .map(|rule| (rule.build)(&ctx).with_context(vendor, codec))
}

/// Classify a finished run if it qualifies: a failed, non-cancelled run of a
/// video preset on a hardware vendor.
pub fn classify_failure(
    result: &ConversionResult,
    category: PresetCategory,
    vendor: GpuVendor,
) -> Option<GpuEncoderError> {
    if result.success || result.is_cancelled() || vendor == GpuVendor::Cpu {
        return None;
    }
    let codec = category.video_codec()?;
    classify(result.error.as_deref()?, vendor, Some(codec))
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn nvenc_init_failed(text: &str) -> bool {
    contains_any(
        text,
        &[
            "no capable devices found",
            "openencodesessionex failed",
            "cannot load libnvidia-encode",
            "cannot load nvencodeapi",
            "cannot load libcuda",
            "cannot load nvcuda",
            "cuinit failed",
            "nvenc api version",
        ],
    )
}

fn not_capable_or_unsupported(text: &str) -> bool {
    contains_any(text, &["not capable", "unsupported"])
}

fn amf_failed(text: &str) -> bool {
    text.contains("amf") && contains_any(text, &["failed", "error"])
}

fn not_supported(text: &str) -> bool {
    contains_any(text, &["not supported", "unsupported"])
}

fn qsv_failed(text: &str) -> bool {
    contains_any(text, &["qsv", "mfx", "quick sync"])
        && contains_any(text, &["failed", "not found", "error"])
}

fn videotoolbox_failed(text: &str) -> bool {
    text.contains("videotoolbox") && contains_any(text, &["failed", "error"])
}

fn encoder_not_found(text: &str) -> bool {
    if text.contains("unknown encoder") {
        return true;
    }
    text.lines().any(|line| {
        line.find("encoder")
            .is_some_and(|at| line[at..].contains("not found"))
    })
}

fn library_load_failed(text: &str) -> bool {
    contains_any(
        text,
        &[
            "cannot load",
            "could not load",
            "failed to load",
            "error loading shared librar",
            "cannot open shared object file",
        ],
    )
}

fn nvenc_init_error(ctx: &Context<'_>) -> GpuEncoderError {
    GpuEncoderError::new(
        GpuErrorKind::GpuCapability,
        "NVIDIA NVENC could not be initialized on this system",
    )
    .with_details(ctx.details)
    .with_suggestion(
        "Make sure an NVENC-capable NVIDIA GPU is installed with current drivers, or use CPU encoding.",
    )
}

fn vendor_unsupported_error(ctx: &Context<'_>) -> GpuEncoderError {
    let vendor = ctx.vendor;
    let (message, suggestion) = match (ctx.codec, av1_generation_requirement(vendor)) {
        (Some(CodecFamily::Av1), Some(requirement)) => (
            format!("Your {} GPU does not support AV1 hardware encoding", vendor.display_name()),
            format!(
                "AV1 hardware encoding requires {}. Use H.264/H.265 or CPU encoding instead.",
                requirement
            ),
        ),
        (codec, _) => (
            format!(
                "Your {} GPU does not support {} hardware encoding",
                vendor.display_name(),
                codec.map(|c| c.display_name()).unwrap_or("this")
            ),
            "Choose a different codec or use CPU encoding.".to_string(),
        ),
    };
    GpuEncoderError::new(GpuErrorKind::GpuCapability, message)
        .with_details(ctx.details)
        .with_suggestion(suggestion)
}

fn vendor_runtime_error(ctx: &Context<'_>) -> GpuEncoderError {
    let vendor = ctx.vendor;
    GpuEncoderError::new(
        GpuErrorKind::GpuCapability,
        format!("{} {} encoding failed", vendor.display_name(), vendor.api_name()),
    )
    .with_details(ctx.details)
    .with_suggestion(format!(
        "Update your {} graphics drivers, or use CPU encoding.",
        vendor.display_name()
    ))
}

fn encoder_not_found_error(ctx: &Context<'_>) -> GpuEncoderError {
    GpuEncoderError::new(
        GpuErrorKind::EncoderUnavailable,
        "The requested encoder is not available in this FFmpeg build",
    )
    .with_details(ctx.details)
    .with_suggestion("Install an FFmpeg build with hardware encoder support, or use CPU encoding.")
}

fn driver_error(ctx: &Context<'_>) -> GpuEncoderError {
    GpuEncoderError::new(
        GpuErrorKind::DriverError,
        format!("A {} driver library failed to load", ctx.vendor.display_name()),
    )
    .with_details(ctx.details)
    .with_suggestion(format!(
        "Install or update your {} graphics drivers. CPU encoding will work in the meantime.",
        ctx.vendor.display_name()
    ))
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
