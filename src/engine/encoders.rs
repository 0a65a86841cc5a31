//! Encoder selection and pre-flight validation.
//!
//! Maps a (vendor, codec family) pair to the concrete ffmpeg encoder and checks
//! it against the binary's compiled encoder set before anything is spawned.

use serde::Serialize;
use tracing::debug;

use super::capabilities::CapabilityProber;
use super::error::{GpuEncoderError, GpuErrorKind, av1_generation_requirement};
use super::types::{CodecFamily, GpuVendor};

/// Software encoder used for each codec family on the CPU path
pub fn software_encoder(codec: CodecFamily) -> &'static str {
    match codec {
        CodecFamily::H264 => "libx264",
        CodecFamily::H265 => "libx265",
        CodecFamily::Av1 => "libsvtav1",
    }
}

/// Hardware encoder configured for a vendor and codec family, if any
pub fn hardware_encoder(vendor: GpuVendor, codec: CodecFamily) -> Option<&'static str> {
    match (vendor, codec) {
        (GpuVendor::Nvidia, CodecFamily::H264) => Some("h264_nvenc"),
        (GpuVendor::Nvidia, CodecFamily::H265) => Some("hevc_nvenc"),
        (GpuVendor::Nvidia, CodecFamily::Av1) => Some("av1_nvenc"),
        (GpuVendor::Amd, CodecFamily::H264) => Some("h264_amf"),
        (GpuVendor::Amd, CodecFamily::H265) => Some("hevc_amf"),
        (GpuVendor::Amd, CodecFamily::Av1) => Some("av1_amf"),
        (GpuVendor::Intel, CodecFamily::H264) => Some("h264_qsv"),
        (GpuVendor::Intel, CodecFamily::H265) => Some("hevc_qsv"),
        (GpuVendor::Intel, CodecFamily::Av1) => Some("av1_qsv"),
        (GpuVendor::Apple, CodecFamily::H264) => Some("h264_videotoolbox"),
        (GpuVendor::Apple, CodecFamily::H265) => Some("hevc_videotoolbox"),
        (GpuVendor::Apple, CodecFamily::Av1) => None,
        (GpuVendor::Cpu, _) => None,
    }
}

/// Encoder name a run would use for the vendor, without validating it
pub fn encoder_name(vendor: GpuVendor, codec: CodecFamily) -> Option<&'static str> {
    match vendor {
        GpuVendor::Cpu => Some(software_encoder(codec)),
        _ => hardware_encoder(vendor, codec),
    }
}

/// Result of resolving a vendor/codec pair to a usable encoder
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderAvailability {
    pub available: bool,
    pub encoder_name: Option<String>,
    pub error: Option<GpuEncoderError>,
}

impl EncoderAvailability {
    fn ok(name: &str) -> Self {
        Self {
            available: true,
            encoder_name: Some(name.to_string()),
            error: None,
        }
    }

    fn unavailable(name: Option<&str>, error: GpuEncoderError) -> Self {
        Self {
            available: false,
            encoder_name: name.map(str::to_string),
            error: Some(error),
        }
    }

    /// Convert into a `Result`, surfacing the pre-flight error
    pub fn into_result(self) -> Result<String, GpuEncoderError> {
        match (self.available, self.encoder_name, self.error) {
            (true, Some(name), _) => Ok(name),
            (_, _, Some(err)) => Err(err),
            (_, name, None) => Err(GpuEncoderError::new(
                GpuErrorKind::EncoderUnavailable,
                format!(
                    "Encoder {} is not available",
                    name.as_deref().unwrap_or("(unknown)")
                ),
            )),
        }
    }
}

/// Resolve and validate the encoder for a vendor/codec pair.
///
/// Recomputed on every call; only the underlying compiled-encoder listing is cached.
pub fn resolve_encoder(
    prober: &CapabilityProber,
    vendor: GpuVendor,
    codec: CodecFamily,
) -> EncoderAvailability {
    if vendor == GpuVendor::Cpu {
        return EncoderAvailability::ok(software_encoder(codec));
    }

    let Some(name) = hardware_encoder(vendor, codec) else {
        debug!(%vendor, %codec, "no hardware encoder configured");
        let err = GpuEncoderError::new(
            GpuErrorKind::EncoderUnavailable,
            format!(
                "{} hardware encoding is not supported for {}",
                vendor.display_name(),
                codec.display_name()
            ),
        )
        .with_details(format!(
            "No {} encoder is configured for the {} codec family",
            vendor.api_name(),
            codec.display_name()
        ))
        .with_suggestion(format!(
            "Use CPU encoding for {} or choose a codec your GPU supports.",
            codec.display_name()
        ))
        .with_context(vendor, Some(codec));
        return EncoderAvailability::unavailable(None, err);
    };

    if prober.check_encoder_available(name) {
        debug!(%vendor, %codec, encoder = name, "hardware encoder available");
        return EncoderAvailability::ok(name);
    }

    debug!(%vendor, %codec, encoder = name, "hardware encoder missing from ffmpeg build");
    let suggestion = match (vendor, codec) {
        (GpuVendor::Nvidia, CodecFamily::Av1) => format!(
            "AV1 hardware encoding requires {}. Use H.264/H.265 or CPU encoding instead.",
            av1_generation_requirement(vendor).unwrap_or("a newer GPU")
        ),
        _ => format!(
            "Install an FFmpeg build with {} support and current {} drivers, or use CPU encoding.",
            vendor.api_name(),
            vendor.display_name()
        ),
    };
    let err = GpuEncoderError::new(
        GpuErrorKind::EncoderUnavailable,
        format!(
            "{} {} encoder is not available",
            vendor.display_name(),
            codec.display_name()
        ),
    )
    .with_details(format!(
        "Encoder '{}' is not present in this FFmpeg build",
        name
    ))
    .with_suggestion(suggestion)
    .with_context(vendor, Some(codec));

    EncoderAvailability::unavailable(Some(name), err)
}
