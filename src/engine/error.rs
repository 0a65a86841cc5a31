use serde::Serialize;
use thiserror::Error;

use super::types::{CodecFamily, GpuVendor};

/// Actionable category of a GPU encode failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuErrorKind {
    /// Encoder missing from the ffmpeg build, or no encoder configured for vendor/codec
    EncoderUnavailable,
    /// Encoder is built in but the device or driver rejected it at runtime
    GpuCapability,
    /// A vendor library or driver failed to load
    DriverError,
}

impl GpuErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EncoderUnavailable => "encoder_unavailable",
            Self::GpuCapability => "gpu_capability",
            Self::DriverError => "driver_error",
        }
    }
}

/// Structured GPU encoder error, produced either before spawning or from a failed run's stderr
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct GpuEncoderError {
    pub kind: GpuErrorKind,
    pub message: String,
    pub details: String,
    pub suggestion: String,
    #[serde(rename = "canRetryWithCPU")]
    pub can_retry_with_cpu: bool,
    pub codec: Option<CodecFamily>,
    pub gpu_vendor: Option<GpuVendor>,
}

impl GpuEncoderError {
    pub fn new(kind: GpuErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: String::new(),
            suggestion: String::new(),
            can_retry_with_cpu: true,
            codec: None,
            gpu_vendor: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    pub fn with_context(mut self, vendor: GpuVendor, codec: Option<CodecFamily>) -> Self {
        self.gpu_vendor = Some(vendor);
        self.codec = codec;
        self
    }
}

/// Minimum GPU generation needed for hardware AV1 encoding, if the vendor has one
pub(crate) fn av1_generation_requirement(vendor: GpuVendor) -> Option<&'static str> {
    match vendor {
        GpuVendor::Nvidia => Some("an NVIDIA RTX 40-series (Ada Lovelace) GPU or newer"),
        GpuVendor::Amd => Some("an AMD Radeon RX 7000-series (RDNA 3) GPU or newer"),
        GpuVendor::Intel | GpuVendor::Apple | GpuVendor::Cpu => None,
    }
}
