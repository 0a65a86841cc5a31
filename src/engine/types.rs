use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Terminal error message that marks a caller-requested stop rather than a failure.
pub const CANCELLED_MESSAGE: &str = "Conversion cancelled";

/// GPU vendor whose encoder/decoder tables are consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    #[default]
    Cpu,
}

impl GpuVendor {
    pub const ALL: [GpuVendor; 5] = [
        GpuVendor::Nvidia,
        GpuVendor::Amd,
        GpuVendor::Intel,
        GpuVendor::Apple,
        GpuVendor::Cpu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nvidia => "nvidia",
            Self::Amd => "amd",
            Self::Intel => "intel",
            Self::Apple => "apple",
            Self::Cpu => "cpu",
        }
    }

    /// User-facing vendor name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Nvidia => "NVIDIA",
            Self::Amd => "AMD",
            Self::Intel => "Intel",
            Self::Apple => "Apple",
            Self::Cpu => "CPU",
        }
    }

    /// Name of the vendor's hardware encode API, as it appears in FFmpeg output
    pub fn api_name(&self) -> &'static str {
        match self {
            Self::Nvidia => "NVENC",
            Self::Amd => "AMF",
            Self::Intel => "Quick Sync",
            Self::Apple => "VideoToolbox",
            Self::Cpu => "software",
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GpuVendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nvidia" => Ok(Self::Nvidia),
            "amd" => Ok(Self::Amd),
            "intel" => Ok(Self::Intel),
            "apple" => Ok(Self::Apple),
            "cpu" | "software" => Ok(Self::Cpu),
            other => Err(format!("unknown GPU vendor '{}'", other)),
        }
    }
}

/// Target codec family for encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecFamily {
    H264,
    #[serde(alias = "hevc")]
    H265,
    Av1,
}

impl CodecFamily {
    pub const ALL: [CodecFamily; 3] = [CodecFamily::H264, CodecFamily::H265, CodecFamily::Av1];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
            Self::Av1 => "av1",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::H264 => "H.264",
            Self::H265 => "H.265/HEVC",
            Self::Av1 => "AV1",
        }
    }
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(Self::H264),
            "h265" | "hevc" => Ok(Self::H265),
            "av1" => Ok(Self::Av1),
            other => Err(format!("unknown codec family '{}'", other)),
        }
    }
}

/// Host operating system, used to pick the hardware decode table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    MacOs,
    Windows,
    Linux,
    Other,
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }
}

/// One progress sample parsed from transcoder output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionProgress {
    /// 0..=100
    pub percent: f64,
    pub frame: u64,
    pub fps: f64,
    /// Elapsed media time as HH:MM:SS.ss
    pub time: String,
    pub bitrate: String,
    pub speed: String,
}

/// Terminal value of a conversion; exactly one per request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub success: bool,
    pub output_path: PathBuf,
    /// Set only when `success` is false
    pub error: Option<String>,
}

impl ConversionResult {
    pub fn succeeded(output_path: PathBuf) -> Self {
        Self {
            success: true,
            output_path,
            error: None,
        }
    }

    pub fn failed(output_path: PathBuf, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output_path,
            error: Some(error.into()),
        }
    }

    pub fn cancelled(output_path: PathBuf) -> Self {
        Self::failed(output_path, CANCELLED_MESSAGE)
    }

    pub fn is_cancelled(&self) -> bool {
        !self.success && self.error.as_deref() == Some(CANCELLED_MESSAGE)
    }
}
