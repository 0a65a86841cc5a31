//! Conversion presets.
//!
//! The runner treats a preset as opaque: it asks for the category, the output
//! extension and the argument list. A handful of built-in presets back the CLI;
//! hosts with their own preset catalog implement [`Preset`] or use [`CustomPreset`].

use std::fmt;
use std::path::Path;

use super::encoders::encoder_name;
use super::types::{CodecFamily, GpuVendor};

/// What kind of output a preset produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetCategory {
    /// Re-encodes video with the given codec family
    Video(CodecFamily),
    Audio,
    /// Stream copy into a new container
    Remux,
}

impl PresetCategory {
    pub fn video_codec(&self) -> Option<CodecFamily> {
        match self {
            Self::Video(codec) => Some(*codec),
            _ => None,
        }
    }
}

/// Inputs a preset needs to build its arguments
#[derive(Debug, Clone, Copy)]
pub struct PresetContext<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub vendor: GpuVendor,
    /// Resolved encoder for video presets
    pub encoder: Option<&'a str>,
    /// User-supplied arguments placed right before the output path
    pub extra_args: &'a [String],
}

pub trait Preset: Send + Sync {
    fn id(&self) -> &str;
    fn category(&self) -> PresetCategory;
    /// Output file extension, without the dot
    fn extension(&self) -> &str;
    /// Arguments including `-i <input>` and ending with the output path
    fn build_args(&self, ctx: &PresetContext<'_>) -> Vec<String>;
}

/// Built-in presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinPreset {
    H264Mp4,
    H265Mp4,
    Av1Mkv,
    RemuxMkv,
    RemuxMp4,
    Mp3,
}

impl BuiltinPreset {
    pub const ALL: [BuiltinPreset; 6] = [
        Self::H264Mp4,
        Self::H265Mp4,
        Self::Av1Mkv,
        Self::RemuxMkv,
        Self::RemuxMp4,
        Self::Mp3,
    ];

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == id)
    }
}

impl fmt::Display for BuiltinPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Preset::id(self))
    }
}

impl Preset for BuiltinPreset {
    fn id(&self) -> &str {
        match self {
            Self::H264Mp4 => "h264-mp4",
            Self::H265Mp4 => "h265-mp4",
            Self::Av1Mkv => "av1-mkv",
            Self::RemuxMkv => "remux-mkv",
            Self::RemuxMp4 => "remux-mp4",
            Self::Mp3 => "mp3",
        }
    }

    fn category(&self) -> PresetCategory {
        match self {
            Self::H264Mp4 => PresetCategory::Video(CodecFamily::H264),
            Self::H265Mp4 => PresetCategory::Video(CodecFamily::H265),
            Self::Av1Mkv => PresetCategory::Video(CodecFamily::Av1),
            Self::RemuxMkv | Self::RemuxMp4 => PresetCategory::Remux,
            Self::Mp3 => PresetCategory::Audio,
        }
    }

    fn extension(&self) -> &str {
        match self {
            Self::H264Mp4 | Self::H265Mp4 | Self::RemuxMp4 => "mp4",
            Self::Av1Mkv | Self::RemuxMkv => "mkv",
            Self::Mp3 => "mp3",
        }
    }

    fn build_args(&self, ctx: &PresetContext<'_>) -> Vec<String> {
        let mut args = vec!["-i".to_string(), ctx.input.to_string_lossy().to_string()];

        match self.category() {
            PresetCategory::Video(codec) => {
                let encoder = ctx
                    .encoder
                    .or_else(|| encoder_name(ctx.vendor, codec))
                    .unwrap_or("libx264");
                args.extend(["-c:v".to_string(), encoder.to_string()]);
                args.extend(quality_args(encoder));
                if codec == CodecFamily::H265 && self.extension() == "mp4" {
                    // QuickTime only plays HEVC tagged as hvc1
                    args.extend(["-tag:v".to_string(), "hvc1".to_string()]);
                }
                if self.extension() == "mp4" {
                    args.extend(["-c:a", "aac", "-b:a", "192k"].map(String::from));
                    args.extend(["-movflags".to_string(), "+faststart".to_string()]);
                } else {
                    args.extend(["-c:a".to_string(), "copy".to_string()]);
                }
            }
            PresetCategory::Remux => {
                args.extend(["-map", "0", "-c", "copy"].map(String::from));
            }
            PresetCategory::Audio => {
                args.extend(["-vn", "-c:a", "libmp3lame", "-q:a", "2"].map(String::from));
            }
        }

        args.extend(ctx.extra_args.iter().cloned());
        args.push(ctx.output.to_string_lossy().to_string());
        args
    }
}

/// Constant-quality flags for each encoder
fn quality_args(encoder: &str) -> Vec<String> {
    let args: &[&str] = match encoder {
        "libx264" => &["-preset", "medium", "-crf", "23"],
        "libx265" => &["-preset", "medium", "-crf", "26"],
        "libsvtav1" => &["-preset", "8", "-crf", "32"],
        "h264_nvenc" | "hevc_nvenc" | "av1_nvenc" => &["-preset", "p5", "-rc", "vbr", "-cq", "24"],
        "h264_amf" | "hevc_amf" | "av1_amf" => {
            &["-quality", "balanced", "-rc", "cqp", "-qp_i", "24", "-qp_p", "24"]
        }
        "h264_qsv" | "hevc_qsv" | "av1_qsv" => &["-preset", "medium", "-global_quality", "24"],
        "h264_videotoolbox" | "hevc_videotoolbox" => &["-q:v", "65"],
        _ => &[],
    };
    args.iter().map(|s| s.to_string()).collect()
}

type ArgBuilder = dyn Fn(&PresetContext<'_>) -> Vec<String> + Send + Sync;

/// Preset backed by a caller-supplied argument builder
pub struct CustomPreset {
    id: String,
    category: PresetCategory,
    extension: String,
    builder: Box<ArgBuilder>,
}

impl CustomPreset {
    pub fn new<F>(
        id: impl Into<String>,
        category: PresetCategory,
        extension: impl Into<String>,
        builder: F,
    ) -> Self
    where
        F: Fn(&PresetContext<'_>) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            category,
            extension: extension.into(),
            builder: Box::new(builder),
        }
    }
}

impl fmt::Debug for CustomPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPreset")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

impl Preset for CustomPreset {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> PresetCategory {
        self.category
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn build_args(&self, ctx: &PresetContext<'_>) -> Vec<String> {
        (self.builder)(ctx)
    }
}
