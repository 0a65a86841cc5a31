// Input probing using ffprobe

use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to execute {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffprobe failed for {path}: {stderr}")]
    Failed { path: String, stderr: String },

    #[error("failed to parse ffprobe JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

/// Duration and source codec of an input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    /// Seconds; 0 when unknown
    pub duration_s: f64,
    /// `codec_name` of the first video stream
    pub video_codec: Option<String>,
}

/// Probe a media file for its duration and first video codec
pub fn probe_media(ffprobe: &Path, input: &Path) -> Result<MediaInfo, ProbeError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(input)
        .output()
        .map_err(|source| ProbeError::Spawn {
            tool: ffprobe.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ProbeError::Failed {
            path: input.display().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_ffprobe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse ffprobe `-show_format -show_streams` JSON
pub fn parse_ffprobe_output(json: &str) -> Result<MediaInfo, ProbeError> {
    let probe: FfprobeOutput = serde_json::from_str(json)?;

    let duration_s = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0);

    let video_codec = probe
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .and_then(|s| s.codec_name);

    Ok(MediaInfo {
        duration_s,
        video_codec,
    })
}

/// First line of `<tool> -version`, or an error if the tool cannot run
pub fn tool_version(tool: &Path) -> anyhow::Result<String> {
    use anyhow::Context;

    let output = Command::new(tool)
        .arg("-version")
        .output()
        .with_context(|| {
            format!(
                "Failed to execute {}. Is it installed and in PATH?",
                tool.display()
            )
        })?;

    if !output.status.success() {
        anyhow::bail!("{} -version failed with status: {}", tool.display(), output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}
