// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::{DEFAULT_RENDER_DEVICE, GpuVendor, HostPlatform, RunnerConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// ffmpeg binary (name looked up in PATH, or an absolute path)
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    /// ffprobe binary (name looked up in PATH, or an absolute path)
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// GPU vendor used when --vendor is not given
    #[serde(default)]
    pub gpu_vendor: GpuVendor,

    /// Output directory used when --output-dir is not given (defaults to the input's directory)
    #[serde(default)]
    pub output_directory: Option<PathBuf>,

    /// How long ffmpeg gets to stop on its own after a cancel before it is killed
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,

    /// VAAPI render node for AMD/Intel decode on Linux
    #[serde(default = "default_render_device")]
    pub render_device: PathBuf,

    /// Extra ffmpeg arguments, shell-quoted, placed right before the output path
    #[serde(default)]
    pub extra_args: String,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_cancel_grace_ms() -> u64 {
    1500
}

fn default_render_device() -> PathBuf {
    PathBuf::from(DEFAULT_RENDER_DEVICE)
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            gpu_vendor: GpuVendor::Cpu, // Software until the user picks a GPU
            output_directory: None,
            cancel_grace_ms: default_cancel_grace_ms(),
            render_device: default_render_device(),
            extra_args: String::new(),
        }
    }
}

impl ConversionConfig {
    /// Split `extra_args` the way a shell would
    pub fn extra_args(&self) -> Result<Vec<String>> {
        if self.extra_args.trim().is_empty() {
            return Ok(Vec::new());
        }
        shlex::split(&self.extra_args)
            .with_context(|| format!("Invalid quoting in extra_args: {}", self.extra_args))
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("hwconvert")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("hwconvert")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            Self::from_toml(&contents).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })
        } else {
            let config = Config::default();

            // Best effort: a read-only config dir still gets the built-in defaults
            if let Err(e) = config.save() {
                tracing::warn!(error = %e, "could not create default config file");
                eprintln!(
                    "Using built-in defaults. Run 'hwconvert init-config' to create a config file."
                );
            }

            Ok(config)
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Engine settings for this config
    pub fn runner_config(&self) -> Result<RunnerConfig> {
        Ok(RunnerConfig {
            ffmpeg: self.tools.ffmpeg.clone(),
            ffprobe: self.tools.ffprobe.clone(),
            render_device: self.conversion.render_device.clone(),
            cancel_grace: Duration::from_millis(self.conversion.cancel_grace_ms),
            platform: HostPlatform::current(),
            extra_args: self.conversion.extra_args()?,
        })
    }
}
