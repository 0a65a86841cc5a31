use clap::{Parser, Subcommand};
use std::path::PathBuf;

use hwconvert::engine::{CodecFamily, GpuVendor};

#[derive(Parser)]
#[command(name = "hwconvert")]
#[command(about = "Hardware-accelerated ffmpeg conversions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log engine decisions (probes, encoder choice, cancellation) at debug level
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the encoders the configured ffmpeg was built with
    Encoders,

    /// List the decoders and hardware acceleration methods of the configured ffmpeg
    Decoders,

    /// Resolve the encoder for a vendor and codec family
    Resolve {
        /// GPU vendor (nvidia, amd, intel, apple, cpu)
        #[arg(long)]
        vendor: GpuVendor,

        /// Codec family (h264, h265, av1)
        #[arg(long)]
        codec: CodecFamily,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the hardware decode arguments that would be used for a file
    PlanDecode {
        /// GPU vendor (defaults to config)
        #[arg(long)]
        vendor: Option<GpuVendor>,

        /// Path to the media file
        input: PathBuf,
    },

    /// Convert files (directories are scanned recursively)
    Convert {
        /// Files or directories to convert
        #[arg(required = true, value_name = "INPUT")]
        inputs: Vec<PathBuf>,

        /// Preset id (h264-mp4, h265-mp4, av1-mkv, remux-mkv, remux-mp4, mp3)
        #[arg(long, short)]
        preset: String,

        /// GPU vendor (defaults to config)
        #[arg(long)]
        vendor: Option<GpuVendor>,

        /// Output directory (defaults to config, then each input's directory)
        #[arg(long, short)]
        output_dir: Option<PathBuf>,

        /// Retry with software encoding when a GPU error allows it
        #[arg(long)]
        cpu_fallback: bool,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
