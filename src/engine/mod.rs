// Conversion orchestration engine - independent of the CLI

pub mod cancel;
pub mod capabilities;
pub mod classify;
pub mod decode;
pub mod encoders;
pub mod error;
pub mod log;
pub mod preset;
pub mod probe;
pub mod progress;
pub mod runner;
pub mod scan;
pub mod types;

pub use cancel::{CancelHandle, DEFAULT_CANCEL_GRACE, ProcessRegistry};
pub use capabilities::{CapabilityKind, CapabilityProber};
pub use classify::{classify, classify_failure};
pub use decode::{DEFAULT_RENDER_DEVICE, SourceCodec, plan_decode_args};
pub use encoders::{EncoderAvailability, encoder_name, hardware_encoder, resolve_encoder, software_encoder};
pub use error::{GpuEncoderError, GpuErrorKind};
pub use log::write_debug_log;
pub use preset::{BuiltinPreset, CustomPreset, Preset, PresetCategory, PresetContext};
pub use probe::{MediaInfo, ProbeError, probe_media, tool_version};
pub use progress::parse_progress_line;
pub use runner::{ConversionRequest, Converter, ProgressSink, RunnerConfig, output_path_for};
pub use types::{
    CANCELLED_MESSAGE, CodecFamily, ConversionProgress, ConversionResult, GpuVendor, HostPlatform,
};
