//! Hardware decode planning.
//!
//! Picks the `-hwaccel` arguments for a source codec on the current platform and
//! GPU vendor. Anything that is not confirmed available falls back to software
//! decode by returning no arguments; decode problems are never reported as errors.

use std::path::Path;

use tracing::debug;

use super::capabilities::CapabilityProber;
use super::types::{GpuVendor, HostPlatform};

/// Default VA-API render node on Linux
pub const DEFAULT_RENDER_DEVICE: &str = "/dev/dri/renderD128";

/// Source codecs that have hardware decode entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCodec {
    H264,
    Hevc,
    Av1,
    Vp9,
    Mpeg2,
    ProRes,
}

impl SourceCodec {
    /// Map an ffprobe `codec_name`; `h265` is accepted as an alias of `hevc`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" => Some(Self::H264),
            "hevc" | "h265" => Some(Self::Hevc),
            "av1" => Some(Self::Av1),
            "vp9" => Some(Self::Vp9),
            "mpeg2video" | "mpeg2" => Some(Self::Mpeg2),
            "prores" => Some(Self::ProRes),
            _ => None,
        }
    }
}

/// How a (platform, vendor) pair requests hardware decode
#[derive(Debug, Clone, Copy)]
struct DecodeRoute {
    hwaccel: &'static str,
    decoders: fn(SourceCodec) -> Option<&'static str>,
    /// Pass the decoder explicitly with `-c:v` (vendor-specific decoders)
    explicit_decoder: bool,
    /// Needs the DRM render node to exist
    render_device: bool,
}

fn videotoolbox_decoders(codec: SourceCodec) -> Option<&'static str> {
    match codec {
        SourceCodec::H264 => Some("h264"),
        SourceCodec::Hevc => Some("hevc"),
        SourceCodec::ProRes => Some("prores"),
        SourceCodec::Av1 | SourceCodec::Vp9 | SourceCodec::Mpeg2 => None,
    }
}

fn cuvid_decoders(codec: SourceCodec) -> Option<&'static str> {
    match codec {
        SourceCodec::H264 => Some("h264_cuvid"),
        SourceCodec::Hevc => Some("hevc_cuvid"),
        SourceCodec::Av1 => Some("av1_cuvid"),
        SourceCodec::Vp9 => Some("vp9_cuvid"),
        SourceCodec::Mpeg2 => Some("mpeg2_cuvid"),
        SourceCodec::ProRes => None,
    }
}

fn qsv_decoders(codec: SourceCodec) -> Option<&'static str> {
    match codec {
        SourceCodec::H264 => Some("h264_qsv"),
        SourceCodec::Hevc => Some("hevc_qsv"),
        SourceCodec::Av1 => Some("av1_qsv"),
        SourceCodec::Vp9 => Some("vp9_qsv"),
        SourceCodec::Mpeg2 => Some("mpeg2_qsv"),
        SourceCodec::ProRes => None,
    }
}

fn d3d11va_decoders(codec: SourceCodec) -> Option<&'static str> {
    match codec {
        SourceCodec::H264 => Some("h264"),
        SourceCodec::Hevc => Some("hevc"),
        SourceCodec::Av1 => Some("av1"),
        SourceCodec::Vp9 => Some("vp9"),
        SourceCodec::Mpeg2 => Some("mpeg2video"),
        SourceCodec::ProRes => None,
    }
}

fn vaapi_decoders(codec: SourceCodec) -> Option<&'static str> {
    match codec {
        SourceCodec::H264 => Some("h264"),
        SourceCodec::Hevc => Some("hevc"),
        SourceCodec::Av1 => Some("av1"),
        SourceCodec::Vp9 => Some("vp9"),
        SourceCodec::Mpeg2 => Some("mpeg2video"),
        SourceCodec::ProRes => None,
    }
}

fn route(platform: HostPlatform, vendor: GpuVendor) -> Option<DecodeRoute> {
    match (platform, vendor) {
        (HostPlatform::MacOs, GpuVendor::Apple) => Some(DecodeRoute {
            hwaccel: "videotoolbox",
            decoders: videotoolbox_decoders,
            explicit_decoder: false,
            render_device: false,
        }),
        (HostPlatform::Windows | HostPlatform::Linux, GpuVendor::Nvidia) => Some(DecodeRoute {
            hwaccel: "cuda",
            decoders: cuvid_decoders,
            explicit_decoder: true,
            render_device: false,
        }),
        (HostPlatform::Windows, GpuVendor::Intel) => Some(DecodeRoute {
            hwaccel: "qsv",
            decoders: qsv_decoders,
            explicit_decoder: true,
            render_device: false,
        }),
        (HostPlatform::Windows, GpuVendor::Amd) => Some(DecodeRoute {
            hwaccel: "d3d11va",
            decoders: d3d11va_decoders,
            explicit_decoder: false,
            render_device: false,
        }),
        (HostPlatform::Linux, GpuVendor::Amd | GpuVendor::Intel) => Some(DecodeRoute {
            hwaccel: "vaapi",
            decoders: vaapi_decoders,
            explicit_decoder: false,
            render_device: true,
        }),
        _ => None,
    }
}

/// Plan hardware decode arguments for a source.
///
/// Returns an empty list for the CPU vendor, unknown source codecs, unsupported
/// platform/vendor pairs, decoders missing from the ffmpeg build, or (on the
/// Linux VA-API route) a missing render device.
pub fn plan_decode_args(
    prober: &CapabilityProber,
    vendor: GpuVendor,
    platform: HostPlatform,
    source_codec: Option<&str>,
    render_device: &Path,
) -> Vec<String> {
    if vendor == GpuVendor::Cpu {
        return Vec::new();
    }
    let Some(codec) = source_codec.and_then(SourceCodec::from_name) else {
        debug!(?source_codec, "no hardware decode entry for source codec");
        return Vec::new();
    };
    let Some(route) = route(platform, vendor) else {
        debug!(?platform, %vendor, "no hardware decode route for platform");
        return Vec::new();
    };
    let Some(decoder) = (route.decoders)(codec) else {
        debug!(?codec, hwaccel = route.hwaccel, "codec not decodable on this route");
        return Vec::new();
    };

    if !prober.check_decoder_available(decoder) {
        debug!(decoder, "decoder missing from ffmpeg build, using software decode");
        return Vec::new();
    }
    if route.render_device && !render_device.exists() {
        debug!(
            device = %render_device.display(),
            "render device missing, using software decode"
        );
        return Vec::new();
    }

    let mut args = vec!["-hwaccel".to_string(), route.hwaccel.to_string()];
    if route.render_device {
        args.push("-hwaccel_device".to_string());
        args.push(render_device.to_string_lossy().to_string());
    }
    if route.explicit_decoder {
        args.push("-c:v".to_string());
        args.push(decoder.to_string());
    }

    debug!(?args, "hardware decode planned");
    args
}
