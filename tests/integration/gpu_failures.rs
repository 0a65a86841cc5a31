use crate::common::fake_tools::{FakeTools, SUCCESS_BODY};
use hwconvert::engine::{
    BuiltinPreset, CodecFamily, ConversionProgress, ConversionRequest, ConversionResult, Converter,
    GpuErrorKind, GpuVendor,
};
use std::sync::Arc;
use std::time::Duration;

const GRACE: Duration = Duration::from_secs(5);

fn run(converter: &Converter, request: &ConversionRequest) -> ConversionResult {
    let mut sink = |_: &ConversionProgress| {};
    converter
        .run(request, &mut sink)
        .expect("encoder should pass pre-flight")
}

#[test]
fn missing_av1_nvenc_fails_before_spawning() {
    let tools = FakeTools::new(&["h264_nvenc", "hevc_nvenc"], &[], 120.0, SUCCESS_BODY);
    let converter = Converter::new(tools.runner_config(GRACE));
    let request = ConversionRequest::new(
        tools.input(),
        tools.output_dir(),
        Arc::new(BuiltinPreset::Av1Mkv),
        GpuVendor::Nvidia,
    );

    let mut samples = 0;
    let mut sink = |_: &ConversionProgress| samples += 1;
    let err = converter.run(&request, &mut sink).unwrap_err();
    assert_eq!(samples, 0);

    assert_eq!(err.kind, GpuErrorKind::EncoderUnavailable);
    assert!(err.suggestion.contains("RTX 40"), "{}", err.suggestion);
    assert!(err.can_retry_with_cpu);
    assert_eq!(err.gpu_vendor, Some(GpuVendor::Nvidia));
    assert_eq!(err.codec, Some(CodecFamily::Av1));
    assert!(tools.conversion_invocations().is_empty());
    assert!(!tools.output_dir().exists());
    assert!(!converter.is_active());
}

#[test]
fn nvenc_session_failure_is_a_capability_error() {
    let body = r#"
echo "[h264_nvenc @ 0x55d0] OpenEncodeSessionEx failed: unsupported device (2): (no details)" >&2
echo "Error initializing output stream 0:0 -- Error while opening encoder" >&2
exit 1
"#;
    let tools = FakeTools::new(&["h264_nvenc"], &[], 120.0, body);
    let converter = Converter::new(tools.runner_config(GRACE));
    let request = ConversionRequest::new(
        tools.input(),
        tools.output_dir(),
        Arc::new(BuiltinPreset::H264Mp4),
        GpuVendor::Nvidia,
    );

    let result = run(&converter, &request);
    assert!(!result.success);

    let err = request.classify_failure(&result).expect("should classify");
    assert_eq!(err.kind, GpuErrorKind::GpuCapability);
    assert!(err.details.contains("OpenEncodeSessionEx failed"));
    assert!(err.can_retry_with_cpu);
    assert_eq!(err.gpu_vendor, Some(GpuVendor::Nvidia));
    assert_eq!(err.codec, Some(CodecFamily::H264));
}

#[test]
fn amf_runtime_failure_is_a_capability_error() {
    let body = r#"
echo "[h264_amf @ 0x1] DLL amfrt64.dll failed to open" >&2
exit 1
"#;
    let tools = FakeTools::new(&["h264_amf"], &[], 120.0, body);
    let converter = Converter::new(tools.runner_config(GRACE));
    let request = ConversionRequest::new(
        tools.input(),
        tools.output_dir(),
        Arc::new(BuiltinPreset::H264Mp4),
        GpuVendor::Amd,
    );

    let result = run(&converter, &request);
    let err = request.classify_failure(&result).expect("should classify");
    // "amf" plus "failed" is an AMF runtime failure, which wins over the generic rules.
    assert_eq!(err.kind, GpuErrorKind::GpuCapability);
    assert!(err.message.contains("AMF"), "{}", err.message);
}

#[test]
fn shared_library_failure_on_intel_is_a_driver_error() {
    let body = r#"
echo "libva: dlopen of /usr/lib/dri/iHD_drv_video.so: cannot open shared object file" >&2
exit 1
"#;
    let tools = FakeTools::new(&["h264_qsv"], &[], 120.0, body);
    let converter = Converter::new(tools.runner_config(GRACE));
    let request = ConversionRequest::new(
        tools.input(),
        tools.output_dir(),
        Arc::new(BuiltinPreset::H264Mp4),
        GpuVendor::Intel,
    );

    let result = run(&converter, &request);
    let err = request.classify_failure(&result).expect("should classify");
    assert_eq!(err.kind, GpuErrorKind::DriverError);
    assert!(err.can_retry_with_cpu);
}

#[test]
fn unmatched_failure_stays_generic() {
    let body = r#"
echo "input.mov: No such file or directory" >&2
exit 1
"#;
    let tools = FakeTools::new(&["hevc_nvenc"], &[], 120.0, body);
    let converter = Converter::new(tools.runner_config(GRACE));
    let request = ConversionRequest::new(
        tools.input(),
        tools.output_dir(),
        Arc::new(BuiltinPreset::H265Mp4),
        GpuVendor::Nvidia,
    );

    let result = run(&converter, &request);
    assert!(!result.success);
    assert!(request.classify_failure(&result).is_none());
    assert!(result.error.unwrap().contains("No such file or directory"));
}

#[test]
fn software_retry_after_gpu_failure_succeeds() {
    let body = r#"
case "$*" in
  *h264_nvenc*)
    echo "[h264_nvenc @ 0x1] No capable devices found" >&2
    exit 1
    ;;
esac
printf 'done' > "$out"
exit 0
"#;
    let tools = FakeTools::new(&["h264_nvenc", "libx264"], &[], 120.0, body);
    let converter = Converter::new(tools.runner_config(GRACE));
    let request = ConversionRequest::new(
        tools.input(),
        tools.output_dir(),
        Arc::new(BuiltinPreset::H264Mp4),
        GpuVendor::Nvidia,
    );

    let first = run(&converter, &request);
    let err = request.classify_failure(&first).expect("should classify");
    assert!(err.can_retry_with_cpu);

    let retry = ConversionRequest {
        gpu_vendor: GpuVendor::Cpu,
        ..request
    };
    let second = run(&converter, &retry);
    assert!(second.success, "{:?}", second.error);

    let runs = tools.conversion_invocations();
    assert_eq!(runs.len(), 2);
    assert!(runs[1].contains("-c:v libx264"));
}
