//! Shell-script stand-ins for ffmpeg and ffprobe.
//!
//! Each `FakeTools` lives in its own temp dir, so tests can run in parallel.
//! The fake ffmpeg answers `-hide_banner -encoders/-decoders/-hwaccels` from
//! fixed lists, records every invocation, and otherwise runs the supplied
//! script body with `$out` set to the last argument (the output path).

use hwconvert::engine::{HostPlatform, RunnerConfig};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

pub struct FakeTools {
    pub dir: TempDir,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

/// Writes two full `-progress` blocks (30 s and 60 s of a 120 s input), then a finished output
pub const SUCCESS_BODY: &str = r#"
echo "ffmpeg version fake" >&2
printf 'partial' > "$out"
block() {
  echo "frame=$1"
  echo "fps=25.00"
  echo "bitrate= 800.0kbits/s"
  echo "total_size=$(( $1 * 1000 ))"
  echo "out_time_us=$2"
  echo "out_time_ms=$2"
  echo "out_time=$3"
  echo "dup_frames=0"
  echo "drop_frames=0"
  echo "speed=1.5x"
  echo "progress=$4"
}
block 750 30000000 00:00:30.000000 continue
block 1500 60000000 00:01:00.000000 end
exit 0
"#;

/// Writes a partial output, reports progress, then runs until told to stop.
/// SIGTERM ends it with a failure status, the way ffmpeg does.
pub const LONG_RUNNING_BODY: &str = r#"
trap 'exit 255' TERM
printf 'partial' > "$out"
echo "out_time_ms=6000000"
while :; do sleep 0.05; done
"#;

/// Ignores SIGTERM and exits cleanly once `q` arrives on stdin, as ffmpeg does
pub const QUIT_ON_Q_BODY: &str = r#"
trap '' TERM
printf 'partial' > "$out"
echo "out_time_ms=6000000"
head -c 1 > /dev/null
exit 0
"#;

/// Like `LONG_RUNNING_BODY` but ignores SIGTERM, so only a kill stops it
pub const STUBBORN_BODY: &str = r#"
trap '' TERM
printf 'partial' > "$out"
echo "out_time_ms=6000000"
while :; do sleep 0.05; done
"#;

fn write_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{}", body)).expect("write fake tool");
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

/// Run a freshly written script once, retrying while the kernel still reports
/// it busy (another test thread may have forked while the file was open).
fn warm_up(path: &Path, args: &[&str]) {
    for _ in 0..50 {
        match Command::new(path).args(args).output() {
            Err(e) if e.raw_os_error() == Some(26) => thread::sleep(Duration::from_millis(20)),
            Err(e) => panic!("failed to run {}: {}", path.display(), e),
            Ok(_) => return,
        }
    }
    panic!("{} stayed busy", path.display());
}

fn listing(names: &[&str]) -> String {
    let mut text = String::from("Encoders:\n V..... = Video\n ------\n");
    for name in names {
        text.push_str(&format!(" V....D {:<24} fake codec\n", name));
    }
    text
}

impl FakeTools {
    pub fn new(encoders: &[&str], decoders: &[&str], duration_s: f64, run_body: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let ffmpeg = dir.path().join("ffmpeg");
        let ffprobe = dir.path().join("ffprobe");

        fs::write(dir.path().join("encoders.txt"), listing(encoders)).unwrap();
        fs::write(dir.path().join("decoders.txt"), listing(decoders)).unwrap();

        write_script(
            &ffmpeg,
            &format!(
                r#"here=$(dirname "$0")
echo "$*" >> "$here/invocations.log"
if [ "$1" = "-hide_banner" ]; then
  case "$2" in
    -encoders) cat "$here/encoders.txt" ;;
    -decoders) cat "$here/decoders.txt" ;;
    -hwaccels) printf 'Hardware acceleration methods:\n' ;;
  esac
  exit 0
fi
for out; do :; done
{}"#,
                run_body
            ),
        );

        write_script(
            &ffprobe,
            &format!(
                "cat <<'JSON'\n{{\"streams\":[{{\"codec_type\":\"video\",\"codec_name\":\"h264\"}}],\"format\":{{\"duration\":\"{}\"}}}}\nJSON\n",
                duration_s
            ),
        );

        warm_up(&ffmpeg, &["-hide_banner", "-version"]);
        warm_up(&ffprobe, &[]);

        Self {
            dir,
            ffmpeg,
            ffprobe,
        }
    }

    pub fn runner_config(&self, cancel_grace: Duration) -> RunnerConfig {
        RunnerConfig {
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
            render_device: self.dir.path().join("no-render-node"),
            cancel_grace,
            platform: HostPlatform::Linux,
            extra_args: Vec::new(),
        }
    }

    /// An input file inside the temp dir
    pub fn input(&self) -> PathBuf {
        let path = self.dir.path().join("input.mov");
        fs::write(&path, b"not really a movie").unwrap();
        path
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// Argument lines of every ffmpeg invocation so far
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("invocations.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Invocations that were conversions rather than capability queries
    pub fn conversion_invocations(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter(|line| !line.starts_with("-hide_banner"))
            .collect()
    }
}
