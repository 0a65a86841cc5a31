//! FFmpeg build capability probing.
//!
//! Lists the encoders, decoders and hwaccel methods the ffmpeg binary was
//! compiled with. Each listing is run at most once per prober and cached for
//! its lifetime; a binary that cannot be executed yields an empty set.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Encoders,
    Decoders,
    Hwaccels,
}

impl CapabilityKind {
    fn flag(&self) -> &'static str {
        match self {
            Self::Encoders => "-encoders",
            Self::Decoders => "-decoders",
            Self::Hwaccels => "-hwaccels",
        }
    }
}

/// Cached view of what the ffmpeg build supports
#[derive(Debug)]
pub struct CapabilityProber {
    ffmpeg: PathBuf,
    encoders: OnceLock<HashSet<String>>,
    decoders: OnceLock<HashSet<String>>,
    hwaccels: OnceLock<HashSet<String>>,
}

impl CapabilityProber {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            encoders: OnceLock::new(),
            decoders: OnceLock::new(),
            hwaccels: OnceLock::new(),
        }
    }

    /// Prober whose encoder/decoder sets are already known; never spawns ffmpeg for them.
    pub fn from_sets<E, D>(encoders: E, decoders: D) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let prober = Self::new("ffmpeg");
        let _ = prober
            .encoders
            .set(encoders.into_iter().map(Into::into).collect());
        let _ = prober
            .decoders
            .set(decoders.into_iter().map(Into::into).collect());
        let _ = prober.hwaccels.set(HashSet::new());
        prober
    }

    pub fn list_encoders(&self) -> &HashSet<String> {
        self.encoders
            .get_or_init(|| self.query(CapabilityKind::Encoders))
    }

    pub fn list_decoders(&self) -> &HashSet<String> {
        self.decoders
            .get_or_init(|| self.query(CapabilityKind::Decoders))
    }

    pub fn list_hwaccels(&self) -> &HashSet<String> {
        self.hwaccels
            .get_or_init(|| self.query(CapabilityKind::Hwaccels))
    }

    pub fn check_encoder_available(&self, name: &str) -> bool {
        self.list_encoders().contains(name)
    }

    pub fn check_decoder_available(&self, name: &str) -> bool {
        self.list_decoders().contains(name)
    }

    fn query(&self, kind: CapabilityKind) -> HashSet<String> {
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", kind.flag()])
            .output();

        let set = match output {
            Ok(out) => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                match kind {
                    CapabilityKind::Hwaccels => parse_hwaccel_listing(&stdout),
                    _ => parse_codec_listing(&stdout),
                }
            }
            Err(e) => {
                warn!(
                    ffmpeg = %self.ffmpeg.display(),
                    error = %e,
                    "could not run ffmpeg capability listing, assuming nothing is available"
                );
                HashSet::new()
            }
        };

        debug!(kind = ?kind, count = set.len(), "ffmpeg capability listing cached");
        set
    }
}

/// Parse `ffmpeg -encoders` / `-decoders` output.
///
/// Entries look like ` V....D libx264   libx264 H.264 / AVC ...`: a six character
/// flag column followed by the codec name. Legend lines (` V..... = Video`) are skipped.
pub fn parse_codec_listing(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let flags = tokens.next()?;
            let name = tokens.next()?;
            if is_flag_column(flags) && name != "=" {
                Some(name.to_string())
            } else {
                None
            }
        })
        .collect()
}

fn is_flag_column(token: &str) -> bool {
    token.len() == 6
        && token
            .chars()
            .all(|c| matches!(c, 'V' | 'A' | 'S' | 'D' | 'F' | 'X' | 'B' | 'I' | 'L' | '.'))
}

/// Parse `ffmpeg -hwaccels` output: a header line followed by one method per line.
pub fn parse_hwaccel_listing(output: &str) -> HashSet<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .filter(|line| !line.contains(char::is_whitespace))
        .map(str::to_string)
        .collect()
}
