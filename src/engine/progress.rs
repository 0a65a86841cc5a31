//! Parser for ffmpeg progress output.
//!
//! Two line shapes are understood:
//! - the human-readable stats line on stderr
//!   (`frame=  240 fps= 48 q=28.0 size=  1024kB time=00:00:08.00 bitrate=1048.6kbits/s speed=1.6x`)
//! - the `-progress` key=value channel, of which only `out_time_ms=` is used
//!
//! Parsing is stateless: every line stands on its own.

use super::types::ConversionProgress;

/// Parse one line of ffmpeg output into a progress sample.
///
/// Returns `None` for lines that carry no timestamp.
pub fn parse_progress_line(line: &str, total_duration_s: f64) -> Option<ConversionProgress> {
    // A -progress block repeats the position as out_time_us and out_time; only this key counts
    if let Some(micros) = token_value(line, "out_time_ms") {
        // ffmpeg reports out_time_ms in microseconds
        let micros = micros.parse::<i64>().ok()?;
        if micros < 0 {
            return None;
        }
        let seconds = micros as f64 / 1_000_000.0;
        return Some(ConversionProgress {
            percent: percent_of(seconds, total_duration_s),
            frame: 0,
            fps: 0.0,
            time: format_timestamp(seconds),
            bitrate: "N/A".to_string(),
            speed: "N/A".to_string(),
        });
    }

    let time = token_value(line, "time")?;
    let seconds = parse_timestamp(time)?;

    Some(ConversionProgress {
        percent: percent_of(seconds, total_duration_s),
        frame: token_value(line, "frame")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        fps: token_value(line, "fps")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0),
        time: time.to_string(),
        bitrate: token_value(line, "bitrate").unwrap_or("N/A").to_string(),
        speed: token_value(line, "speed").unwrap_or("N/A").to_string(),
    })
}

/// Percent complete, clamped to 0..=100; 0 when the duration is unknown
pub fn percent_of(seconds: f64, total_duration_s: f64) -> f64 {
    if total_duration_s > 0.0 && seconds.is_finite() {
        (seconds / total_duration_s * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Parse `HH:MM:SS.fraction` into seconds
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.trim().splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if hours < 0.0 || minutes < 0.0 || seconds < 0.0 {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn format_timestamp(seconds: f64) -> String {
    let total_cs = (seconds * 100.0).round() as u64;
    let hours = total_cs / 360_000;
    let minutes = (total_cs / 6_000) % 60;
    let secs = (total_cs / 100) % 60;
    let cs = total_cs % 100;
    format!("{:02}:{:02}:{:02}.{:02}", hours, minutes, secs, cs)
}

/// Find `key=` at a token boundary and return its value.
///
/// ffmpeg pads values (`frame=  240`), so spaces after `=` are skipped. A key
/// that is only a suffix of a longer key (`time=` inside `out_time=`) does not match.
fn token_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("{}=", key);
    let mut search_from = 0;
    while let Some(found) = line[search_from..].find(&needle) {
        let start = search_from + found;
        let at_boundary = line[..start]
            .chars()
            .next_back()
            .is_none_or(char::is_whitespace);
        let value_start = start + needle.len();
        if at_boundary {
            let rest = line[value_start..].trim_start();
            let value = rest.split_whitespace().next()?;
            return Some(value);
        }
        search_from = value_start;
    }
    None
}
