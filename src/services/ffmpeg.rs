//! FFmpeg argument building and `-progress` output parsing.

use std::path::{Path, PathBuf};

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            // `info` keeps the input "Duration:" banner line, used for progress percentages.
            log_level: "info".to_string(),
        }
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set audio filter graph.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Set output container format.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-nostats".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Machine-readable progress, interleaved with diagnostics on stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Progress state accumulated from FFmpeg's `-progress` key/value stream.
#[derive(Debug, Clone, Default)]
pub struct FfmpegProgress {
    /// Total input duration, from the "Duration:" banner line
    pub total_secs: Option<f64>,
    /// Output position in microseconds
    pub out_time_us: i64,
    /// Processing speed multiplier
    pub speed: Option<f64>,
    /// Set once FFmpeg reports `progress=end`
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Percentage done, if the input duration is known.
    pub fn percent(&self) -> Option<f64> {
        let total = self.total_secs.filter(|t| *t > 0.0)?;
        let done = self.out_time_us as f64 / 1_000_000.0;
        Some((done / total * 100.0).clamp(0.0, 100.0))
    }
}

/// How a single stderr line from FFmpeg was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineLine {
    /// A `-progress` field; `report` is set when a progress block ends.
    Progress { report: bool },
    /// Anything else: log output, warnings, errors.
    Diagnostic,
}

const PROGRESS_KEYS: &[&str] = &[
    "frame",
    "fps",
    "bitrate",
    "total_size",
    "out_time_us",
    "out_time_ms",
    "out_time",
    "dup_frames",
    "drop_frames",
    "speed",
    "progress",
];

/// Parse one line of FFmpeg stderr into `current`.
pub fn parse_engine_line(line: &str, current: &mut FfmpegProgress) -> EngineLine {
    let line = line.trim();

    if current.total_secs.is_none() {
        if let Some(rest) = line.strip_prefix("Duration:") {
            let stamp = rest.trim().split(',').next().unwrap_or("");
            current.total_secs = parse_timestamp(stamp);
            return EngineLine::Diagnostic;
        }
    }

    let Some((key, value)) = line.split_once('=') else {
        return EngineLine::Diagnostic;
    };
    if key.contains(' ') || !(PROGRESS_KEYS.contains(&key) || key.starts_with("stream_")) {
        return EngineLine::Diagnostic;
    }

    match key {
        // Despite its name, out_time_ms is also reported in microseconds.
        "out_time_us" | "out_time_ms" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_us = us.max(0);
            }
        }
        "speed" => {
            current.speed = value.strip_suffix('x').and_then(|s| s.trim().parse().ok());
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return EngineLine::Progress { report: true };
        }
        _ => {}
    }

    EngineLine::Progress { report: false }
}

/// Parse `HH:MM:SS.fraction` into seconds.
pub fn parse_timestamp(stamp: &str) -> Option<f64> {
    let mut parts = stamp.trim().splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
