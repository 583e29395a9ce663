use crate::services::ffmpeg::{EngineLine, FfmpegCommand, FfmpegProgress, parse_engine_line};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

/// Lines of engine stderr kept for failure diagnostics.
const DIAGNOSTIC_TAIL_LINES: usize = 40;

const OUTPUT_CODEC: &str = "libmp3lame";
const OUTPUT_FORMAT: &str = "mp3";

/// Parameters for one silence-removal + MP3 transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeOptions {
    /// Target audio bitrate, e.g. "128k"
    pub bitrate: String,
    /// Minimum silence length (seconds) that gets removed
    pub min_silence: f64,
    /// Loudness below which audio counts as silence, e.g. "-50dB"
    pub silence_threshold: String,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            bitrate: "128k".to_string(),
            min_silence: 0.5,
            silence_threshold: "-50dB".to_string(),
        }
    }
}

impl TranscodeOptions {
    /// `silenceremove` filter: trim leading silence once, then every interior/trailing run.
    pub fn silence_filter(&self) -> String {
        let d = self.min_silence;
        let t = &self.silence_threshold;
        format!(
            "silenceremove=start_periods=1:start_duration={d}:start_threshold={t}:\
             stop_periods=-1:stop_duration={d}:stop_threshold={t}"
        )
    }

    pub fn to_command(&self, input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .audio_filter(self.silence_filter())
            .audio_codec(OUTPUT_CODEC)
            .audio_bitrate(self.bitrate.clone())
            .format(OUTPUT_FORMAT)
    }
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Input file does not exist: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Media engine not found: {0}")]
    EngineNotFound(String),

    #[error("FFmpeg processing failed: {message}")]
    EngineFailed {
        message: String,
        diagnostics: String,
        exit_code: Option<i32>,
    },

    #[error("FFmpeg timed out after {0} seconds")]
    Timeout(u64),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TranscodeError {
    /// Operator-facing description including captured engine output.
    pub fn details(&self) -> String {
        match self {
            TranscodeError::EngineFailed {
                message,
                diagnostics,
                ..
            } if !diagnostics.is_empty() => {
                format!("FFmpeg processing failed: {message}\n{diagnostics}")
            }
            other => other.to_string(),
        }
    }
}

/// Structural metadata for a media file.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AudioInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Codec of the first audio stream
    pub codec: Option<String>,
    /// Container format name(s) as reported by the engine
    pub format_name: Option<String>,
    /// Overall bitrate in bits/second
    pub bit_rate: Option<u64>,
    /// File size in bytes
    pub size: Option<u64>,
    pub streams: Vec<StreamInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StreamInfo {
    pub index: u32,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

/// External transcoding capability.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Remove silence from `input` and encode it to MP3 at `output`.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        options: &TranscodeOptions,
    ) -> Result<PathBuf, TranscodeError>;

    /// Read duration/codec/stream metadata for `path`.
    async fn probe(&self, path: &Path) -> Result<AudioInfo, TranscodeError>;
}

/// [`Transcoder`] backed by the ffmpeg / ffprobe command line tools.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    timeout_secs: Option<u64>,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn spawn_error(&self, program: &str, e: io::Error) -> TranscodeError {
        if e.kind() == io::ErrorKind::NotFound {
            TranscodeError::EngineNotFound(program.to_string())
        } else {
            TranscodeError::Io(e)
        }
    }
}

async fn ensure_input(path: &Path) -> Result<(), TranscodeError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(TranscodeError::MissingInput(path.to_path_buf())),
    }
}

/// Drains engine stderr: progress lines are logged, the rest is kept as a bounded tail.
async fn collect_engine_output(stderr: ChildStderr) -> String {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    let mut progress = FfmpegProgress::default();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);

    // Raw bytes: metadata tags are echoed as stored and need not be UTF-8.
    // Reading must continue to EOF or the engine dies on a closed pipe.
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to read engine stderr: {}", e);
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();

        match parse_engine_line(&line, &mut progress) {
            EngineLine::Progress { report: true } => {
                if let Some(percent) = progress.percent() {
                    debug!(
                        "Processing: {}% done (speed {:?})",
                        percent.round(),
                        progress.speed
                    );
                }
                if progress.is_complete {
                    debug!("Engine reported end of output");
                }
            }
            EngineLine::Progress { report: false } => {}
            EngineLine::Diagnostic => {
                if tail.len() == DIAGNOSTIC_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
    }

    Vec::from(tail).join("\n")
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        options: &TranscodeOptions,
    ) -> Result<PathBuf, TranscodeError> {
        ensure_input(input).await?;

        info!(
            "Options: bitrate={}, minSilence={}s, threshold={}",
            options.bitrate, options.min_silence, options.silence_threshold
        );

        let args = options.to_command(input, output).build_args();
        info!("FFmpeg command: {} {}", self.ffmpeg_path, args.join(" "));

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(&self.ffmpeg_path, e))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("ffmpeg stderr not captured"))?;
        let output_task = tokio::spawn(collect_engine_output(stderr));

        let status = match self.timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!("FFmpeg timed out after {} seconds, killing process", secs);
                    let _ = child.kill().await;
                    output_task.abort();
                    return Err(TranscodeError::Timeout(secs));
                }
            },
            None => child.wait().await?,
        };

        let diagnostics = output_task.await.unwrap_or_default();

        if status.success() {
            info!("Audio processing completed successfully");
            Ok(output.to_path_buf())
        } else {
            error!("FFmpeg error: exited with {}", status);
            error!("FFmpeg stderr: {}", diagnostics);
            Err(TranscodeError::EngineFailed {
                message: format!("ffmpeg exited with {status}"),
                diagnostics,
                exit_code: status.code(),
            })
        }
    }

    async fn probe(&self, path: &Path) -> Result<AudioInfo, TranscodeError> {
        ensure_input(path).await?;

        let mut command = Command::new(&self.ffprobe_path);
        command
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let probe = command.output();

        let output = match self.timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), probe)
                .await
                .map_err(|_| TranscodeError::Timeout(secs))?,
            None => probe.await,
        }
        .map_err(|e| self.spawn_error(&self.ffprobe_path, e))?;

        if !output.status.success() {
            return Err(TranscodeError::Probe(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        parse_probe_output(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

/// Convert ffprobe's `-print_format json` output into [`AudioInfo`].
pub fn parse_probe_output(stdout: &[u8]) -> Result<AudioInfo, TranscodeError> {
    let probe: FfprobeOutput =
        serde_json::from_slice(stdout).map_err(|e| TranscodeError::Probe(e.to_string()))?;

    let streams: Vec<StreamInfo> = probe
        .streams
        .into_iter()
        .map(|s| StreamInfo {
            index: s.index,
            codec_type: s.codec_type,
            codec_name: s.codec_name,
            sample_rate: s.sample_rate.and_then(|r| r.parse().ok()),
            channels: s.channels,
        })
        .collect();

    let codec = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .and_then(|s| s.codec_name.clone());

    Ok(AudioInfo {
        duration: probe
            .format
            .duration
            .and_then(|d| d.parse().ok())
            .unwrap_or(0.0),
        codec,
        format_name: probe.format.format_name,
        bit_rate: probe.format.bit_rate.and_then(|b| b.parse().ok()),
        size: probe.format.size.and_then(|s| s.parse().ok()),
        streams,
    })
}
