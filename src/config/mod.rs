use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Extra request-body allowance on top of `max_file_size` for multipart framing.
pub const MULTIPART_OVERHEAD: usize = 1024 * 1024;

const MIN_STALE_SCRATCH_SECS: u64 = 3600;
const UNBOUNDED_STALE_SCRATCH_SECS: u64 = 24 * 3600;

/// Runtime configuration for the audio processing service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Listen address (default: "0.0.0.0")
    pub host: String,

    /// Listen port (default: 3000)
    pub port: u16,

    /// Maximum uploaded file size in bytes (default: 50 MiB)
    pub max_file_size: usize,

    /// Directory holding per-request working files
    pub scratch_dir: PathBuf,

    /// ffmpeg executable (default: "ffmpeg")
    pub ffmpeg_path: String,

    /// ffprobe executable (default: "ffprobe")
    pub ffprobe_path: String,

    /// Upper bound on a single engine run in seconds, `None` waits forever (default: 300)
    pub transcode_timeout_secs: Option<u64>,

    /// Default output bitrate (default: "128k")
    pub default_bitrate: String,

    /// Default minimum silence length in seconds (default: 0.5)
    pub default_min_silence: f64,

    /// Default silence threshold (default: "-50dB")
    pub default_silence_threshold: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_file_size: 50 * 1024 * 1024, // 50 MiB
            scratch_dir: env::temp_dir().join("rust-audio-backend"),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            transcode_timeout_secs: Some(300),
            default_bitrate: "128k".to_string(),
            default_min_silence: 0.5,
            default_silence_threshold: "-50dB".to_string(),
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key/value source, falling back to defaults
    /// for missing or unparsable entries.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(default.host),

            port: parse_var(&lookup, "PORT").unwrap_or(default.port),

            max_file_size: parse_var(&lookup, "MAX_FILE_SIZE").unwrap_or(default.max_file_size),

            scratch_dir: lookup("SCRATCH_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.scratch_dir),

            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or(default.ffmpeg_path),

            ffprobe_path: lookup("FFPROBE_PATH").unwrap_or(default.ffprobe_path),

            transcode_timeout_secs: match parse_var(&lookup, "TRANSCODE_TIMEOUT_SECS") {
                Some(0) => None,
                Some(secs) => Some(secs),
                None => default.transcode_timeout_secs,
            },

            default_bitrate: lookup("DEFAULT_BITRATE").unwrap_or(default.default_bitrate),

            default_min_silence: parse_var(&lookup, "DEFAULT_MIN_SILENCE")
                .unwrap_or(default.default_min_silence),

            default_silence_threshold: lookup("DEFAULT_SILENCE_THRESHOLD")
                .unwrap_or(default.default_silence_threshold),
        }
    }

    /// Config for tests and local runs, rooted at the given scratch directory
    pub fn development(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            scratch_dir: scratch_dir.into(),
            transcode_timeout_secs: Some(60),
            ..Self::default()
        }
    }

    /// Age after which a working file can only belong to a dead process.
    pub fn stale_scratch_age(&self) -> Duration {
        let secs = match self.transcode_timeout_secs {
            Some(timeout) => (timeout * 2).max(MIN_STALE_SCRATCH_SECS),
            None => UNBOUNDED_STALE_SCRATCH_SECS,
        };
        Duration::from_secs(secs)
    }

    /// Request body ceiling enforced at the transport layer.
    pub fn body_limit(&self) -> usize {
        self.max_file_size + MULTIPART_OVERHEAD
    }
}
