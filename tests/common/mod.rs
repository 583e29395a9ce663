#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use rust_audio_backend::config::ServiceConfig;
use rust_audio_backend::services::audio_service::AudioService;
use rust_audio_backend::services::scratch::ScratchStorage;
use rust_audio_backend::services::transcoder::{
    AudioInfo, StreamInfo, TranscodeError, TranscodeOptions, Transcoder,
};
use rust_audio_backend::{AppState, create_app};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub const BOUNDARY: &str = "---------------------------audio-test-boundary";
pub const FAKE_MP3_HEADER: &[u8] = b"ID3";

/// Writes `ID3` followed by the input bytes, so every output can be traced to its input.
#[derive(Default)]
pub struct EchoTranscoder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Transcoder for EchoTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _options: &TranscodeOptions,
    ) -> Result<PathBuf, TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !input.exists() {
            return Err(TranscodeError::MissingInput(input.to_path_buf()));
        }
        let mut bytes = FAKE_MP3_HEADER.to_vec();
        bytes.extend(tokio::fs::read(input).await?);
        // Yield so concurrent requests interleave.
        tokio::task::yield_now().await;
        tokio::fs::write(output, bytes).await?;
        Ok(output.to_path_buf())
    }

    async fn probe(&self, path: &Path) -> Result<AudioInfo, TranscodeError> {
        let size = tokio::fs::metadata(path).await?.len();
        Ok(AudioInfo {
            duration: 2.0,
            codec: Some("vorbis".to_string()),
            format_name: Some("ogg".to_string()),
            bit_rate: None,
            size: Some(size),
            streams: vec![StreamInfo {
                index: 0,
                codec_type: Some("audio".to_string()),
                codec_name: Some("vorbis".to_string()),
                sample_rate: Some(48000),
                channels: Some(1),
            }],
        })
    }
}

/// Leaves a partial output behind and reports a failure naming the scratch input.
pub struct FailingTranscoder;

#[async_trait]
impl Transcoder for FailingTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _options: &TranscodeOptions,
    ) -> Result<PathBuf, TranscodeError> {
        tokio::fs::write(output, b"partial").await?;
        Err(TranscodeError::EngineFailed {
            message: "ffmpeg exited with exit status: 1".to_string(),
            diagnostics: format!(
                "{}: Invalid data found when processing input",
                input.display()
            ),
            exit_code: Some(1),
        })
    }

    async fn probe(&self, _path: &Path) -> Result<AudioInfo, TranscodeError> {
        Err(TranscodeError::Probe("Invalid data found".to_string()))
    }
}

pub struct TestApp {
    pub app: Router,
    pub scratch: TempDir,
}

impl TestApp {
    pub fn scratch_entries(&self) -> Vec<String> {
        std::fs::read_dir(self.scratch.path())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub fn setup_app(transcoder: Arc<dyn Transcoder>) -> TestApp {
    setup_app_with(transcoder, |_| {})
}

pub fn setup_app_with(
    transcoder: Arc<dyn Transcoder>,
    configure: impl FnOnce(&mut ServiceConfig),
) -> TestApp {
    let scratch = tempfile::tempdir().unwrap();
    let mut config = ServiceConfig::development(scratch.path());
    configure(&mut config);

    let audio_service = Arc::new(AudioService::new(
        ScratchStorage::new(scratch.path()),
        transcoder,
        &config,
    ));
    let app = create_app(AppState {
        config,
        audio_service,
    });

    TestApp { app, scratch }
}

pub fn multipart_body(
    field_name: &str,
    filename: Option<&str>,
    content_type: &str,
    data: &[u8],
) -> Vec<u8> {
    let disposition = match filename {
        Some(name) => format!("form-data; name=\"{field_name}\"; filename=\"{name}\""),
        None => format!("form-data; name=\"{field_name}\""),
    };
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: {disposition}\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
