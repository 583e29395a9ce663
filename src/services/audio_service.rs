use crate::api::error::AppError;
use crate::config::ServiceConfig;
use crate::services::ingest::{UploadIngestor, UploadedAsset, is_file_part, multipart_error};
use crate::services::scratch::{ScratchStorage, WorkingFiles};
use crate::services::transcoder::{AudioInfo, TranscodeOptions, Transcoder};
use axum::extract::Multipart;
use axum::extract::multipart::Field;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of one processing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validating,
    Ingesting,
    Transcoding,
    Responding,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validating => "validating",
            Stage::Ingesting => "ingesting",
            Stage::Transcoding => "transcoding",
            Stage::Responding => "responding",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Tracks the current stage so a failure can be reported against it.
#[derive(Debug)]
struct Lifecycle<'a> {
    request_id: &'a str,
    stage: Stage,
}

impl<'a> Lifecycle<'a> {
    fn new(request_id: &'a str) -> Self {
        Self {
            request_id,
            stage: Stage::Received,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!(request_id = %self.request_id, "{} -> {}", self.stage, next);
        self.stage = next;
    }

    fn fail(&self, err: &AppError) {
        warn!(
            request_id = %self.request_id,
            stage = %self.stage,
            "request failed: {}",
            err
        );
    }
}

/// Transcoded audio ready to be sent back.
#[derive(Debug, Clone)]
pub struct ProcessedAudio {
    pub bytes: Bytes,
    pub source: UploadedAsset,
}

/// Composes ingest, transcode and read-back for one request and owns scratch cleanup.
pub struct AudioService {
    scratch: ScratchStorage,
    transcoder: Arc<dyn Transcoder>,
    ingestor: UploadIngestor,
    defaults: TranscodeOptions,
}

impl AudioService {
    pub fn new(
        scratch: ScratchStorage,
        transcoder: Arc<dyn Transcoder>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            scratch,
            transcoder,
            ingestor: UploadIngestor::new(config.max_file_size),
            defaults: TranscodeOptions {
                bitrate: config.default_bitrate.clone(),
                min_silence: config.default_min_silence,
                silence_threshold: config.default_silence_threshold.clone(),
            },
        }
    }

    pub fn default_options(&self) -> &TranscodeOptions {
        &self.defaults
    }

    /// Runs the full upload -> silence removal -> MP3 pipeline for one request.
    pub async fn process_upload(
        &self,
        request_id: &str,
        mut multipart: Multipart,
        options: TranscodeOptions,
    ) -> Result<ProcessedAudio, AppError> {
        let mut lifecycle = Lifecycle::new(request_id);
        let result = self
            .process_parts(&mut lifecycle, &mut multipart, &options)
            .await
            .map_err(|e| e.redact_dir(self.scratch.dir()));

        if let Err(e) = &result {
            lifecycle.fail(e);
        }
        result
    }

    /// Ingests the upload and returns the engine's structural metadata for it.
    pub async fn probe_upload(
        &self,
        request_id: &str,
        mut multipart: Multipart,
    ) -> Result<AudioInfo, AppError> {
        let mut lifecycle = Lifecycle::new(request_id);
        let result = self
            .probe_parts(&mut lifecycle, &mut multipart)
            .await
            .map_err(|e| e.redact_dir(self.scratch.dir()));

        if let Err(e) = &result {
            lifecycle.fail(e);
        }
        result
    }

    async fn process_parts(
        &self,
        lifecycle: &mut Lifecycle<'_>,
        multipart: &mut Multipart,
        options: &TranscodeOptions,
    ) -> Result<ProcessedAudio, AppError> {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(&e, self.ingestor.max_bytes()))?
        {
            if is_file_part(&field) {
                return self.transcode_field(lifecycle, field, options).await;
            }
        }
        Err(AppError::NoFileProvided)
    }

    async fn probe_parts(
        &self,
        lifecycle: &mut Lifecycle<'_>,
        multipart: &mut Multipart,
    ) -> Result<AudioInfo, AppError> {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(&e, self.ingestor.max_bytes()))?
        {
            if !is_file_part(&field) {
                continue;
            }
            let (_, mut files) = self.ingest_field(lifecycle, field).await?;
            lifecycle.advance(Stage::Transcoding);
            let info = self.transcoder.probe(files.input()).await;
            files.release().await;

            let info = info?;
            lifecycle.advance(Stage::Done);
            return Ok(info);
        }
        Err(AppError::NoFileProvided)
    }

    async fn ingest_field(
        &self,
        lifecycle: &mut Lifecycle<'_>,
        field: Field<'_>,
    ) -> Result<(UploadedAsset, WorkingFiles), AppError> {
        lifecycle.advance(Stage::Validating);
        self.ingestor.validate(&field)?;

        lifecycle.advance(Stage::Ingesting);
        info!(
            request_id = %lifecycle.request_id,
            "Processing audio file: {:?}, type: {:?}",
            field.file_name(),
            field.content_type()
        );
        // Dropping `files` on any error below removes the partial input.
        let files = self.scratch.allocate(Uuid::new_v4()).await?;
        let asset = self.ingestor.ingest(field, files.input()).await?;
        Ok((asset, files))
    }

    async fn transcode_field(
        &self,
        lifecycle: &mut Lifecycle<'_>,
        field: Field<'_>,
        options: &TranscodeOptions,
    ) -> Result<ProcessedAudio, AppError> {
        let (source, mut files) = self.ingest_field(lifecycle, field).await?;

        let result = self.transcode_and_read(lifecycle, &files, options).await;
        files.release().await;

        let bytes = result?;
        lifecycle.advance(Stage::Done);
        info!(
            request_id = %lifecycle.request_id,
            "Processed {} bytes into {} bytes of MP3",
            source.size,
            bytes.len()
        );
        Ok(ProcessedAudio { bytes, source })
    }

    async fn transcode_and_read(
        &self,
        lifecycle: &mut Lifecycle<'_>,
        files: &WorkingFiles,
        options: &TranscodeOptions,
    ) -> Result<Bytes, AppError> {
        lifecycle.advance(Stage::Transcoding);
        let produced = self
            .transcoder
            .transcode(files.input(), files.output(), options)
            .await?;

        lifecycle.advance(Stage::Responding);
        let bytes = tokio::fs::read(&produced).await?;
        Ok(Bytes::from(bytes))
    }
}
