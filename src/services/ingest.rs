use crate::api::error::AppError;
use crate::utils::validation::validate_audio_upload;
use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use futures::TryStreamExt;
use std::io;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// What the client declared about an upload, plus how many bytes actually arrived.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: u64,
}

/// A part counts as the upload if it carries a filename or is named `file`.
pub fn is_file_part(field: &Field<'_>) -> bool {
    field.file_name().is_some() || field.name() == Some("file")
}

/// Maps multipart framing errors, recognising the transport body limit.
pub fn multipart_error(err: &MultipartError, max_bytes: usize) -> AppError {
    let text = err.body_text();
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE || text.contains("length limit exceeded") {
        AppError::payload_too_large(max_bytes)
    } else {
        AppError::BadRequest(text)
    }
}

/// Validates one streamed upload and writes it to a scratch path.
#[derive(Debug, Clone)]
pub struct UploadIngestor {
    max_bytes: usize,
}

impl UploadIngestor {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Type check on the declared metadata only; no body bytes are read.
    pub fn validate(&self, field: &Field<'_>) -> Result<(), AppError> {
        validate_audio_upload(field.file_name(), field.content_type())
    }

    /// Streams the part to `destination`, aborting once more than `max_bytes` arrive.
    ///
    /// The file is flushed and closed before returning. On error a partial file may
    /// remain at `destination`; the caller owns its removal.
    pub async fn ingest(
        &self,
        field: Field<'_>,
        destination: &Path,
    ) -> Result<UploadedAsset, AppError> {
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        let reader = StreamReader::new(field.map_err(io::Error::other));
        tokio::pin!(reader);

        let mut file = tokio::fs::File::create(destination).await?;
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut total: u64 = 0;

        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .map_err(|e| self.read_error(e))?;
            if n == 0 {
                break;
            }

            total += n as u64;
            if total > self.max_bytes as u64 {
                tracing::warn!(
                    "Upload exceeded {} bytes, aborting ingest",
                    self.max_bytes
                );
                return Err(AppError::payload_too_large(self.max_bytes));
            }

            file.write_all(&buffer[..n]).await?;
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tracing::info!(
            "Ingested upload {:?} ({:?}, {} bytes)",
            filename,
            content_type,
            total
        );

        Ok(UploadedAsset {
            filename,
            content_type,
            size: total,
        })
    }

    fn read_error(&self, err: io::Error) -> AppError {
        match err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<MultipartError>())
        {
            Some(multipart) => multipart_error(multipart, self.max_bytes),
            None => AppError::Io(err),
        }
    }
}
