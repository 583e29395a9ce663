use crate::AppState;
use crate::api::error::{AppError, ErrorResponse};
use crate::api::middleware::request_id::RequestId;
use crate::services::transcoder::AudioInfo;
use crate::utils::validation::ProcessingQuery;
use axum::{
    Extension, Json,
    extract::{
        Multipart, Query, State, multipart::MultipartRejection, rejection::QueryRejection,
    },
    http::header,
    response::IntoResponse,
};
use utoipa::ToSchema;

pub const OUTPUT_CONTENT_TYPE: &str = "audio/mpeg";
pub const OUTPUT_DISPOSITION: &str = "attachment; filename=\"processed_audio.mp3\"";

/// Multipart form carrying one audio file.
#[derive(ToSchema)]
pub struct AudioUpload {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// A body that is not multipart at all is treated as carrying no file.
fn require_multipart(multipart: Result<Multipart, MultipartRejection>) -> Result<Multipart, AppError> {
    multipart.map_err(|rejection| {
        tracing::debug!("Multipart rejected: {}", rejection.body_text());
        AppError::NoFileProvided
    })
}

#[utoipa::path(
    post,
    path = "/process-audio",
    params(ProcessingQuery),
    request_body(content = AudioUpload, content_type = "multipart/form-data", description = "Audio file (audio/* or .oga)"),
    responses(
        (status = 200, description = "Silence removed, MP3 attachment", content_type = "audio/mpeg"),
        (status = 400, description = "Missing file, unsupported type or invalid options", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = ErrorResponse),
        (status = 500, description = "Ingest or engine failure", body = ErrorResponse)
    ),
    tag = "audio"
)]
pub async fn process_audio(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    query: Result<Query<ProcessingQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query.map_err(|e| AppError::InvalidOptions(e.body_text()))?;
    let options = query.into_options(state.audio_service.default_options())?;
    let multipart = require_multipart(multipart)?;

    let processed = state
        .audio_service
        .process_upload(request_id.as_str(), multipart, options)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, OUTPUT_CONTENT_TYPE),
            (header::CONTENT_DISPOSITION, OUTPUT_DISPOSITION),
        ],
        processed.bytes,
    ))
}

#[utoipa::path(
    post,
    path = "/audio-info",
    request_body(content = AudioUpload, content_type = "multipart/form-data", description = "Audio file (audio/* or .oga)"),
    responses(
        (status = 200, description = "Probed metadata", body = AudioInfo),
        (status = 400, description = "Missing file or unsupported type", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = ErrorResponse),
        (status = 500, description = "Ingest or probe failure", body = ErrorResponse)
    ),
    tag = "audio"
)]
pub async fn audio_info(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AudioInfo>, AppError> {
    let multipart = require_multipart(multipart)?;
    let info = state
        .audio_service
        .probe_upload(request_id.as_str(), multipart)
        .await?;
    Ok(Json(info))
}
