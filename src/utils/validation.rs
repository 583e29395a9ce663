use crate::api::error::AppError;
use crate::services::transcoder::TranscodeOptions;
use serde::Deserialize;
use utoipa::IntoParams;
use validator::{Validate, ValidationError};

/// Source extension accepted regardless of the declared MIME type.
pub const SOURCE_EXTENSION: &str = ".oga";

const MIN_BITRATE_KBPS: u32 = 8;
const MAX_BITRATE_KBPS: u32 = 512;
const MIN_THRESHOLD_DB: f64 = -120.0;

/// An upload is audio if its MIME type mentions audio or its name carries the source extension.
pub fn is_audio_upload(filename: Option<&str>, content_type: Option<&str>) -> bool {
    let mime_ok = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("audio"));
    let ext_ok =
        filename.is_some_and(|name| name.to_ascii_lowercase().ends_with(SOURCE_EXTENSION));
    mime_ok || ext_ok
}

pub fn validate_audio_upload(
    filename: Option<&str>,
    content_type: Option<&str>,
) -> Result<(), AppError> {
    if is_audio_upload(filename, content_type) {
        Ok(())
    } else {
        Err(AppError::UnsupportedType)
    }
}

/// Optional per-request overrides for the transcode.
#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProcessingQuery {
    /// Output bitrate such as "128k" (8k-512k)
    #[validate(custom(function = "validate_bitrate"))]
    pub bitrate: Option<String>,

    /// Minimum silence duration to remove, in seconds
    #[validate(range(min = 0.01, max = 60.0, message = "min_silence must be between 0.01 and 60 seconds"))]
    pub min_silence: Option<f64>,

    /// Silence threshold such as "-50dB" (-120dB to 0dB)
    #[validate(custom(function = "validate_threshold"))]
    pub threshold: Option<String>,
}

impl ProcessingQuery {
    /// Validates overrides and fills the gaps from `defaults`.
    pub fn into_options(self, defaults: &TranscodeOptions) -> Result<TranscodeOptions, AppError> {
        self.validate()
            .map_err(|e| AppError::InvalidOptions(e.to_string()))?;

        if self.min_silence.is_some_and(|v| !v.is_finite()) {
            return Err(AppError::InvalidOptions(
                "min_silence must be a finite number".to_string(),
            ));
        }

        Ok(TranscodeOptions {
            bitrate: self.bitrate.unwrap_or_else(|| defaults.bitrate.clone()),
            min_silence: self.min_silence.unwrap_or(defaults.min_silence),
            silence_threshold: self
                .threshold
                .unwrap_or_else(|| defaults.silence_threshold.clone()),
        })
    }
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

pub fn validate_bitrate(value: &str) -> Result<(), ValidationError> {
    let kbps = value
        .strip_suffix('k')
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<u32>().ok())
        .ok_or_else(|| invalid("bitrate_format", "bitrate must look like \"128k\""))?;

    if !(MIN_BITRATE_KBPS..=MAX_BITRATE_KBPS).contains(&kbps) {
        return Err(invalid("bitrate_range", "bitrate must be between 8k and 512k"));
    }
    Ok(())
}

pub fn validate_threshold(value: &str) -> Result<(), ValidationError> {
    let db = value
        .strip_suffix("dB")
        .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit() || b == b'-' || b == b'.'))
        .and_then(|n| n.parse::<f64>().ok())
        .ok_or_else(|| invalid("threshold_format", "threshold must look like \"-50dB\""))?;

    if !(MIN_THRESHOLD_DB..=0.0).contains(&db) {
        return Err(invalid("threshold_range", "threshold must be between -120dB and 0dB"));
    }
    Ok(())
}
