pub mod audio_service;
pub mod ffmpeg;
pub mod ingest;
pub mod scratch;
pub mod transcoder;
