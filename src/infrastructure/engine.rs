use crate::config::ServiceConfig;
use crate::services::scratch::ScratchStorage;
use crate::services::transcoder::{FfmpegTranscoder, Transcoder};
use std::sync::Arc;
use tracing::{info, warn};

pub fn setup_transcoder(config: &ServiceConfig) -> Arc<dyn Transcoder> {
    for program in [&config.ffmpeg_path, &config.ffprobe_path] {
        match which::which(program) {
            Ok(path) => info!("🎛️  Found {} at {}", program, path.display()),
            Err(_) => warn!(
                "⚠️  {} not found on PATH! Audio requests will fail until it is installed.",
                program
            ),
        }
    }

    match config.transcode_timeout_secs {
        Some(secs) => info!("⏱️  Engine timeout: {}s", secs),
        None => warn!("⚠️  Engine timeout disabled"),
    }

    Arc::new(
        FfmpegTranscoder::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone())
            .with_timeout(config.transcode_timeout_secs),
    )
}

pub async fn setup_scratch(config: &ServiceConfig) -> anyhow::Result<ScratchStorage> {
    let scratch = ScratchStorage::new(config.scratch_dir.clone());
    scratch.ensure_dir().await?;

    let swept = scratch.sweep(config.stale_scratch_age()).await?;
    if swept > 0 {
        info!("🧹 Removed {} stale working files", swept);
    }
    info!("📁 Scratch directory: {}", scratch.dir().display());

    Ok(scratch)
}
