use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

const INPUT_PREFIX: &str = "input_";
const OUTPUT_PREFIX: &str = "output_";
const INPUT_EXTENSION: &str = "oga";
const OUTPUT_EXTENSION: &str = "mp3";

/// Allocates per-request working files inside a shared scratch directory.
///
/// Paths are unique per allocation (request token plus millisecond timestamp), so
/// concurrent requests never need to coordinate beyond the filesystem namespace.
#[derive(Debug, Clone)]
pub struct ScratchStorage {
    dir: PathBuf,
}

impl ScratchStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the scratch directory if needed. Safe to call repeatedly.
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Removes working files last modified more than `older_than` ago, i.e. left
    /// behind by a process that died mid-request.
    ///
    /// The directory may be shared with other live instances, so fresh files are
    /// never touched.
    pub async fn sweep(&self, older_than: Duration) -> io::Result<usize> {
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with(INPUT_PREFIX) || name.starts_with(OUTPUT_PREFIX)) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok());
            if !age.is_some_and(|age| age > older_than) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to sweep {}: {}", entry.path().display(), e),
            }
        }

        Ok(removed)
    }

    /// Reserves an input/output path pair for one request.
    ///
    /// Nothing is created on disk; the returned guard removes whatever ends up at
    /// either path when it is released or dropped.
    pub async fn allocate(&self, request_id: Uuid) -> io::Result<WorkingFiles> {
        self.ensure_dir().await?;

        let token = format!("{}_{}", request_id.simple(), Utc::now().timestamp_millis());
        let input = self.dir.join(format!("{INPUT_PREFIX}{token}.{INPUT_EXTENSION}"));
        let output = self.dir.join(format!("{OUTPUT_PREFIX}{token}.{OUTPUT_EXTENSION}"));

        tracing::debug!(request_id = %request_id, "allocated scratch pair {}", token);

        Ok(WorkingFiles {
            input,
            output,
            released: false,
        })
    }
}

/// The input/output scratch paths owned by a single in-flight request.
///
/// Dropping the pair deletes both files, so every exit path of the owning request
/// (including early returns and cancellation) cleans up.
#[derive(Debug)]
pub struct WorkingFiles {
    input: PathBuf,
    output: PathBuf,
    released: bool,
}

impl WorkingFiles {
    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Deletes both files. Never fails; errors other than "already gone" are logged.
    pub async fn release(&mut self) {
        for path in [&self.input, &self.output] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove scratch file {}: {}", path.display(), e),
            }
        }
        self.released = true;
    }

    fn release_blocking(&mut self) {
        for path in [&self.input, &self.output] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove scratch file {}: {}", path.display(), e),
            }
        }
        self.released = true;
    }
}

impl Drop for WorkingFiles {
    fn drop(&mut self) {
        if !self.released {
            self.release_blocking();
        }
    }
}
