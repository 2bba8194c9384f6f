use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use futures::{pin_mut, StreamExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::FetchError;
use crate::fetch::HttpFetcher;

/// Where an acquisition attempt currently stands. `Failed` is distinct from
/// the in-progress phases so callers can tell a dead download from a slow
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AcquirePhase {
    NotStarted = 0,
    Probing = 1,
    Downloading = 2,
    Done = 3,
    Failed = 4,
}

impl AcquirePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AcquirePhase::Probing,
            2 => AcquirePhase::Downloading,
            3 => AcquirePhase::Done,
            4 => AcquirePhase::Failed,
            _ => AcquirePhase::NotStarted,
        }
    }
}

/// Ensures the model artifact is present on disk, reusing an existing file
/// when its size matches the remote's. Holds the progress record read by
/// `/model-info`; written only by the background acquisition task.
pub struct ModelAcquisition {
    fetcher: Arc<HttpFetcher>,
    dest: PathBuf,
    progress: AtomicU64,
    phase: AtomicU8,
}

impl ModelAcquisition {
    pub fn new(fetcher: Arc<HttpFetcher>, dest: PathBuf) -> Self {
        Self {
            fetcher,
            dest,
            progress: AtomicU64::new(0f64.to_bits()),
            phase: AtomicU8::new(AcquirePhase::NotStarted as u8),
        }
    }

    /// Downloads the artifact unless a file of the expected size already
    /// exists at the destination. Idempotent; a re-run against a complete
    /// file issues no transfer. Runs detached from any request, so errors
    /// are only visible to the spawning task and in the logs.
    pub async fn acquire(&self) -> Result<(), FetchError> {
        match self.run().await {
            Ok(()) => {
                self.set_phase(AcquirePhase::Done);
                Ok(())
            }
            Err(e) => {
                self.set_phase(AcquirePhase::Failed);
                Err(e)
            }
        }
    }

    async fn run(&self) -> Result<(), FetchError> {
        tracing::info!(
            uri = %self.fetcher.url(),
            dest = %self.dest.display(),
            "acquiring model"
        );

        self.set_phase(AcquirePhase::Probing);
        let expected = self.fetcher.probe_size().await?;
        tracing::info!(expected, "probed remote size");

        if let Ok(meta) = fs::metadata(&self.dest).await {
            if meta.len() == expected {
                // size match is taken as proof of a complete download; a
                // corrupted file of coincidentally correct size is accepted
                tracing::info!(path = %self.dest.display(), size = expected, "model already present");
                self.set_progress(100.0);
                return Ok(());
            }
            tracing::info!(on_disk = meta.len(), expected, "size mismatch, re-downloading");
        }

        if let Some(parent) = self.dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        self.set_phase(AcquirePhase::Downloading);
        let mut file = fs::File::create(&self.dest).await?;

        let chunks = self.fetcher.stream_chunks();
        pin_mut!(chunks);
        while let Some(chunk) = chunks.next().await {
            file.write_all(&chunk?).await?;
            self.set_progress(self.fetcher.progress());
        }
        file.flush().await?;

        let actual = fs::metadata(&self.dest).await?.len();
        if actual == expected {
            tracing::info!(path = %self.dest.display(), size = actual, "model downloaded");
        } else {
            tracing::warn!(actual, expected, "downloaded size does not match expected size");
        }
        self.set_progress(100.0);
        Ok(())
    }

    /// Stored acquisition progress in percent. Never blocks.
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.progress.load(Ordering::Acquire))
    }

    pub fn phase(&self) -> AcquirePhase {
        AcquirePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_progress(&self, value: f64) {
        self.progress.store(value.to_bits(), Ordering::Release);
    }

    fn set_phase(&self, phase: AcquirePhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}
