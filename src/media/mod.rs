// Media processing
//
// - Options: typed choices per operation
// - Commands: option -> ffmpeg argument list translation
// - Runner: supervised execution with progress and cancellation
// - Batch / Probe / Processor: multi-file runs, inspection, tool checks

pub mod batch;
pub mod commands;
pub mod concat;
pub mod filters;
pub mod options;
pub mod probe;
pub mod processor;
pub mod progress;
pub mod runner;

use async_trait::async_trait;
use std::path::Path;

pub use batch::{BatchDriver, BatchEvent, BatchFilter, BatchJob, BatchOperation, BatchReport};
pub use commands::*;
pub use options::*;
pub use probe::{MediaInfo, MediaInspector};
pub use processor::*;
pub use progress::{FfmpegProgressParser, ProgressParser, ProgressState};
pub use runner::{CommandExecutor, ProcessRunner, RunCoordinator, RunEvent, RunOutcome, RunStatus};

use crate::config::MediaConfig;
use crate::error::Result;

/// Tool-level operations that do not hold the run slot
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// Check that ffmpeg can be executed
    async fn check_availability(&self) -> Result<()>;

    /// First line of `ffmpeg -version`
    async fn get_version_info(&self) -> Result<String>;

    /// Probe a media file
    async fn inspect(&self, path: &Path) -> Result<MediaInfo>;

    /// Start playback of a file without waiting for it
    async fn preview(&self, path: &Path) -> Result<()>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(config: MediaConfig) -> Box<dyn MediaProcessorTrait> {
        Box::new(processor::MediaProcessorImpl::new(config))
    }
}
