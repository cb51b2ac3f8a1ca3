use chrono::{DateTime, Local};
use clap::ValueEnum;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{FfdeckError, Result};
use super::commands::MediaCommandBuilder;
use super::options::VIDEO_EXTENSIONS;
use super::runner::{CommandExecutor, RunStatus};

/// Filters offered to batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchFilter {
    None,
    Grayscale,
    Blur,
    Sharpen,
}

/// The operation every file of a batch goes through
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum BatchOperation {
    Convert { format: String, codec: String, crf: u8 },
    Audio { format: String, bitrate: String },
    Resize { resolution: String },
    Filter { filter: BatchFilter },
}

impl BatchOperation {
    pub fn describe(&self) -> String {
        match self {
            Self::Convert { format, codec, .. } => format!("Batch convert to {} ({})", format, codec),
            Self::Audio { format, .. } => format!("Batch audio extraction to {}", format),
            Self::Resize { resolution } => format!("Batch resize to {}", resolution),
            Self::Filter { filter } => format!("Batch {:?} filter", filter).to_lowercase(),
        }
    }

    /// Extension (with dot) of every output of this operation
    pub fn output_extension(&self) -> String {
        match self {
            Self::Convert { format, .. } | Self::Audio { format, .. } => format!(".{}", format),
            Self::Resize { .. } | Self::Filter { .. } => ".mp4".to_string(),
        }
    }
}

/// Inputs processed one after another with a shared operation
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub inputs: Vec<PathBuf>,
    pub operation: BatchOperation,
    pub output_dir: PathBuf,
    /// `{name}` is the input's base name, `{ext}` the operation's extension
    pub pattern: String,
}

impl BatchJob {
    pub fn output_for(&self, input: &Path) -> PathBuf {
        let base = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        self.output_dir
            .join(output_file_name(&self.pattern, &base, &self.operation.output_extension()))
    }
}

pub fn output_file_name(pattern: &str, base_name: &str, extension: &str) -> String {
    pattern.replace("{name}", base_name).replace("{ext}", extension)
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Expand the given paths into the batch's input list.
///
/// Folders contribute their direct children that look like videos, sorted by
/// name; files are taken as given. Repeated paths are kept only once.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut inputs = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let candidate = entry.path();
                if entry.file_type().is_file() && is_video_file(candidate) && seen.insert(candidate.to_path_buf()) {
                    inputs.push(candidate.to_path_buf());
                }
            }
        } else if path.is_file() {
            if seen.insert(path.clone()) {
                inputs.push(path.clone());
            }
        } else {
            return Err(FfdeckError::validation(format!("Input not found: {}", path.display())));
        }
    }

    Ok(inputs)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemStatus {
    Completed,
    Failed { reason: String, tail: Vec<String> },
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub input: PathBuf,
    pub output: PathBuf,
    pub status: ItemStatus,
}

/// What happened to every input of a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub items: Vec<BatchItem>,
    /// A stop was requested before every file was attempted
    pub stopped: bool,
}

impl BatchReport {
    fn count(&self, predicate: impl Fn(&ItemStatus) -> bool) -> usize {
        self.items.iter().filter(|item| predicate(&item.status)).count()
    }

    pub fn completed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Completed))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Skipped))
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Batch {} at {}: {} completed, {} failed, {} skipped ({}s)",
            if self.stopped { "stopped" } else { "finished" },
            self.finished_at.format("%Y-%m-%d %H:%M:%S"),
            self.completed(),
            self.failed(),
            self.skipped(),
            self.elapsed().num_seconds()
        )];
        for item in &self.items {
            let name = item.input.file_name().unwrap_or_default().to_string_lossy();
            match &item.status {
                ItemStatus::Completed => lines.push(format!("  ✓ {} -> {}", name, item.output.display())),
                ItemStatus::Failed { reason, .. } => lines.push(format!("  ✗ {} ({})", name, reason)),
                ItemStatus::Skipped => lines.push(format!("  - {} (skipped)", name)),
            }
        }
        lines.join("\n")
    }
}

/// Per-file notifications for whoever shows batch progress
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started { index: usize, total: usize, input: PathBuf },
    Finished { index: usize, status: ItemStatus },
}

/// Runs a batch strictly in order, one file at a time
pub struct BatchDriver {
    builder: MediaCommandBuilder,
    executor: Arc<dyn CommandExecutor>,
    stop: CancellationToken,
}

impl BatchDriver {
    pub fn new(builder: MediaCommandBuilder, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            builder,
            executor,
            stop: CancellationToken::new(),
        }
    }

    /// Stop through `token` instead of a private one
    pub fn with_stop_token(mut self, token: CancellationToken) -> Self {
        self.stop = token;
        self
    }

    /// Token that stops the batch after the file in flight
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub async fn run<F>(&self, job: &BatchJob, mut observe: F) -> Result<BatchReport>
    where
        F: FnMut(&BatchEvent),
    {
        if job.inputs.is_empty() {
            return Err(FfdeckError::validation("Please add files to process"));
        }
        if job.output_dir.as_os_str().is_empty() {
            return Err(FfdeckError::validation("Please specify output folder"));
        }

        tokio::fs::create_dir_all(&job.output_dir).await?;

        let started_at = Local::now();
        let total = job.inputs.len();
        let mut items = Vec::with_capacity(total);
        let mut stopped = false;

        info!("Starting {} on {} files", job.operation.describe(), total);

        for (index, input) in job.inputs.iter().enumerate() {
            let output = job.output_for(input);

            if self.stop.is_cancelled() {
                stopped = true;
                items.push(BatchItem { input: input.clone(), output, status: ItemStatus::Skipped });
                continue;
            }

            info!(
                "Processing {}/{}: {}",
                index + 1,
                total,
                input.file_name().unwrap_or_default().to_string_lossy()
            );
            observe(&BatchEvent::Started { index, total, input: input.clone() });

            let command = self.builder.batch(&job.operation, input, &output);
            let status = match self.executor.execute(&command).await {
                Ok(outcome) => match outcome.status {
                    RunStatus::Succeeded => {
                        info!("Completed: {}", input.display());
                        ItemStatus::Completed
                    }
                    RunStatus::Failed { code } => {
                        warn!("Failed: {} (return code: {})", input.display(), code);
                        for line in &outcome.tail {
                            warn!("  {}", line);
                        }
                        ItemStatus::Failed {
                            reason: format!("return code {}", code),
                            tail: outcome.tail,
                        }
                    }
                    RunStatus::Cancelled => ItemStatus::Failed {
                        reason: "cancelled".to_string(),
                        tail: outcome.tail,
                    },
                },
                Err(e) => {
                    warn!("Error processing {}: {}", input.display(), e);
                    ItemStatus::Failed { reason: e.to_string(), tail: Vec::new() }
                }
            };

            observe(&BatchEvent::Finished { index, status: status.clone() });
            items.push(BatchItem { input: input.clone(), output, status });
        }

        if stopped {
            info!("Batch processing stopped by user");
        } else {
            info!("Batch processing complete");
        }

        Ok(BatchReport {
            started_at,
            finished_at: Local::now(),
            items,
            stopped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::progress::ProgressState;
    use crate::media::runner::{MockCommandExecutor, RunOutcome};
    use assert_fs::prelude::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn outcome(status: RunStatus, tail: &[&str]) -> RunOutcome {
        RunOutcome {
            run_id: Uuid::new_v4(),
            status,
            tail: tail.iter().map(|s| s.to_string()).collect(),
            progress: ProgressState::default(),
            elapsed: Duration::ZERO,
        }
    }

    fn job(inputs: &[&str], output_dir: &Path) -> BatchJob {
        BatchJob {
            inputs: inputs.iter().map(PathBuf::from).collect(),
            operation: BatchOperation::Convert {
                format: "mp4".to_string(),
                codec: "libx264".to_string(),
                crf: 23,
            },
            output_dir: output_dir.to_path_buf(),
            pattern: "{name}_converted{ext}".to_string(),
        }
    }

    #[test]
    fn test_output_naming() {
        assert_eq!(output_file_name("{name}_converted{ext}", "clip1", ".mp4"), "clip1_converted.mp4");

        let job = job(&["/videos/clip1.avi"], Path::new("/out"));
        assert_eq!(job.output_for(Path::new("/videos/clip1.avi")), PathBuf::from("/out/clip1_converted.mp4"));
    }

    #[test]
    fn test_output_extension_per_operation() {
        let audio = BatchOperation::Audio { format: "flac".to_string(), bitrate: "192k".to_string() };
        assert_eq!(audio.output_extension(), ".flac");
        let filter = BatchOperation::Filter { filter: BatchFilter::Blur };
        assert_eq!(filter.output_extension(), ".mp4");
        assert_eq!(filter.describe(), "batch blur filter");
    }

    #[test]
    fn test_collect_inputs_from_folder_and_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("b.MKV").touch().unwrap();
        temp.child("a.mp4").touch().unwrap();
        temp.child("notes.txt").touch().unwrap();
        temp.child("nested").create_dir_all().unwrap();
        temp.child("nested/c.mp4").touch().unwrap();
        let extra = temp.child("extra.mov");
        extra.touch().unwrap();

        let a = temp.path().join("a.mp4");
        let inputs = collect_inputs(&[
            temp.path().to_path_buf(),
            a.clone(),
            extra.path().to_path_buf(),
        ])
        .unwrap();

        assert_eq!(
            inputs,
            vec![a, temp.path().join("b.MKV"), temp.path().join("extra.mov")]
        );
    }

    #[test]
    fn test_collect_inputs_rejects_missing_path() {
        let result = collect_inputs(&[PathBuf::from("/no/such/clip.mp4")]);
        assert!(matches!(result, Err(FfdeckError::Validation(_))));
    }

    #[tokio::test]
    async fn test_batch_continues_past_failure() {
        let temp = assert_fs::TempDir::new().unwrap();
        let out = temp.child("out");

        let mut executor = MockCommandExecutor::new();
        let mut calls = 0;
        executor.expect_execute().times(3).returning(move |_| {
            calls += 1;
            if calls == 2 {
                Ok(outcome(RunStatus::Failed { code: 1 }, &["Invalid data found"]))
            } else {
                Ok(outcome(RunStatus::Succeeded, &[]))
            }
        });

        let driver = BatchDriver::new(MediaCommandBuilder::new("ffmpeg"), Arc::new(executor));
        let mut events = Vec::new();
        let report = driver
            .run(&job(&["one.avi", "two.avi", "three.avi"], out.path()), |e| events.push(e.clone()))
            .await
            .unwrap();

        assert!(out.path().is_dir());
        assert_eq!((report.completed(), report.failed(), report.skipped()), (2, 1, 0));
        assert!(!report.stopped);
        assert_eq!(
            report.items[1].status,
            ItemStatus::Failed {
                reason: "return code 1".to_string(),
                tail: vec!["Invalid data found".to_string()],
            }
        );
        assert_eq!(report.items[2].output, out.path().join("three_converted.mp4"));
        assert_eq!(events.len(), 6);
    }

    #[tokio::test]
    async fn test_spawn_error_fails_only_that_item() {
        let temp = assert_fs::TempDir::new().unwrap();

        let mut executor = MockCommandExecutor::new();
        executor
            .expect_execute()
            .times(1)
            .returning(|_| Err(FfdeckError::Media("Failed to execute ffmpeg".to_string())));

        let driver = BatchDriver::new(MediaCommandBuilder::new("ffmpeg"), Arc::new(executor));
        let report = driver.run(&job(&["one.avi"], temp.path()), |_| {}).await.unwrap();
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test]
    async fn test_stop_skips_remaining_items() {
        let temp = assert_fs::TempDir::new().unwrap();

        let mut executor = MockCommandExecutor::new();
        let driver_stop = CancellationToken::new();
        let stop = driver_stop.clone();
        executor.expect_execute().times(1).returning(move |_| {
            stop.cancel();
            Ok(outcome(RunStatus::Succeeded, &[]))
        });

        let driver = BatchDriver::new(MediaCommandBuilder::new("ffmpeg"), Arc::new(executor))
            .with_stop_token(driver_stop);
        let report = driver.run(&job(&["a.avi", "b.avi", "c.avi"], temp.path()), |_| {}).await.unwrap();

        assert!(report.stopped);
        assert_eq!((report.completed(), report.failed(), report.skipped()), (1, 0, 2));
        assert!(report.summary().starts_with("Batch stopped"));
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let driver = BatchDriver::new(MediaCommandBuilder::new("ffmpeg"), Arc::new(MockCommandExecutor::new()));
        let result = driver.run(&job(&[], Path::new("out")), |_| {}).await;
        assert!(matches!(result, Err(FfdeckError::Validation(_))));
    }

    #[tokio::test]
    async fn test_uncreatable_output_dir_is_io_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let blocker = temp.child("file");
        blocker.touch().unwrap();

        let driver = BatchDriver::new(MediaCommandBuilder::new("ffmpeg"), Arc::new(MockCommandExecutor::new()));
        let result = driver.run(&job(&["a.avi"], &blocker.path().join("sub")), |_| {}).await;
        assert!(matches!(result, Err(FfdeckError::Io(_))));
    }
}
