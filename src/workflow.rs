use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::media::batch::{BatchDriver, BatchEvent, BatchJob, BatchReport};
use crate::media::runner::{RunCoordinator, RunEvent, RunOutcome, RunStatus};
use crate::media::{
    FfmpegProgressParser, MediaCommandBuilder, MediaProcessorFactory, MediaProcessorTrait,
    OperationOptions, PreparedCommand, ProcessRunner, ProgressState,
};

/// Glue between the command line and the media layer
pub struct Workflow {
    config: Config,
    media: Box<dyn MediaProcessorTrait>,
    builder: MediaCommandBuilder,
    coordinator: RunCoordinator,
}

impl Workflow {
    pub fn new(config: Config) -> Self {
        let media = MediaProcessorFactory::create_processor(config.media.clone());
        let builder = MediaCommandBuilder::new(&config.media.binary_path);
        let coordinator = RunCoordinator::new(ProcessRunner::new(config.media.progress_pipe));

        Self {
            config,
            media,
            builder,
            coordinator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &RunCoordinator {
        &self.coordinator
    }

    /// Build the command for `options` without running anything
    pub fn prepare(&self, options: &OperationOptions) -> Result<PreparedCommand> {
        self.builder.build(options)
    }

    /// The command line `options` would run, as a single shell-like string
    pub fn preview_command(&self, options: &OperationOptions) -> Result<String> {
        let prepared = self.prepare(options)?;
        Ok(prepared.command.display_line())
    }

    /// Command lines a batch would run, one per input
    pub fn preview_batch(&self, job: &BatchJob) -> Vec<String> {
        job.inputs
            .iter()
            .map(|input| {
                self.builder
                    .batch(&job.operation, input, &job.output_for(input))
                    .display_line()
            })
            .collect()
    }

    /// Run one operation to completion, showing progress. Ctrl-C kills the
    /// child and ends the run as cancelled.
    pub async fn run_operation(&self, options: &OperationOptions) -> Result<RunOutcome> {
        let prepared = self.prepare(options)?;
        info!("Starting {}: {}", options.name(), options.output().display());

        let mut handle = self
            .coordinator
            .start(prepared.command.clone(), Box::new(FfmpegProgressParser::new()))?;

        let coordinator = self.coordinator.clone();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping");
                coordinator.cancel();
            }
        });

        let display = ProgressDisplay::new(options.name());
        while let Some(event) = handle.events.recv().await {
            display.update(&event);
        }

        let outcome = handle.wait().await;
        interrupt.abort();
        // Merge list files go away only once the child has exited
        drop(prepared);

        match outcome {
            Ok(outcome) => {
                display.finish(&outcome);
                outcome.into_result()
            }
            Err(e) => {
                display.bar.abandon();
                Err(e)
            }
        }
    }

    /// Run a batch with an N-of-M bar. Ctrl-C stops after the current file.
    pub async fn run_batch(&self, job: &BatchJob) -> Result<BatchReport> {
        let executor = Arc::new(ProcessRunner::new(self.config.media.progress_pipe));
        let driver = BatchDriver::new(self.builder.clone(), executor);

        let stop = driver.stop_handle();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Stop requested, finishing the current file");
                stop.cancel();
            }
        });

        let bar = ProgressBar::new(job.inputs.len() as u64);
        bar.set_style(style(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        ));

        let report = driver
            .run(job, |event| match event {
                BatchEvent::Started { input, .. } => {
                    bar.set_message(input.file_name().unwrap_or_default().to_string_lossy().to_string());
                }
                BatchEvent::Finished { .. } => bar.inc(1),
            })
            .await;

        interrupt.abort();
        bar.finish_and_clear();
        report
    }

    /// ffprobe summary of a file
    pub async fn inspect(&self, path: &Path) -> Result<String> {
        Ok(self.media.inspect(path).await?.render())
    }

    /// First line of `ffmpeg -version`
    pub async fn check(&self) -> Result<String> {
        self.media.get_version_info().await
    }

    pub async fn preview(&self, path: &Path) -> Result<()> {
        self.media.preview(path).await
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Spinner until the total length is known, then a percentage bar
struct ProgressDisplay {
    bar: ProgressBar,
}

impl ProgressDisplay {
    fn new(operation: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(style("{spinner:.green} {msg} [{elapsed_precise}]"));
        bar.set_message(operation.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    fn update(&self, event: &RunEvent) {
        match event {
            RunEvent::Duration(_) => {
                self.bar.set_length(100);
                self.bar.set_style(style(
                    "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}%  {prefix}",
                ));
            }
            RunEvent::Progress(state) => {
                if let Some(percent) = state.percent {
                    self.bar.set_position(percent as u64);
                }
                self.bar.set_prefix(position_label(state));
            }
            RunEvent::Notice { line, .. } => self.bar.println(line),
            RunEvent::Line(_) => {}
        }
    }

    fn finish(&self, outcome: &RunOutcome) {
        match outcome.status {
            RunStatus::Succeeded => {
                self.bar.set_position(100);
                self.bar.finish_with_message(format!("done in {:.1}s", outcome.elapsed.as_secs_f64()));
            }
            RunStatus::Failed { code } => self.bar.abandon_with_message(format!("failed (code {})", code)),
            RunStatus::Cancelled => self.bar.abandon_with_message("cancelled"),
        }
    }
}

fn position_label(state: &ProgressState) -> String {
    match state.total_seconds {
        Some(total) => format!("{} / {}", clock(state.current_seconds), clock(total)),
        None => clock(state.current_seconds),
    }
}

/// Seconds as `HH:MM:SS`
fn clock(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", whole / 3600, (whole % 3600) / 60, whole % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FfdeckError;
    use crate::media::batch::BatchOperation;
    use crate::media::{MergeOptions, TrimOptions};
    use std::path::PathBuf;

    #[test]
    fn test_clock_and_label() {
        assert_eq!(clock(3723.5), "01:02:03");
        let state = ProgressState { total_seconds: Some(100.0), current_seconds: 50.0, percent: Some(50.0) };
        assert_eq!(position_label(&state), "00:00:50 / 00:01:40");
    }

    #[test]
    fn test_preview_command_does_not_run() {
        let workflow = Workflow::new(Config::default());
        let mut options = TrimOptions::new("my clip.mp4", "out.mp4");
        options.start = "00:00:05".to_string();

        let line = workflow.preview_command(&OperationOptions::Trim(options)).unwrap();
        assert_eq!(line, "ffmpeg -i \"my clip.mp4\" -ss 00:00:05 -t 00:00:10 -c copy -y out.mp4");
        assert!(!workflow.coordinator().is_busy());
    }

    #[test]
    fn test_preview_batch_lists_every_input() {
        let workflow = Workflow::new(Config::default());
        let job = BatchJob {
            inputs: vec![PathBuf::from("a.mov"), PathBuf::from("b.mov")],
            operation: BatchOperation::Resize { resolution: "640x360".to_string() },
            output_dir: PathBuf::from("out"),
            pattern: "{name}_small{ext}".to_string(),
        };
        assert_eq!(
            workflow.preview_batch(&job),
            vec![
                "ffmpeg -i a.mov -vf scale=640x360 -c:v libx264 -c:a copy -y out/a_small.mp4",
                "ffmpeg -i b.mov -vf scale=640x360 -c:v libx264 -c:a copy -y out/b_small.mp4",
            ]
        );
    }

    #[test]
    fn test_preview_command_validates() {
        let workflow = Workflow::new(Config::default());
        let options = OperationOptions::Merge(MergeOptions {
            inputs: vec![PathBuf::from("only.mp4")],
            output: PathBuf::from("out.mp4"),
            reencode: false,
        });
        assert!(matches!(workflow.preview_command(&options), Err(FfdeckError::Validation(_))));
    }

    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, body: &str) -> Config {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = Config::default();
        config.media.binary_path = path.to_string_lossy().to_string();
        config
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_operation_success_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let options = OperationOptions::Trim(TrimOptions::new("in.mp4", "out.mp4"));

        let ok = Workflow::new(fake_ffmpeg(
            dir.path(),
            "echo 'Duration: 00:00:10.00' >&2; echo 'time=00:00:10.00' >&2",
        ));
        let outcome = ok.run_operation(&options).await.unwrap();
        assert_eq!(outcome.progress.percent, Some(100.0));

        let failing = Workflow::new(fake_ffmpeg(dir.path(), "echo 'in.mp4: No such file or directory' >&2; exit 1"));
        match failing.run_operation(&options).await {
            Err(FfdeckError::ProcessFailure { code, tail }) => {
                assert_eq!(code, 1);
                assert_eq!(tail, vec!["in.mp4: No such file or directory"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!failing.coordinator().is_busy());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_merge_list_removed_after_run() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("list-path.txt");
        let copy = dir.path().join("list-copy.txt");
        let body = format!(
            "prev=''; for a in \"$@\"; do if [ \"$prev\" = '-i' ]; then echo \"$a\" > '{}'; cp \"$a\" '{}'; fi; prev=\"$a\"; done",
            record.display(),
            copy.display()
        );
        let workflow = Workflow::new(fake_ffmpeg(dir.path(), &body));

        let options = OperationOptions::Merge(MergeOptions {
            inputs: vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")],
            output: PathBuf::from("out.mp4"),
            reencode: false,
        });
        workflow.run_operation(&options).await.unwrap();

        let list_path = std::fs::read_to_string(&record).unwrap();
        assert!(!Path::new(list_path.trim()).exists());
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(
            std::fs::read_to_string(&copy).unwrap(),
            format!("file '{}'\nfile '{}'\n", cwd.join("a.mp4").display(), cwd.join("b.mp4").display())
        );
    }
}
