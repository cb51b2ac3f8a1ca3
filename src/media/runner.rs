use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::error::{Result, FfdeckError};
use super::commands::MediaCommand;
use super::progress::{FfmpegProgressParser, ProgressParser, ProgressState, ProgressUpdate};

/// Number of trailing diagnostic lines kept for failure reports
pub const TAIL_LINES: usize = 5;

static PROGRESS_RECORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z_0-9]+=\S*$").expect("progress record regex pattern is invalid")
});

/// `key=value` records written by `-progress`. They feed the parser but are
/// not diagnostics.
pub fn is_progress_record(line: &str) -> bool {
    PROGRESS_RECORD_RE.is_match(line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// Lines mentioning "error" or "warning" (any case) deserve attention
pub fn classify_line(line: &str) -> Option<NoticeLevel> {
    let lower = line.to_lowercase();
    if lower.contains("error") {
        Some(NoticeLevel::Error)
    } else if lower.contains("warning") {
        Some(NoticeLevel::Warning)
    } else {
        None
    }
}

/// Observations published while a run is in flight
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Line(String),
    Notice { level: NoticeLevel, line: String },
    Duration(f64),
    Progress(ProgressState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed { code: i32 },
    Cancelled,
}

/// Terminal state of one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Last non-empty diagnostic lines, oldest first
    pub tail: Vec<String>,
    pub progress: ProgressState,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Turn failure and cancellation into errors
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            RunStatus::Succeeded => Ok(self),
            RunStatus::Failed { code } => Err(FfdeckError::ProcessFailure { code, tail: self.tail }),
            RunStatus::Cancelled => Err(FfdeckError::Cancelled),
        }
    }
}

/// Per-run wiring between the runner and whoever observes it
pub struct RunContext {
    pub run_id: Uuid,
    pub cancel: CancellationToken,
    pub events: Option<mpsc::UnboundedSender<RunEvent>>,
    pub progress: Arc<Mutex<ProgressState>>,
}

impl RunContext {
    /// Context nobody watches and nobody cancels
    pub fn detached() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            events: None,
            progress: Arc::new(Mutex::new(ProgressState::default())),
        }
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is watching any more
            let _ = events.send(event);
        }
    }

    fn publish(&self, state: ProgressState) {
        *lock(&self.progress) = state;
    }
}

/// Executes one command as a child process and supervises it
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    progress_pipe: bool,
}

impl ProcessRunner {
    /// With `progress_pipe`, ffmpeg is asked for `-progress pipe:2` output
    pub fn new(progress_pipe: bool) -> Self {
        Self { progress_pipe }
    }

    pub async fn run(
        &self,
        command: &MediaCommand,
        parser: &mut dyn ProgressParser,
        ctx: &RunContext,
    ) -> Result<RunOutcome> {
        let started = Instant::now();
        let command = if self.progress_pipe {
            command.with_progress_reporting()
        } else {
            command.clone()
        };

        parser.reset();
        ctx.publish(parser.state());

        info!("Running {}: {}", command.description(), command.display_line());

        let mut child = spawn(&command)?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FfdeckError::Media("Child stderr was not captured".to_string()))?;
        let mut reader = BufReader::new(stderr);
        let mut pending = Vec::new();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
        let mut cancelled = false;

        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    info!("Stopping {} on request", command.description());
                    cancelled = true;
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to signal child process: {}", e);
                    }
                    break;
                }
                line = read_diagnostic_line(&mut reader, &mut pending) => {
                    match line? {
                        Some(line) => self.handle_line(line, parser, ctx, &mut tail),
                        None => break,
                    }
                }
            }
        }

        let exit = child.wait().await?;

        let status = if cancelled {
            RunStatus::Cancelled
        } else if exit.success() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed { code: exit.code().unwrap_or(-1) }
        };

        match status {
            RunStatus::Succeeded => info!("{} completed successfully", command.description()),
            RunStatus::Failed { code } => warn!("{} failed with code {}", command.description(), code),
            RunStatus::Cancelled => info!("{} stopped by user", command.description()),
        }

        Ok(RunOutcome {
            run_id: ctx.run_id,
            status,
            tail: tail.into_iter().collect(),
            progress: parser.state(),
            elapsed: started.elapsed(),
        })
    }

    fn handle_line(
        &self,
        line: String,
        parser: &mut dyn ProgressParser,
        ctx: &RunContext,
        tail: &mut VecDeque<String>,
    ) {
        debug!("{}", line);

        match parser.observe(&line) {
            Some(ProgressUpdate::Duration(total)) => {
                info!("Media duration: {:.2}s", total);
                ctx.publish(parser.state());
                ctx.emit(RunEvent::Duration(total));
            }
            Some(ProgressUpdate::Advanced(state)) => {
                ctx.publish(state);
                ctx.emit(RunEvent::Progress(state));
            }
            None => {}
        }

        if let Some(level) = classify_line(&line) {
            warn!("{}", line);
            ctx.emit(RunEvent::Notice { level, line: line.clone() });
        }

        if !is_progress_record(&line) {
            if tail.len() == TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.clone());
        }
        ctx.emit(RunEvent::Line(line));
    }
}

fn spawn(command: &MediaCommand) -> Result<tokio::process::Child> {
    let mut std_cmd = std::process::Command::new(command.binary());
    std_cmd
        .args(command.args())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    // Own process group: Ctrl-C reaches us, and we decide what the child gets
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_cmd.process_group(0);
    }

    let mut cmd = tokio::process::Command::from(std_cmd);
    cmd.kill_on_drop(true);

    cmd.spawn().map_err(|e| {
        FfdeckError::Media(format!("Failed to execute {}: {}", command.binary(), e))
    })
}

/// Next non-empty line terminated by `\n` or `\r`. ffmpeg redraws its status
/// line with carriage returns, so both count as line ends.
///
/// Partial data is kept in `pending`, which makes this safe to cancel and
/// call again.
pub async fn read_diagnostic_line<R>(reader: &mut R, pending: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if pending.is_empty() {
                return Ok(None);
            }
            let line = String::from_utf8_lossy(pending).trim().to_string();
            pending.clear();
            if line.is_empty() {
                return Ok(None);
            }
            return Ok(Some(line));
        }

        match available.iter().position(|b| *b == b'\n' || *b == b'\r') {
            Some(pos) => {
                pending.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                let line = String::from_utf8_lossy(pending).trim().to_string();
                pending.clear();
                if !line.is_empty() {
                    return Ok(Some(line));
                }
            }
            None => {
                let len = available.len();
                pending.extend_from_slice(available);
                reader.consume(len);
            }
        }
    }
}

/// Seam for running fully built commands to completion
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &MediaCommand) -> Result<RunOutcome>;
}

#[async_trait]
impl CommandExecutor for ProcessRunner {
    async fn execute(&self, command: &MediaCommand) -> Result<RunOutcome> {
        let mut parser = FfmpegProgressParser::new();
        let ctx = RunContext::detached();
        self.run(command, &mut parser, &ctx).await
    }
}

struct ActiveRun {
    run_id: Uuid,
    cancel: CancellationToken,
}

/// Owns the single foreground run slot.
///
/// At most one run is active; starting another while busy is rejected
/// rather than queued. Cloning shares the slot.
#[derive(Clone)]
pub struct RunCoordinator {
    runner: ProcessRunner,
    active: Arc<Mutex<Option<ActiveRun>>>,
    progress: Arc<Mutex<ProgressState>>,
}

/// A started run: its events, and its eventual outcome
pub struct RunHandle {
    pub run_id: Uuid,
    pub events: mpsc::UnboundedReceiver<RunEvent>,
    task: JoinHandle<Result<RunOutcome>>,
}

impl RunHandle {
    pub async fn wait(self) -> Result<RunOutcome> {
        self.task
            .await
            .map_err(|e| FfdeckError::Media(format!("Run task failed: {}", e)))?
    }
}

/// Frees the slot when the run task ends, however it ends
struct SlotRelease {
    active: Arc<Mutex<Option<ActiveRun>>>,
    run_id: Uuid,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let mut active = lock(&self.active);
        if active.as_ref().is_some_and(|run| run.run_id == self.run_id) {
            *active = None;
        }
    }
}

impl RunCoordinator {
    pub fn new(runner: ProcessRunner) -> Self {
        Self {
            runner,
            active: Arc::new(Mutex::new(None)),
            progress: Arc::new(Mutex::new(ProgressState::default())),
        }
    }

    /// Start `command` in the background. Fails with [`FfdeckError::Busy`]
    /// if a run is already active; the active run is not touched.
    pub fn start(&self, command: MediaCommand, mut parser: Box<dyn ProgressParser>) -> Result<RunHandle> {
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        {
            let mut active = lock(&self.active);
            if active.is_some() {
                return Err(FfdeckError::Busy);
            }
            *active = Some(ActiveRun { run_id, cancel: cancel.clone() });
        }
        *lock(&self.progress) = ProgressState::default();

        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = RunContext {
            run_id,
            cancel,
            events: Some(tx),
            progress: Arc::clone(&self.progress),
        };
        let release = SlotRelease { active: Arc::clone(&self.active), run_id };
        let runner = self.runner.clone();
        let span = tracing::info_span!("run", id = %run_id);

        let task = tokio::spawn(
            async move {
                let _release = release;
                runner.run(&command, parser.as_mut(), &ctx).await
            }
            .instrument(span),
        );

        Ok(RunHandle { run_id, events: rx, task })
    }

    /// Ask the active run to stop. Returns `false` when nothing is running.
    pub fn cancel(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.active).is_some()
    }

    pub fn active_run(&self) -> Option<Uuid> {
        lock(&self.active).as_ref().map(|run| run.run_id)
    }

    /// Snapshot of the current (or last) run's progress
    pub fn progress(&self) -> ProgressState {
        *lock(&self.progress)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("[h264 @ 0x1] Error while decoding"), Some(NoticeLevel::Error));
        assert_eq!(classify_line("WARNING: deprecated pixel format"), Some(NoticeLevel::Warning));
        assert_eq!(classify_line("frame=  10 fps=0.0"), None);
    }

    #[test]
    fn test_outcome_into_result() {
        let outcome = RunOutcome {
            run_id: Uuid::new_v4(),
            status: RunStatus::Failed { code: 1 },
            tail: vec!["boom".to_string()],
            progress: ProgressState::default(),
            elapsed: Duration::ZERO,
        };
        match outcome.clone().into_result() {
            Err(FfdeckError::ProcessFailure { code, tail }) => {
                assert_eq!(code, 1);
                assert_eq!(tail, vec!["boom"]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let cancelled = RunOutcome { status: RunStatus::Cancelled, ..outcome };
        assert!(matches!(cancelled.into_result(), Err(FfdeckError::Cancelled)));
    }

    #[tokio::test]
    async fn test_read_lines_split_on_cr_and_lf() {
        let data: &[u8] = b"first\r\nframe=1 time=00:00:01.00\rframe=2 time=00:00:02.00\r\n\nlast";
        let mut reader = BufReader::new(data);
        let mut pending = Vec::new();

        let mut lines = Vec::new();
        while let Some(line) = read_diagnostic_line(&mut reader, &mut pending).await.unwrap() {
            lines.push(line);
        }
        assert_eq!(
            lines,
            vec!["first", "frame=1 time=00:00:01.00", "frame=2 time=00:00:02.00", "last"]
        );
    }

    #[tokio::test]
    async fn test_read_lines_across_chunks() {
        let mock = tokio_test::io::Builder::new()
            .read(b"Dura")
            .read(b"tion: 00:01:40.00, start\n")
            .read(b"time=00:00:")
            .read(b"50.00\r")
            .build();
        let mut reader = BufReader::new(mock);
        let mut pending = Vec::new();

        assert_eq!(
            read_diagnostic_line(&mut reader, &mut pending).await.unwrap().as_deref(),
            Some("Duration: 00:01:40.00, start")
        );
        assert_eq!(
            read_diagnostic_line(&mut reader, &mut pending).await.unwrap().as_deref(),
            Some("time=00:00:50.00")
        );
        assert_eq!(read_diagnostic_line(&mut reader, &mut pending).await.unwrap(), None);
    }

    #[cfg(unix)]
    fn shell(script: &str) -> MediaCommand {
        MediaCommand::new("sh", "shell test").arg("-c").arg(script)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_success_with_progress() {
        let runner = ProcessRunner::new(false);
        let mut parser = FfmpegProgressParser::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = RunContext { events: Some(tx), ..RunContext::detached() };

        let command = shell(
            "printf 'Duration: 00:01:40.00, start: 0\\n' >&2; \
             printf 'frame=1 time=00:00:50.00 speed=1x\\r' >&2; \
             printf 'Warning: something odd\\n' >&2",
        );
        let outcome = runner.run(&command, &mut parser, &ctx).await.unwrap();
        drop(ctx);

        assert_eq!(outcome.status, RunStatus::Succeeded);
        assert_eq!(outcome.progress.percent, Some(50.0));
        assert_eq!(outcome.tail.len(), 3);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(events.contains(&RunEvent::Duration(100.0)));
        assert!(events.iter().any(|e| matches!(e, RunEvent::Progress(p) if p.percent == Some(50.0))));
        assert!(events.iter().any(|e| matches!(e, RunEvent::Notice { level: NoticeLevel::Warning, .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_failure_keeps_tail() {
        let runner = ProcessRunner::new(false);
        let mut parser = FfmpegProgressParser::new();
        let ctx = RunContext::detached();

        let command = shell("for i in 1 2 3 4 5 6 7; do echo line$i >&2; done; exit 3");
        let outcome = runner.run(&command, &mut parser, &ctx).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Failed { code: 3 });
        assert_eq!(outcome.tail, vec!["line3", "line4", "line5", "line6", "line7"]);
        assert!(parser.state().is_indeterminate());
    }

    #[test]
    fn test_progress_records() {
        assert!(is_progress_record("out_time=00:00:01.500000"));
        assert!(is_progress_record("progress=end"));
        assert!(is_progress_record("speed=N/A"));
        assert!(!is_progress_record("frame=  10 fps=0.0 time=00:00:01.00"));
        assert!(!is_progress_record("[h264 @ 0x1] Error while decoding"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_tail_skips_progress_block() {
        let runner = ProcessRunner::new(false);
        let mut parser = FfmpegProgressParser::new();
        let ctx = RunContext::detached();

        let command = shell(
            "echo 'Duration: 00:00:10.00, start: 0' >&2; \
             echo '[h264 @ 0x1] Error while decoding stream #0:0: Invalid data found' >&2; \
             for kv in frame=12 fps=0.0 bitrate=N/A total_size=48 out_time_us=500000 \
                 out_time=00:00:00.500000 dup_frames=0 drop_frames=0 speed=N/A progress=end; do \
                 echo \"$kv\" >&2; done; exit 1",
        );
        let outcome = runner.run(&command, &mut parser, &ctx).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Failed { code: 1 });
        assert_eq!(
            outcome.tail,
            vec![
                "Duration: 00:00:10.00, start: 0",
                "[h264 @ 0x1] Error while decoding stream #0:0: Invalid data found",
            ]
        );
        assert_eq!(outcome.progress.current_seconds, 0.5);
    }

    #[tokio::test]
    async fn test_missing_binary_is_media_error() {
        let runner = ProcessRunner::new(false);
        let mut parser = FfmpegProgressParser::new();
        let command = MediaCommand::new("/nonexistent/ffmpeg-binary", "missing");

        let result = runner.run(&command, &mut parser, &RunContext::detached()).await;
        assert!(matches!(result, Err(FfdeckError::Media(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_second_start_is_busy_and_cancel_is_not_failure() {
        let coordinator = RunCoordinator::new(ProcessRunner::new(false));

        let first = coordinator
            .start(
                shell("printf 'Duration: 00:01:40.00\\ntime=00:00:25.00\\n' >&2; exec sleep 30"),
                Box::new(FfmpegProgressParser::new()),
            )
            .unwrap();
        let mut events = first.events;
        // Wait until the first run has reported progress
        loop {
            match events.recv().await {
                Some(RunEvent::Progress(_)) => break,
                Some(_) => continue,
                None => panic!("run ended early"),
            }
        }
        let before = coordinator.progress();
        assert_eq!(before.percent, Some(25.0));

        let second = coordinator.start(shell("exit 0"), Box::new(FfmpegProgressParser::new()));
        assert!(matches!(second, Err(FfdeckError::Busy)));
        assert_eq!(coordinator.progress(), before);
        assert_eq!(coordinator.active_run(), Some(first.run_id));

        assert!(coordinator.cancel());
        let handle = RunHandle { run_id: first.run_id, events, task: first.task };
        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert!(!coordinator.is_busy());
        assert!(!coordinator.cancel());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slot_reusable_after_completion() {
        let coordinator = RunCoordinator::new(ProcessRunner::new(false));

        let handle = coordinator.start(shell("exit 1"), Box::new(FfmpegProgressParser::new())).unwrap();
        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome.status, RunStatus::Failed { code: 1 });

        let handle = coordinator.start(shell("exit 0"), Box::new(FfmpegProgressParser::new())).unwrap();
        assert!(handle.wait().await.unwrap().is_success());
    }
}
