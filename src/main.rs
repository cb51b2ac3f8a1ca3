//! ffdeck - build, preview and supervise ffmpeg jobs from the command line
//!
//! Entry point: logging, configuration lookup and subcommand dispatch.

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn, Instrument, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};

use ffdeck::cli::{Args, BatchArgs, Commands, ConfigAction};
use ffdeck::config::Config;
use ffdeck::error::FfdeckError;
use ffdeck::media::batch::{collect_inputs, BatchJob};
use ffdeck::media::runner::RunOutcome;
use ffdeck::media::OperationOptions;
use ffdeck::workflow::Workflow;

const DEFAULT_CONFIG: &str = "config.toml";

/// Exit status of a run stopped with Ctrl-C
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Dropped at the end of main so buffered file logs are flushed
    let _log_guard = setup_logging(args.verbose)?;

    let config_path = args.config.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = Config::load_or_default(&config_path)?;
    if config_path.exists() {
        info!("Loaded configuration from {}", config_path.display());
    }

    let span = tracing::info_span!("ffdeck", session = %uuid::Uuid::new_v4());
    dispatch(args, config, config_path).instrument(span).await
}

async fn dispatch(args: Args, mut config: Config, config_path: PathBuf) -> Result<ExitCode> {
    let options = match args.command {
        Commands::Convert(a) => OperationOptions::Convert(a.into_options(&config.defaults)),
        Commands::Trim(a) => OperationOptions::Trim(a.into_options()),
        Commands::Merge(a) => OperationOptions::Merge(a.into_options()),
        Commands::Filter(a) => OperationOptions::Filter(a.into_options()),
        Commands::Audio(a) => OperationOptions::AudioExtract(a.into_options()),
        Commands::Subtitle(a) => OperationOptions::Subtitle(a.into_options()),
        Commands::Watermark(a) => OperationOptions::Watermark(a.into_options()),
        Commands::Batch(batch) => {
            return run_batch(config, &config_path, batch, args.dry_run).await;
        }
        Commands::Info { input } => {
            let workflow = Workflow::new(config);
            println!("{}", workflow.inspect(&input).await?);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Preview { input } => {
            let workflow = Workflow::new(config);
            workflow.preview(&input).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Check => {
            let workflow = Workflow::new(config);
            match workflow.check().await {
                Ok(version) => {
                    println!("FFmpeg is available: {}", version);
                    return Ok(ExitCode::SUCCESS);
                }
                Err(e) => {
                    eprintln!("{}", e);
                    eprintln!("Install FFmpeg and make sure it is on PATH, or point ffdeck at it:");
                    eprintln!("  ffdeck config set-ffmpeg /path/to/ffmpeg");
                    return Err(e.into());
                }
            }
        }
        Commands::Config { action } => {
            manage_config(action, &mut config, &config_path)?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    let workflow = Workflow::new(config.clone());

    if args.dry_run {
        println!("{}", workflow.preview_command(&options)?);
        return Ok(ExitCode::SUCCESS);
    }

    let result = workflow.run_operation(&options).await;

    if config.remember_paths(options.primary_input(), Some(options.output())) {
        if let Err(e) = config.save_to_file(&config_path) {
            warn!("Could not save remembered paths: {}", e);
        }
    }

    finish_operation(&options, result)
}

/// Map a finished run to the process exit status
fn finish_operation(options: &OperationOptions, result: ffdeck::error::Result<RunOutcome>) -> Result<ExitCode> {
    match result {
        Ok(outcome) => {
            info!("Output written to {} ({:.1}s)", options.output().display(), outcome.elapsed.as_secs_f64());
            Ok(ExitCode::SUCCESS)
        }
        Err(FfdeckError::Cancelled) => {
            warn!("{} cancelled by user", options.name());
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(FfdeckError::ProcessFailure { code, tail }) => {
            for line in &tail {
                eprintln!("  {}", line);
            }
            Err(FfdeckError::ProcessFailure { code, tail }.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_batch(mut config: Config, config_path: &Path, batch: BatchArgs, dry_run: bool) -> Result<ExitCode> {
    let inputs = collect_inputs(&batch.inputs)?;
    info!("Found {} files to process", inputs.len());

    let job = BatchJob {
        inputs,
        operation: batch.operation.into(),
        output_dir: batch.output_dir,
        pattern: batch.pattern.unwrap_or_else(|| config.defaults.batch_pattern.clone()),
    };

    let workflow = Workflow::new(config.clone());

    if dry_run {
        for line in workflow.preview_batch(&job) {
            println!("{}", line);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let report = workflow.run_batch(&job).await?;
    println!("{}", report.summary());

    if config.remember_paths(job.inputs.first().map(PathBuf::as_path), Some(&job.output_dir)) {
        if let Err(e) = config.save_to_file(config_path) {
            warn!("Could not save remembered paths: {}", e);
        }
    }

    if report.stopped {
        warn!("Batch stopped by user");
        return Ok(ExitCode::from(EXIT_CANCELLED));
    }
    Ok(ExitCode::SUCCESS)
}

fn manage_config(action: ConfigAction, config: &mut Config, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let rendered = toml::to_string_pretty(config)
                .map_err(|e| FfdeckError::Config(format!("Failed to serialize config: {}", e)))?;
            println!("# {}", config_path.display());
            print!("{}", rendered);
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                return Err(FfdeckError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                ))
                .into());
            }
            Config::default().save_to_file(config_path)?;
            println!("Wrote default configuration to {}", config_path.display());
        }
        ConfigAction::SetFfmpeg { path } => {
            config.media.binary_path = path;
            config.save_to_file(config_path)?;
            println!("FFmpeg path set to {}", config.media.binary_path);
        }
    }
    Ok(())
}

/// Setup logging to both console and file. The returned guard flushes the
/// file writer when dropped.
fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".ffdeck").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation
    let file_appender = rolling::daily(&log_dir, "ffdeck.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console goes to stderr; stdout is reserved for command output
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("ffdeck.log").display());

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffdeck::media::TrimOptions;

    #[test]
    fn test_cancelled_run_returns_exit_status() {
        let options = OperationOptions::Trim(TrimOptions::new("in.mp4", "out.mp4"));

        let code = finish_operation(&options, Err(FfdeckError::Cancelled)).unwrap();
        assert_eq!(format!("{:?}", code), format!("{:?}", ExitCode::from(EXIT_CANCELLED)));

        let failed = finish_operation(
            &options,
            Err(FfdeckError::ProcessFailure { code: 1, tail: vec!["boom".to_string()] }),
        );
        assert!(failed.is_err());
    }
}
