use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::MediaConfig;
use crate::error::{FfdeckError, Result};
use super::{MediaCommandBuilder, MediaInfo, MediaInspector, MediaProcessorTrait};

/// Locate a companion tool (ffprobe, ffplay) next to the configured ffmpeg.
///
/// A bare `ffmpeg` means everything comes from the search path. Otherwise the
/// sibling in the same directory is used if it exists, else the bare name.
pub fn sibling_tool(binary_path: &str, tool: &str) -> String {
    if binary_path == "ffmpeg" {
        return tool.to_string();
    }

    let dir = Path::new(binary_path).parent().unwrap_or_else(|| Path::new(""));
    let candidate: PathBuf = dir.join(format!("{}{}", tool, std::env::consts::EXE_SUFFIX));
    if candidate.exists() {
        candidate.to_string_lossy().to_string()
    } else {
        tool.to_string()
    }
}

/// ffmpeg-family implementation of the processor seam
pub struct MediaProcessorImpl {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
    inspector: MediaInspector,
    player_binary: String,
}

impl MediaProcessorImpl {
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);
        let probe_binary = config
            .probe_binary
            .clone()
            .unwrap_or_else(|| sibling_tool(&config.binary_path, "ffprobe"));
        let player_binary = config
            .player_binary
            .clone()
            .unwrap_or_else(|| sibling_tool(&config.binary_path, "ffplay"));
        let inspector = MediaInspector::new(probe_binary, Duration::from_secs(config.probe_timeout_secs));

        Self {
            config,
            command_builder,
            inspector,
            player_binary,
        }
    }

    pub fn player_binary(&self) -> &str {
        &self.player_binary
    }

    pub fn probe_binary(&self) -> &str {
        self.inspector.probe_binary()
    }
}

#[async_trait]
impl MediaProcessorTrait for MediaProcessorImpl {
    async fn check_availability(&self) -> Result<()> {
        let version = self.get_version_info().await?;
        info!("Media processor is available: {}", version);
        Ok(())
    }

    async fn get_version_info(&self) -> Result<String> {
        let command = self.command_builder.version_check();
        debug!("Getting media processor version information: {}", command.display_line());

        let output = tokio::process::Command::new(command.binary())
            .args(command.args())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                FfdeckError::Media(format!(
                    "FFmpeg not found at '{}' ({}). Install FFmpeg or run `ffdeck config set-ffmpeg <path>`",
                    self.config.binary_path, e
                ))
            })?;

        if output.status.success() {
            let version_info = String::from_utf8_lossy(&output.stdout);
            let first_line = version_info.lines().next().unwrap_or("Unknown version");
            Ok(first_line.to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(FfdeckError::Media(format!("FFmpeg version check failed: {}", stderr.trim())))
        }
    }

    async fn inspect(&self, path: &Path) -> Result<MediaInfo> {
        self.inspector.inspect(path).await
    }

    async fn preview(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(FfdeckError::validation(format!("File not found: {}", path.display())));
        }

        // Playback outlives this call; the child is not awaited
        tokio::process::Command::new(&self.player_binary)
            .arg("-autoexit")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                FfdeckError::Media(format!(
                    "Cannot launch preview with '{}': {}. FFplay ships with full FFmpeg builds",
                    self.player_binary, e
                ))
            })?;

        info!("Previewing {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_tool_bare_name() {
        assert_eq!(sibling_tool("ffmpeg", "ffprobe"), "ffprobe");
    }

    #[test]
    fn test_sibling_tool_prefers_existing_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = dir.path().join("ffmpeg");
        let probe = dir.path().join(format!("ffprobe{}", std::env::consts::EXE_SUFFIX));
        std::fs::write(&probe, b"").unwrap();

        assert_eq!(
            sibling_tool(&ffmpeg.to_string_lossy(), "ffprobe"),
            probe.to_string_lossy()
        );
        assert_eq!(sibling_tool(&ffmpeg.to_string_lossy(), "ffplay"), "ffplay");
    }

    #[test]
    fn test_explicit_overrides_win() {
        let config = MediaConfig {
            binary_path: "/opt/ffmpeg/bin/ffmpeg".to_string(),
            probe_binary: Some("/usr/local/bin/ffprobe".to_string()),
            player_binary: None,
            ..MediaConfig::default()
        };
        let processor = MediaProcessorImpl::new(config);
        assert_eq!(processor.probe_binary(), "/usr/local/bin/ffprobe");
        assert_eq!(processor.player_binary(), "ffplay");
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_reported() {
        let config = MediaConfig {
            binary_path: "/nonexistent/ffmpeg".to_string(),
            ..MediaConfig::default()
        };
        let processor = MediaProcessorImpl::new(config);
        assert!(matches!(processor.check_availability().await, Err(FfdeckError::Media(_))));
    }

    #[tokio::test]
    async fn test_preview_requires_file() {
        let processor = MediaProcessorImpl::new(MediaConfig::default());
        let result = processor.preview(Path::new("/no/such/clip.mp4")).await;
        assert!(matches!(result, Err(FfdeckError::Validation(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_version_first_line() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("ffmpeg");
        std::fs::write(&fake, "#!/bin/sh\necho 'ffmpeg version 6.1 Copyright (c) 2000-2023'\necho 'built with gcc'\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = MediaConfig {
            binary_path: fake.to_string_lossy().to_string(),
            ..MediaConfig::default()
        };
        let processor = MediaProcessorImpl::new(config);
        assert_eq!(
            processor.get_version_info().await.unwrap(),
            "ffmpeg version 6.1 Copyright (c) 2000-2023"
        );
    }
}
