use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{FfdeckError, Result};

/// `format` section of ffprobe's JSON output
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeFormat {
    pub format_long_name: Option<String>,
    pub duration: Option<String>,
    pub size: Option<String>,
    pub bit_rate: Option<String>,
}

/// One entry of ffprobe's `streams` array
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeStream {
    pub codec_type: Option<String>,
    pub codec_long_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub r_frame_rate: Option<String>,
    pub pix_fmt: Option<String>,
    pub sample_rate: Option<String>,
    pub channels: Option<u32>,
    pub bit_rate: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeData {
    pub format: Option<ProbeFormat>,
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

/// Probe result for one file
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub data: ProbeData,
}

impl MediaInfo {
    pub fn parse(path: &Path, json: &str) -> Result<Self> {
        let data: ProbeData = serde_json::from_str(json)?;
        Ok(Self { path: path.to_path_buf(), data })
    }

    /// Flattened, human-readable summary
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== File Information ===")?;
        writeln!(f, "Filename: {}", self.path.file_name().unwrap_or_default().to_string_lossy())?;
        writeln!(f, "Path: {}\n", self.path.display())?;

        if let Some(format) = &self.data.format {
            writeln!(f, "=== Format ===")?;
            writeln!(f, "Format: {}", text(&format.format_long_name))?;
            writeln!(f, "Duration: {:.2} seconds", number(&format.duration))?;
            writeln!(f, "Size: {:.2} MB", number(&format.size) / (1024.0 * 1024.0))?;
            writeln!(f, "Bitrate: {:.0} kb/s\n", number(&format.bit_rate) / 1000.0)?;
        }

        for stream in &self.data.streams {
            match stream.codec_type.as_deref() {
                Some("video") => {
                    writeln!(f, "=== Video Stream ===")?;
                    writeln!(f, "Codec: {}", text(&stream.codec_long_name))?;
                    writeln!(
                        f,
                        "Resolution: {}x{}",
                        display_or_na(stream.width),
                        display_or_na(stream.height)
                    )?;
                    writeln!(f, "Frame Rate: {} fps", text(&stream.r_frame_rate))?;
                    writeln!(f, "Bitrate: {:.0} kb/s", number(&stream.bit_rate) / 1000.0)?;
                    writeln!(f, "Pixel Format: {}\n", text(&stream.pix_fmt))?;
                }
                Some("audio") => {
                    writeln!(f, "=== Audio Stream ===")?;
                    writeln!(f, "Codec: {}", text(&stream.codec_long_name))?;
                    writeln!(f, "Sample Rate: {} Hz", text(&stream.sample_rate))?;
                    writeln!(f, "Channels: {}", display_or_na(stream.channels))?;
                    writeln!(f, "Bitrate: {:.0} kb/s\n", number(&stream.bit_rate) / 1000.0)?;
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("N/A")
}

fn display_or_na(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
}

/// ffprobe reports numbers as strings; missing or unparsable ones count as 0
fn number(value: &Option<String>) -> f64 {
    value
        .as_deref()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Runs ffprobe in JSON mode with a bounded wait
#[derive(Debug, Clone)]
pub struct MediaInspector {
    probe_binary: String,
    timeout: Duration,
}

impl MediaInspector {
    pub fn new<S: Into<String>>(probe_binary: S, timeout: Duration) -> Self {
        Self {
            probe_binary: probe_binary.into(),
            timeout,
        }
    }

    pub fn probe_binary(&self) -> &str {
        &self.probe_binary
    }

    pub fn probe_args(path: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path.to_string_lossy().to_string(),
        ]
    }

    pub async fn inspect(&self, path: &Path) -> Result<MediaInfo> {
        if path.as_os_str().is_empty() || !path.exists() {
            return Err(FfdeckError::validation("Please select a valid video file"));
        }

        debug!("Probing {} with {}", path.display(), self.probe_binary);

        let mut cmd = tokio::process::Command::new(&self.probe_binary);
        cmd.args(Self::probe_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                FfdeckError::Probe(format!(
                    "{} did not answer within {}s",
                    self.probe_binary,
                    self.timeout.as_secs_f64()
                ))
            })?
            .map_err(|e| {
                FfdeckError::Probe(format!(
                    "{} not found ({}). It ships with full FFmpeg builds; install it or set media.probe_binary",
                    self.probe_binary, e
                ))
            })?;

        if !output.status.success() {
            return Err(FfdeckError::Probe(format!(
                "Failed to get video information (exit code {})",
                output.status.code().unwrap_or(-1)
            )));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        let info = MediaInfo::parse(path, &json)
            .map_err(|e| FfdeckError::Probe(format!("Unreadable probe output: {}", e)))?;

        info!("Retrieved video info for: {}", path.display());
        Ok(info)
    }
}
