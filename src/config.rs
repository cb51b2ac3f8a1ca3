use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, FfdeckError};

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_progress_pipe() -> bool {
    true
}

fn default_batch_pattern() -> String {
    "{name}_converted{ext}".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Explicit ffprobe path; derived from `binary_path` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_binary: Option<String>,
    /// Explicit ffplay path; derived from `binary_path` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_binary: Option<String>,
    /// Seconds to wait for ffprobe before giving up
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Ask ffmpeg to also write machine-readable progress to stderr
    /// (`-progress pipe:2`)
    #[serde(default = "default_progress_pipe")]
    pub progress_pipe: bool,
}

/// Values used when a flag is not given on the command line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultsConfig {
    pub format: String,
    pub video_codec: String,
    pub audio_codec: String,
    /// Constant rate factor (0-51, lower = better quality, 23 is default)
    pub crf: u8,
    /// Encoding speed (ultrafast, fast, medium, slow, veryslow)
    pub preset: String,
    #[serde(default = "default_batch_pattern")]
    pub batch_pattern: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    #[serde(default)]
    pub last_input_dir: String,
    #[serde(default)]
    pub last_output_dir: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            probe_binary: None,
            player_binary: None,
            probe_timeout_secs: default_probe_timeout_secs(),
            progress_pipe: default_progress_pipe(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            format: "mp4".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            crf: 23,
            preset: "medium".to_string(),
            batch_pattern: default_batch_pattern(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FfdeckError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| FfdeckError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| FfdeckError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| FfdeckError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Record the directories of the last used input and output.
    ///
    /// Returns `true` when anything changed and the file should be rewritten.
    pub fn remember_paths(&mut self, input: Option<&Path>, output: Option<&Path>) -> bool {
        let mut changed = false;
        if let Some(dir) = input.and_then(parent_dir) {
            if self.paths.last_input_dir != dir {
                self.paths.last_input_dir = dir;
                changed = true;
            }
        }
        if let Some(dir) = output.and_then(parent_dir) {
            if self.paths.last_output_dir != dir {
                self.paths.last_output_dir = dir;
                changed = true;
            }
        }
        changed
    }
}

fn parent_dir(path: &Path) -> Option<String> {
    // A directory argument (batch output folder) is remembered as-is
    let dir: PathBuf = if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()?.to_path_buf()
    };
    if dir.as_os_str().is_empty() {
        return None;
    }
    Some(dir.to_string_lossy().to_string())
}
