use std::path::Path;

use crate::error::{Result, FfdeckError};
use super::batch::{BatchFilter, BatchOperation};
use super::concat::ConcatList;
use super::filters::{AUDIO_FILTERS, VIDEO_FILTERS};
use super::options::*;

/// An ordered ffmpeg argument list bound to the binary that runs it.
///
/// Built once through the consuming builder methods; after that it is only
/// read.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCommand {
    binary_path: String,
    args: Vec<String>,
    description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary_path
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn extend_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Copy every stream unchanged
    pub fn copy_streams(self) -> Self {
        self.arg("-c").arg(COPY_CODEC)
    }

    /// Copy audio stream
    pub fn copy_audio(self) -> Self {
        self.audio_codec(COPY_CODEC)
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio bitrate
    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Add audio filter
    pub fn audio_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-af").arg(filter)
    }

    /// Add a filter graph spanning several inputs
    pub fn filter_complex<S: Into<String>>(self, graph: S) -> Self {
        self.arg("-filter_complex").arg(graph)
    }

    /// Copy of this command that also writes `key=value` progress records to
    /// stderr. The original command is left as built.
    pub fn with_progress_reporting(&self) -> Self {
        let mut args = Vec::with_capacity(self.args.len() + 2);
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());
        args.extend(self.args.iter().cloned());
        Self {
            binary_path: self.binary_path.clone(),
            args,
            description: self.description.clone(),
        }
    }

    /// Shell-like rendering for previews and logs. Tokens containing a space
    /// are wrapped in double quotes; nothing else is escaped.
    pub fn display_line(&self) -> String {
        std::iter::once(self.binary_path.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|token| {
                if token.contains(' ') {
                    format!("\"{}\"", token)
                } else {
                    token.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A built command plus whatever must outlive its run
#[derive(Debug)]
pub struct PreparedCommand {
    pub command: MediaCommand,
    /// Present for merges; removed when this value is dropped
    pub concat_list: Option<ConcatList>,
}

impl From<MediaCommand> for PreparedCommand {
    fn from(command: MediaCommand) -> Self {
        Self { command, concat_list: None }
    }
}

/// Translates operation options into ffmpeg command lines
#[derive(Debug, Clone)]
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build the command for any operation
    pub fn build(&self, options: &OperationOptions) -> Result<PreparedCommand> {
        match options {
            OperationOptions::Convert(o) => self.convert(o).map(Into::into),
            OperationOptions::Trim(o) => self.trim(o).map(Into::into),
            OperationOptions::Merge(o) => {
                let (command, list) = self.merge(o)?;
                Ok(PreparedCommand { command, concat_list: Some(list) })
            }
            OperationOptions::Filter(o) => self.filter(o).map(Into::into),
            OperationOptions::AudioExtract(o) => self.extract_audio(o).map(Into::into),
            OperationOptions::Subtitle(o) => self.subtitle(o).map(Into::into),
            OperationOptions::Watermark(o) => self.watermark(o).map(Into::into),
        }
    }

    /// Build format conversion command
    pub fn convert(&self, options: &ConvertOptions) -> Result<MediaCommand> {
        require_path(&options.input, "input file")?;
        require_path(&options.output, "output file")?;
        if !options.input.exists() {
            return Err(FfdeckError::validation(format!(
                "Input file not found: {}",
                options.input.display()
            )));
        }
        if options.crf > 51 {
            return Err(FfdeckError::validation(format!(
                "CRF must be between 0 and 51, got {}",
                options.crf
            )));
        }

        let mut cmd = MediaCommand::new(&self.binary_path, "Format conversion").input(&options.input);

        if options.hw_accel {
            cmd = cmd.arg("-hwaccel").arg("auto");
        }

        cmd = cmd.video_codec(&options.video_codec);

        if options.video_codec != COPY_CODEC {
            if RATE_CONTROLLED_CODECS.contains(&options.video_codec.as_str()) {
                cmd = cmd
                    .arg("-crf").arg(options.crf.to_string())
                    .arg("-preset").arg(&options.preset);
            }
            if let Some(bitrate) = non_empty(options.video_bitrate.as_deref()) {
                cmd = cmd.arg("-b:v").arg(bitrate);
            }
        }

        cmd = cmd.audio_codec(&options.audio_codec);

        if let Some(scale) = options.resize.as_ref().and_then(Resize::scale_filter) {
            cmd = cmd.video_filter(scale);
        }

        if let Some(fps) = options.fps {
            cmd = cmd.arg("-r").arg(fps.to_string());
        }

        cmd = cmd.extend_args(split_extra_args(&options.extra_args));

        Ok(cmd.overwrite().output(&options.output))
    }

    /// Build trim command
    pub fn trim(&self, options: &TrimOptions) -> Result<MediaCommand> {
        require_path(&options.input, "input file")?;
        require_path(&options.output, "output file")?;

        let mut cmd = MediaCommand::new(&self.binary_path, "Trim").input(&options.input);

        let start = options.start.trim();
        if !start.is_empty() && start != ZERO_TIME {
            cmd = cmd.arg("-ss").arg(start);
        }

        match &options.end {
            TrimEnd::Duration(duration) => {
                if let Some(duration) = non_empty(Some(duration.as_str())) {
                    cmd = cmd.arg("-t").arg(duration);
                }
            }
            TrimEnd::EndTime(end) => {
                if let Some(end) = non_empty(Some(end.as_str())) {
                    cmd = cmd.arg("-to").arg(end);
                }
            }
        }

        Ok(reencode_or_copy(cmd, options.reencode).overwrite().output(&options.output))
    }

    /// Build concatenation command. The returned list file must be kept
    /// alive until the process has exited.
    pub fn merge(&self, options: &MergeOptions) -> Result<(MediaCommand, ConcatList)> {
        if options.inputs.len() < 2 {
            return Err(FfdeckError::validation("Please add at least 2 files to merge"));
        }
        for input in &options.inputs {
            require_path(input, "input file")?;
        }
        require_path(&options.output, "output file")?;

        let list = ConcatList::write(&options.inputs)?;

        let cmd = MediaCommand::new(&self.binary_path, "Merge")
            .arg("-f").arg("concat")
            .arg("-safe").arg("0")
            .input(list.path());

        let cmd = reencode_or_copy(cmd, options.reencode).overwrite().output(&options.output);
        Ok((cmd, list))
    }

    /// Build video filter command
    pub fn filter(&self, options: &FilterOptions) -> Result<MediaCommand> {
        require_path(&options.input, "input file")?;
        require_path(&options.output, "output file")?;
        if options.speed <= 0.0 || !options.speed.is_finite() {
            return Err(FfdeckError::validation(format!(
                "Speed must be a positive number, got {}",
                options.speed
            )));
        }

        let mut cmd = MediaCommand::new(&self.binary_path, "Video filters").input(&options.input);

        if let Some(chain) = VIDEO_FILTERS.render(options) {
            cmd = cmd.video_filter(chain);
        }

        Ok(cmd
            .video_codec("libx264")
            .copy_audio()
            .overwrite()
            .output(&options.output))
    }

    /// Build audio extraction command
    pub fn extract_audio(&self, options: &AudioExtractOptions) -> Result<MediaCommand> {
        require_path(&options.input, "input file")?;
        require_path(&options.output, "output file")?;

        let mut cmd = MediaCommand::new(&self.binary_path, "Audio extraction").input(&options.input);

        if let Some(trim) = &options.trim {
            let start = trim.start.trim();
            if !start.is_empty() && start != ZERO_TIME {
                cmd = cmd.arg("-ss").arg(start);
            }
            if let Some(duration) = non_empty(Some(trim.duration.as_str())) {
                cmd = cmd.arg("-t").arg(duration);
            }
        }

        if let Some(chain) = AUDIO_FILTERS.render(options) {
            cmd = cmd.audio_filter(chain);
        }

        cmd = cmd.no_video();

        let codec = if options.codec == "auto" {
            audio_codec_for_format(&options.format)
        } else {
            options.codec.as_str()
        };
        cmd = cmd.audio_codec(codec);

        if !LOSSLESS_AUDIO_CODECS.contains(&codec) {
            cmd = cmd.audio_bitrate(&options.bitrate);
        }

        Ok(cmd
            .audio_sample_rate(options.sample_rate)
            .audio_channels(options.channels.count())
            .overwrite()
            .output(&options.output))
    }

    /// Build subtitle embedding command
    pub fn subtitle(&self, options: &SubtitleOptions) -> Result<MediaCommand> {
        require_path(&options.input, "input video")?;
        require_path(&options.subtitle, "subtitle file")?;
        require_path(&options.output, "output file")?;

        let cmd = MediaCommand::new(&self.binary_path, "Subtitle embedding").input(&options.input);

        let cmd = match options.mode {
            SubtitleMode::Soft => cmd
                .input(&options.subtitle)
                .copy_streams()
                .arg("-c:s").arg("mov_text"),
            SubtitleMode::Hard => {
                let colour = ass_colour(&options.color).ok_or_else(|| {
                    FfdeckError::validation(format!("Unknown subtitle colour: {}", options.color))
                })?;
                let filter = format!(
                    "subtitles='{}':force_style='FontSize={},PrimaryColour=&H{}&'",
                    escape_filter_path(&options.subtitle)?,
                    options.font_size,
                    colour
                );
                cmd.video_filter(filter).video_codec("libx264").copy_audio()
            }
        };

        Ok(cmd.overwrite().output(&options.output))
    }

    /// Build watermark overlay command
    pub fn watermark(&self, options: &WatermarkOptions) -> Result<MediaCommand> {
        require_path(&options.input, "input video")?;
        require_path(&options.watermark, "watermark image")?;
        require_path(&options.output, "output file")?;
        if !(0.0..=1.0).contains(&options.opacity) {
            return Err(FfdeckError::validation(format!(
                "Opacity must be between 0.0 and 1.0, got {}",
                options.opacity
            )));
        }

        let graph = format!(
            "[1:v]format=rgba,colorchannelmixer=aa={}[wm];[0:v][wm]overlay={}",
            options.opacity,
            options.position.overlay_expression(options.margin)
        );

        Ok(MediaCommand::new(&self.binary_path, "Watermark")
            .input(&options.input)
            .input(&options.watermark)
            .filter_complex(graph)
            .video_codec("libx264")
            .copy_audio()
            .overwrite()
            .output(&options.output))
    }

    /// Build the per-file command of a batch
    pub fn batch(&self, operation: &BatchOperation, input: &Path, output: &Path) -> MediaCommand {
        let cmd = MediaCommand::new(&self.binary_path, operation.describe()).input(input);

        let cmd = match operation {
            BatchOperation::Convert { codec, crf, .. } => {
                let cmd = cmd.video_codec(codec);
                let cmd = if codec != COPY_CODEC {
                    cmd.arg("-crf").arg(crf.to_string())
                } else {
                    cmd
                };
                cmd.audio_codec("aac")
            }
            BatchOperation::Audio { format, bitrate } => {
                let codec = batch_audio_codec(format);
                let cmd = cmd.no_video().audio_codec(codec);
                if LOSSLESS_AUDIO_CODECS.contains(&codec) {
                    cmd
                } else {
                    cmd.audio_bitrate(bitrate)
                }
            }
            BatchOperation::Resize { resolution } => cmd
                .video_filter(format!("scale={}", resolution))
                .video_codec("libx264")
                .copy_audio(),
            BatchOperation::Filter { filter } => {
                let cmd = match filter.expression() {
                    Some(expression) => cmd.video_filter(expression),
                    None => cmd,
                };
                cmd.copy_audio()
            }
        };

        cmd.overwrite().output(output)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check")
            .arg("-version")
    }
}

impl BatchFilter {
    fn expression(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Grayscale => Some("hue=s=0"),
            Self::Blur => Some("boxblur=5:5"),
            Self::Sharpen => Some("unsharp=5:5:1.0:5:5:0.0"),
        }
    }
}

/// Batch audio only knows four containers; anything else is encoded as AAC
fn batch_audio_codec(format: &str) -> &'static str {
    match format {
        "mp3" => "libmp3lame",
        "wav" => "pcm_s16le",
        "flac" => "flac",
        _ => "aac",
    }
}

fn reencode_or_copy(cmd: MediaCommand, reencode: bool) -> MediaCommand {
    if reencode {
        cmd.video_codec("libx264").audio_codec("aac")
    } else {
        cmd.copy_streams()
    }
}

fn require_path(path: &Path, what: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(FfdeckError::validation(format!("Please specify the {}", what)));
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Split user-supplied extra arguments on whitespace. Quotes are not
/// interpreted: `-metadata title="a b"` yields three tokens.
pub fn split_extra_args(extra: &str) -> Vec<String> {
    extra.split_whitespace().map(str::to_string).collect()
}

/// Make a path safe to embed in a quoted filter argument: backslashes become
/// forward slashes and drive-letter colons are escaped. A single quote would
/// end the quoting, so such paths are refused.
pub fn escape_filter_path(path: &Path) -> Result<String> {
    let text = path.to_string_lossy();
    if text.contains('\'') {
        return Err(FfdeckError::validation(format!(
            "Subtitle path cannot contain a single quote: {}",
            path.display()
        )));
    }
    Ok(text.replace('\\', "/").replace(':', "\\:"))
}
