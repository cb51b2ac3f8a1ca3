use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Codec name that tells ffmpeg to pass a stream through untouched
pub const COPY_CODEC: &str = "copy";

/// Start time treated as "from the beginning"
pub const ZERO_TIME: &str = "00:00:00";

/// Video codecs that understand `-crf` and `-preset`
pub const RATE_CONTROLLED_CODECS: [&str; 2] = ["libx264", "libx265"];

/// Audio codecs for which a bitrate makes no sense
pub const LOSSLESS_AUDIO_CODECS: [&str; 2] = ["flac", "pcm_s16le"];

/// Extensions picked up when a folder is added to a batch
pub const VIDEO_EXTENSIONS: [&str; 10] = [
    "mp4", "avi", "mkv", "mov", "flv", "wmv", "webm", "m4v", "mpg", "mpeg",
];

/// User choices for one operation. Built fresh per invocation and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOptions {
    Convert(ConvertOptions),
    Trim(TrimOptions),
    Merge(MergeOptions),
    Filter(FilterOptions),
    AudioExtract(AudioExtractOptions),
    Subtitle(SubtitleOptions),
    Watermark(WatermarkOptions),
}

impl OperationOptions {
    /// Short human-readable operation name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Convert(_) => "conversion",
            Self::Trim(_) => "trim",
            Self::Merge(_) => "merge",
            Self::Filter(_) => "filter",
            Self::AudioExtract(_) => "audio extraction",
            Self::Subtitle(_) => "subtitles",
            Self::Watermark(_) => "watermark",
        }
    }

    /// The first (or only) media input
    pub fn primary_input(&self) -> Option<&Path> {
        match self {
            Self::Convert(o) => Some(&o.input),
            Self::Trim(o) => Some(&o.input),
            Self::Merge(o) => o.inputs.first().map(PathBuf::as_path),
            Self::Filter(o) => Some(&o.input),
            Self::AudioExtract(o) => Some(&o.input),
            Self::Subtitle(o) => Some(&o.input),
            Self::Watermark(o) => Some(&o.input),
        }
    }

    pub fn output(&self) -> &Path {
        match self {
            Self::Convert(o) => &o.output,
            Self::Trim(o) => &o.output,
            Self::Merge(o) => &o.output,
            Self::Filter(o) => &o.output,
            Self::AudioExtract(o) => &o.output,
            Self::Subtitle(o) => &o.output,
            Self::Watermark(o) => &o.output,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
    /// Only used with libx264/libx265
    pub crf: u8,
    /// Only used with libx264/libx265
    pub preset: String,
    /// e.g. `2M`, `5000k`
    pub video_bitrate: Option<String>,
    pub resize: Option<Resize>,
    pub fps: Option<u32>,
    pub hw_accel: bool,
    /// Appended verbatim after splitting on whitespace. Quoting is not
    /// understood, so a path containing spaces cannot be passed here.
    pub extra_args: String,
}

impl ConvertOptions {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input: P, output: Q) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            crf: 23,
            preset: "medium".to_string(),
            video_bitrate: None,
            resize: None,
            fps: None,
            hw_accel: false,
            extra_args: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resize {
    /// Explicit dimensions; a missing side keeps the aspect ratio
    Dimensions {
        width: Option<u32>,
        height: Option<u32>,
    },
    /// Preset such as `1920x1080`
    Preset(String),
}

impl Resize {
    /// The `scale=` expression, if this resize does anything
    pub fn scale_filter(&self) -> Option<String> {
        match self {
            Self::Dimensions { width: Some(w), height: Some(h) } => Some(format!("scale={}:{}", w, h)),
            Self::Dimensions { width: Some(w), height: None } => Some(format!("scale={}:-2", w)),
            Self::Dimensions { width: None, height: Some(h) } => Some(format!("scale=-2:{}", h)),
            Self::Dimensions { width: None, height: None } => None,
            Self::Preset(resolution) => Some(format!("scale={}", resolution)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrimEnd {
    /// `-t`
    Duration(String),
    /// `-to`
    EndTime(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrimOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start: String,
    pub end: TrimEnd,
    pub reencode: bool,
}

impl TrimOptions {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input: P, output: Q) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            start: ZERO_TIME.to_string(),
            end: TrimEnd::Duration("00:00:10".to_string()),
            reencode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOptions {
    /// Joined in this order
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub reencode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    #[value(name = "0")]
    None,
    #[value(name = "90")]
    Clockwise90,
    #[value(name = "180")]
    Clockwise180,
    #[value(name = "270")]
    Clockwise270,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub rotation: Rotation,
    pub hflip: bool,
    pub vflip: bool,
    /// Playback speed multiplier, 1.0 = unchanged
    pub speed: f64,
    /// -1.0..1.0, neutral 0
    pub brightness: f64,
    /// neutral 1.0
    pub contrast: f64,
    /// neutral 1.0
    pub saturation: f64,
    /// Box blur radius; `None` disables the blur
    pub blur_radius: Option<u32>,
}

impl FilterOptions {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input: P, output: Q) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            rotation: Rotation::None,
            hflip: false,
            vflip: false,
            speed: 1.0,
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            blur_radius: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum Channels {
    Mono,
    #[default]
    Stereo,
}

impl Channels {
    pub fn count(self) -> u32 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

/// Leading cut applied before extracting audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrim {
    pub start: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioExtractOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Output container, used to resolve the `auto` codec
    pub format: String,
    /// `auto`, `copy` or an explicit encoder
    pub codec: String,
    pub bitrate: String,
    pub sample_rate: u32,
    pub channels: Channels,
    pub trim: Option<AudioTrim>,
    /// Gain multiplier, 1.0 = unchanged
    pub volume: f64,
    /// Fade-in length in seconds
    pub fade_in: Option<f64>,
    /// Fade-out length in seconds. The start point is not computed from the
    /// media length, so ffmpeg fades from its own default position.
    pub fade_out: Option<f64>,
}

impl AudioExtractOptions {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input: P, output: Q) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            format: "mp3".to_string(),
            codec: "auto".to_string(),
            bitrate: "192k".to_string(),
            sample_rate: 44100,
            channels: Channels::Stereo,
            trim: None,
            volume: 1.0,
            fade_in: None,
            fade_out: None,
        }
    }
}

/// Encoder chosen for an audio container when the codec is `auto`
pub fn audio_codec_for_format(format: &str) -> &'static str {
    match format {
        "mp3" => "libmp3lame",
        "aac" | "m4a" => "aac",
        "wav" => "pcm_s16le",
        "flac" => "flac",
        "ogg" => "libvorbis",
        "opus" => "libopus",
        "ac3" => "ac3",
        _ => "aac",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum SubtitleMode {
    /// Muxed as a separate, toggleable track
    #[default]
    Soft,
    /// Rendered into the video pixels
    Hard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleOptions {
    pub input: PathBuf,
    pub subtitle: PathBuf,
    pub output: PathBuf,
    pub mode: SubtitleMode,
    /// Hard mode only
    pub font_size: u32,
    /// Hard mode only; a colour name or a `BBGGRR` hex value
    pub color: String,
}

impl SubtitleOptions {
    pub fn new<P, S, Q>(input: P, subtitle: S, output: Q) -> Self
    where
        P: Into<PathBuf>,
        S: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        Self {
            input: input.into(),
            subtitle: subtitle.into(),
            output: output.into(),
            mode: SubtitleMode::Soft,
            font_size: 24,
            color: "white".to_string(),
        }
    }
}

/// ASS `PrimaryColour` value (blue-green-red order) for a colour name.
/// Six hex digits are passed through unchanged.
pub fn ass_colour(color: &str) -> Option<String> {
    let hex = match color.to_ascii_lowercase().as_str() {
        "white" => "FFFFFF",
        "yellow" => "00FFFF",
        "red" => "0000FF",
        "green" => "00FF00",
        "blue" => "FF0000",
        "black" => "000000",
        other if other.len() == 6 && other.chars().all(|c| c.is_ascii_hexdigit()) => {
            return Some(other.to_ascii_uppercase());
        }
        _ => return None,
    };
    Some(hex.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum WatermarkPosition {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl WatermarkPosition {
    /// `overlay=` coordinates for this corner at the given margin
    pub fn overlay_expression(self, margin: u32) -> String {
        match self {
            Self::TopLeft => format!("{m}:{m}", m = margin),
            Self::TopRight => format!("W-w-{m}:{m}", m = margin),
            Self::BottomLeft => format!("{m}:H-h-{m}", m = margin),
            Self::BottomRight => format!("W-w-{m}:H-h-{m}", m = margin),
            Self::Center => "(W-w)/2:(H-h)/2".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkOptions {
    pub input: PathBuf,
    /// Image overlaid on the video
    pub watermark: PathBuf,
    pub output: PathBuf,
    pub position: WatermarkPosition,
    pub margin: u32,
    /// 0.0 (invisible) to 1.0 (opaque)
    pub opacity: f64,
}

impl WatermarkOptions {
    pub fn new<P, W, Q>(input: P, watermark: W, output: Q) -> Self
    where
        P: Into<PathBuf>,
        W: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        Self {
            input: input.into(),
            watermark: watermark.into(),
            output: output.into(),
            position: WatermarkPosition::TopRight,
            margin: 10,
            opacity: 0.8,
        }
    }
}
