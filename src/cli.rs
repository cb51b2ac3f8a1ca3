use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::DefaultsConfig;
use crate::media::batch::{BatchFilter, BatchOperation};
use crate::media::options::*;

const PRESETS: [&str; 9] = [
    "ultrafast", "superfast", "veryfast", "faster", "fast", "medium", "slow", "slower", "veryslow",
];

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the ffmpeg command line instead of running it
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a video to another format or codec
    Convert(ConvertArgs),

    /// Cut a section out of a video
    Trim(TrimArgs),

    /// Join several videos in the given order
    Merge(MergeArgs),

    /// Rotate, flip, speed up or colour-correct a video
    Filter(FilterArgs),

    /// Extract the audio track of a video
    Audio(AudioArgs),

    /// Add a subtitle track or burn subtitles into the picture
    Subtitle(SubtitleArgs),

    /// Overlay an image on a video
    Watermark(WatermarkArgs),

    /// Apply one operation to many files
    Batch(BatchArgs),

    /// Show format and stream information (ffprobe)
    Info {
        /// Media file to inspect
        input: PathBuf,
    },

    /// Play a file with ffplay
    Preview {
        /// Media file to play
        input: PathBuf,
    },

    /// Check that ffmpeg can be executed and show its version
    Check,

    /// Inspect or edit the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Remember the ffmpeg binary to use
    SetFfmpeg {
        /// Path to the ffmpeg executable
        path: String,
    },
}

/// `<dir>/<stem><suffix>.<extension>`; the input's own extension when none is given
pub fn suggested_output(input: &Path, suffix: &str, extension: Option<&str>) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let extension = extension
        .map(str::to_string)
        .or_else(|| input.extension().map(|e| e.to_string_lossy().to_string()));
    let name = match extension {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext),
        None => format!("{}{}", stem, suffix),
    };
    input.with_file_name(name)
}

#[derive(ClapArgs)]
pub struct ConvertArgs {
    /// Input video file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file (default: <input>_converted.<format>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output container (mp4, mkv, webm, ...)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Video codec (copy, libx264, libx265, libvpx-vp9, ...)
    #[arg(long)]
    pub video_codec: Option<String>,

    /// Audio codec (copy, aac, libmp3lame, libopus, ...)
    #[arg(long)]
    pub audio_codec: Option<String>,

    /// Constant rate factor, libx264/libx265 only
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=51))]
    pub crf: Option<u8>,

    /// Encoder preset, libx264/libx265 only
    #[arg(long, value_parser = PRESETS)]
    pub preset: Option<String>,

    /// Video bitrate such as 2M or 5000k
    #[arg(long)]
    pub bitrate: Option<String>,

    /// Preset resolution such as 1920x1080
    #[arg(long, conflicts_with_all = ["width", "height"])]
    pub resolution: Option<String>,

    /// Output width; height follows the aspect ratio if not given
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height; width follows the aspect ratio if not given
    #[arg(long)]
    pub height: Option<u32>,

    /// Output frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Let ffmpeg pick a hardware decoder
    #[arg(long)]
    pub hw_accel: bool,

    /// Extra ffmpeg arguments, split on whitespace
    #[arg(long, allow_hyphen_values = true)]
    pub extra_args: Option<String>,
}

impl ConvertArgs {
    pub fn into_options(self, defaults: &DefaultsConfig) -> ConvertOptions {
        let format = self.format.unwrap_or_else(|| defaults.format.clone());
        let output = self
            .output
            .unwrap_or_else(|| suggested_output(&self.input, "_converted", Some(format.as_str())));

        let mut options = ConvertOptions::new(self.input, output);
        options.video_codec = self.video_codec.unwrap_or_else(|| defaults.video_codec.clone());
        options.audio_codec = self.audio_codec.unwrap_or_else(|| defaults.audio_codec.clone());
        options.crf = self.crf.unwrap_or(defaults.crf);
        options.preset = self.preset.unwrap_or_else(|| defaults.preset.clone());
        options.video_bitrate = self.bitrate;
        options.resize = match (self.resolution, self.width, self.height) {
            (Some(resolution), _, _) => Some(Resize::Preset(resolution)),
            (None, None, None) => None,
            (None, width, height) => Some(Resize::Dimensions { width, height }),
        };
        options.fps = self.fps;
        options.hw_accel = self.hw_accel;
        options.extra_args = self.extra_args.unwrap_or_default();
        options
    }
}

#[derive(ClapArgs)]
pub struct TrimArgs {
    /// Input video file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file (default: <input>_trimmed)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Start position (HH:MM:SS)
    #[arg(short, long, default_value = ZERO_TIME)]
    pub start: String,

    /// Length of the cut (HH:MM:SS)
    #[arg(short, long, default_value = "00:00:10", conflicts_with = "end")]
    pub duration: String,

    /// End position (HH:MM:SS) instead of a duration
    #[arg(short, long)]
    pub end: Option<String>,

    /// Re-encode instead of copying streams (frame-accurate cuts)
    #[arg(long)]
    pub reencode: bool,
}

impl TrimArgs {
    pub fn into_options(self) -> TrimOptions {
        let output = self
            .output
            .unwrap_or_else(|| suggested_output(&self.input, "_trimmed", None));
        let mut options = TrimOptions::new(self.input, output);
        options.start = self.start;
        options.end = match self.end {
            Some(end) => TrimEnd::EndTime(end),
            None => TrimEnd::Duration(self.duration),
        };
        options.reencode = self.reencode;
        options
    }
}

#[derive(ClapArgs)]
pub struct MergeArgs {
    /// Videos to join, in order
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Output file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Re-encode instead of copying (inputs with different codecs)
    #[arg(long)]
    pub reencode: bool,
}

impl MergeArgs {
    pub fn into_options(self) -> MergeOptions {
        MergeOptions {
            inputs: self.inputs,
            output: self.output,
            reencode: self.reencode,
        }
    }
}

#[derive(ClapArgs)]
pub struct FilterArgs {
    /// Input video file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file (default: <input>_filtered)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Clockwise rotation in degrees
    #[arg(long, value_enum, default_value = "0")]
    pub rotate: Rotation,

    /// Mirror horizontally
    #[arg(long)]
    pub hflip: bool,

    /// Mirror vertically
    #[arg(long)]
    pub vflip: bool,

    /// Playback speed multiplier (0.25-4.0)
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,

    /// Brightness (-1.0 to 1.0)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub brightness: f64,

    /// Contrast (0.0 to 2.0)
    #[arg(long, default_value_t = 1.0)]
    pub contrast: f64,

    /// Saturation (0.0 to 3.0)
    #[arg(long, default_value_t = 1.0)]
    pub saturation: f64,

    /// Box blur radius
    #[arg(long)]
    pub blur: Option<u32>,
}

impl FilterArgs {
    pub fn into_options(self) -> FilterOptions {
        let output = self
            .output
            .unwrap_or_else(|| suggested_output(&self.input, "_filtered", None));
        let mut options = FilterOptions::new(self.input, output);
        options.rotation = self.rotate;
        options.hflip = self.hflip;
        options.vflip = self.vflip;
        options.speed = self.speed;
        options.brightness = self.brightness;
        options.contrast = self.contrast;
        options.saturation = self.saturation;
        options.blur_radius = self.blur;
        options
    }
}

#[derive(ClapArgs)]
pub struct AudioArgs {
    /// Input video file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file (default: <input>.<format>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Audio container
    #[arg(short, long, default_value = "mp3",
          value_parser = ["mp3", "aac", "wav", "flac", "ogg", "m4a", "wma", "opus", "ac3"])]
    pub format: String,

    /// Encoder, or `auto` to pick one from the format
    #[arg(long, default_value = "auto")]
    pub codec: String,

    /// Audio bitrate
    #[arg(short, long, default_value = "192k")]
    pub bitrate: String,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 44100)]
    pub sample_rate: u32,

    /// Channel layout
    #[arg(long, value_enum, default_value = "stereo")]
    pub channels: Channels,

    /// Start of the extracted part (HH:MM:SS); enables trimming
    #[arg(long, requires = "duration")]
    pub start: Option<String>,

    /// Length of the extracted part (HH:MM:SS)
    #[arg(long)]
    pub duration: Option<String>,

    /// Gain multiplier
    #[arg(long, default_value_t = 1.0)]
    pub volume: f64,

    /// Fade-in length in seconds
    #[arg(long)]
    pub fade_in: Option<f64>,

    /// Fade-out length in seconds
    #[arg(long)]
    pub fade_out: Option<f64>,
}

impl AudioArgs {
    pub fn into_options(self) -> AudioExtractOptions {
        let output = self
            .output
            .unwrap_or_else(|| suggested_output(&self.input, "", Some(self.format.as_str())));
        let mut options = AudioExtractOptions::new(self.input, output);
        options.format = self.format;
        options.codec = self.codec;
        options.bitrate = self.bitrate;
        options.sample_rate = self.sample_rate;
        options.channels = self.channels;
        options.trim = match (self.start, self.duration) {
            (None, None) => None,
            (start, duration) => Some(AudioTrim {
                start: start.unwrap_or_else(|| ZERO_TIME.to_string()),
                duration: duration.unwrap_or_default(),
            }),
        };
        options.volume = self.volume;
        options.fade_in = self.fade_in;
        options.fade_out = self.fade_out;
        options
    }
}

#[derive(ClapArgs)]
pub struct SubtitleArgs {
    /// Input video file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Subtitle file (.srt, .ass, .ssa, .vtt)
    #[arg(short, long)]
    pub subtitle: PathBuf,

    /// Output file (default: <input>_subtitled)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Separate track (soft) or burned into the picture (hard)
    #[arg(long, value_enum, default_value = "soft")]
    pub mode: SubtitleMode,

    /// Font size, hard mode only
    #[arg(long, default_value_t = 24)]
    pub font_size: u32,

    /// white, yellow, red, green, blue, black or a BBGGRR hex value; hard mode only
    #[arg(long, default_value = "white")]
    pub color: String,
}

impl SubtitleArgs {
    pub fn into_options(self) -> SubtitleOptions {
        let output = self
            .output
            .unwrap_or_else(|| suggested_output(&self.input, "_subtitled", None));
        let mut options = SubtitleOptions::new(self.input, self.subtitle, output);
        options.mode = self.mode;
        options.font_size = self.font_size;
        options.color = self.color;
        options
    }
}

#[derive(ClapArgs)]
pub struct WatermarkArgs {
    /// Input video file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Image to overlay
    #[arg(short, long)]
    pub watermark: PathBuf,

    /// Output file (default: <input>_watermarked)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Corner (or centre) the image is placed in
    #[arg(long, value_enum, default_value = "top-right")]
    pub position: WatermarkPosition,

    /// Distance from the edges in pixels
    #[arg(long, default_value_t = 10)]
    pub margin: u32,

    /// 0.0 (invisible) to 1.0 (opaque)
    #[arg(long, default_value_t = 0.8)]
    pub opacity: f64,
}

impl WatermarkArgs {
    pub fn into_options(self) -> WatermarkOptions {
        let output = self
            .output
            .unwrap_or_else(|| suggested_output(&self.input, "_watermarked", None));
        let mut options = WatermarkOptions::new(self.input, self.watermark, output);
        options.position = self.position;
        options.margin = self.margin;
        options.opacity = self.opacity;
        options
    }
}

#[derive(ClapArgs)]
pub struct BatchArgs {
    /// File or folder to process; repeat for more. Folders contribute their video files
    #[arg(short, long = "input", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output folder, created if missing
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Output name pattern; {name} is the input base name, {ext} the new extension
    #[arg(short, long)]
    pub pattern: Option<String>,

    #[command(subcommand)]
    pub operation: BatchOperationArgs,
}

#[derive(Subcommand)]
pub enum BatchOperationArgs {
    /// Re-encode every file
    Convert {
        #[arg(short, long, default_value = "mp4")]
        format: String,
        #[arg(long, default_value = "libx264")]
        codec: String,
        #[arg(long, default_value_t = 23, value_parser = clap::value_parser!(u8).range(0..=51))]
        crf: u8,
    },
    /// Extract the audio of every file
    Audio {
        #[arg(short, long, default_value = "mp3", value_parser = ["mp3", "aac", "wav", "flac"])]
        format: String,
        #[arg(short, long, default_value = "192k")]
        bitrate: String,
    },
    /// Scale every file to one resolution
    Resize {
        #[arg(short, long, default_value = "1280x720")]
        resolution: String,
    },
    /// Apply a simple look to every file
    Filter {
        #[arg(value_enum)]
        filter: BatchFilter,
    },
}

impl From<BatchOperationArgs> for BatchOperation {
    fn from(args: BatchOperationArgs) -> Self {
        match args {
            BatchOperationArgs::Convert { format, codec, crf } => Self::Convert { format, codec, crf },
            BatchOperationArgs::Audio { format, bitrate } => Self::Audio { format, bitrate },
            BatchOperationArgs::Resize { resolution } => Self::Resize { resolution },
            BatchOperationArgs::Filter { filter } => Self::Filter { filter },
        }
    }
}
