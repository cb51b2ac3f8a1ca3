use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

// The only two signals relied on in ffmpeg's diagnostic output
static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Duration: (\d{2}):(\d{2}):(\d{2}\.\d{2})").expect("duration regex pattern is invalid")
});
static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"time=(\d{2}):(\d{2}):(\d{2}\.\d{2})").expect("time regex pattern is invalid")
});

/// Completion of the current run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProgressState {
    pub total_seconds: Option<f64>,
    pub current_seconds: f64,
    /// 0..=100, `None` while the total is unknown
    pub percent: Option<f64>,
}

impl ProgressState {
    pub fn is_indeterminate(&self) -> bool {
        self.percent.is_none()
    }
}

/// What a single line changed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressUpdate {
    /// The total length became known
    Duration(f64),
    /// A new position was reported
    Advanced(ProgressState),
}

/// Incremental extraction of progress from a line-oriented text stream.
///
/// Lines that cannot be understood are ignored; they never make a run fail.
pub trait ProgressParser: Send {
    fn observe(&mut self, line: &str) -> Option<ProgressUpdate>;

    fn state(&self) -> ProgressState;

    fn reset(&mut self);
}

/// Reads ffmpeg's `Duration:` banner and `time=` status fields
#[derive(Debug, Default)]
pub struct FfmpegProgressParser {
    state: ProgressState,
}

impl FfmpegProgressParser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressParser for FfmpegProgressParser {
    fn observe(&mut self, line: &str) -> Option<ProgressUpdate> {
        let mut update = None;

        if self.state.total_seconds.is_none() {
            if let Some(total) = capture_seconds(&DURATION_RE, line) {
                self.state.total_seconds = Some(total);
                self.state.percent = Some(0.0);
                update = Some(ProgressUpdate::Duration(total));
            }
        }

        if let Some(total) = self.state.total_seconds {
            if let Some(current) = capture_seconds(&TIME_RE, line) {
                self.state.current_seconds = current;
                self.state.percent = Some(percent_of(current, total));
                update = Some(ProgressUpdate::Advanced(self.state));
            }
        }

        update
    }

    fn state(&self) -> ProgressState {
        self.state
    }

    fn reset(&mut self) {
        self.state = ProgressState::default();
    }
}

/// `HH:MM:SS.ss` captured by `re`, converted to seconds
fn capture_seconds(re: &Regex, line: &str) -> Option<f64> {
    let caps = re.captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Share of `total` reached at `current`, capped at 100
fn percent_of(current: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 100.0;
    }
    (current / total * 100.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANNER: &str = "  Duration: 00:01:40.00, start: 0.000000, bitrate: 1205 kb/s";

    #[test]
    fn test_halfway() {
        let mut parser = FfmpegProgressParser::new();
        assert_eq!(parser.observe(BANNER), Some(ProgressUpdate::Duration(100.0)));

        let update = parser.observe("frame= 1500 fps=250 q=28.0 size=  2048kB time=00:00:50.00 bitrate= 335.5kbits/s");
        let state = parser.state();
        assert_eq!(update, Some(ProgressUpdate::Advanced(state)));
        assert_eq!(state.current_seconds, 50.0);
        assert_eq!(state.percent, Some(50.0));
    }

    #[test]
    fn test_clamped_at_hundred() {
        let mut parser = FfmpegProgressParser::new();
        parser.observe("Duration: 00:01:40.00");
        parser.observe("time=00:02:00.00");
        assert_eq!(parser.state().percent, Some(100.0));
    }

    #[test]
    fn test_indeterminate_before_duration() {
        let mut parser = FfmpegProgressParser::new();
        assert_eq!(parser.observe("time=00:00:10.00"), None);
        assert!(parser.state().is_indeterminate());
        assert_eq!(parser.state().current_seconds, 0.0);
    }

    #[test]
    fn test_only_first_duration_counts() {
        let mut parser = FfmpegProgressParser::new();
        parser.observe("Duration: 00:01:40.00");
        assert_eq!(parser.observe("Duration: 01:00:00.00"), None);
        assert_eq!(parser.state().total_seconds, Some(100.0));
    }

    #[test]
    fn test_hours_minutes_seconds() {
        let mut parser = FfmpegProgressParser::new();
        parser.observe("Duration: 01:02:03.50");
        assert_eq!(parser.state().total_seconds, Some(3723.5));
    }

    #[test]
    fn test_progress_pipe_out_time() {
        let mut parser = FfmpegProgressParser::new();
        parser.observe("Duration: 00:00:10.00");
        parser.observe("out_time=00:00:02.500000");
        assert_eq!(parser.state().percent, Some(25.0));
        assert_eq!(parser.observe("out_time=N/A"), None);
    }

    #[test]
    fn test_backwards_time_is_not_rejected() {
        let mut parser = FfmpegProgressParser::new();
        parser.observe("Duration: 00:01:40.00");
        parser.observe("time=00:01:00.00");
        parser.observe("time=00:00:20.00");
        assert_eq!(parser.state().percent, Some(20.0));
    }

    #[test]
    fn test_reset() {
        let mut parser = FfmpegProgressParser::new();
        parser.observe("Duration: 00:01:40.00");
        parser.observe("time=00:00:50.00");
        parser.reset();
        assert_eq!(parser.state(), ProgressState::default());
    }
}
