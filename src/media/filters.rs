//! Filter chains assembled from ordered, independently testable stages.
//!
//! Each stage looks at the options and contributes at most one filter
//! expression. The chain joins the contributions with `,` in stage order.

use super::options::{AudioExtractOptions, FilterOptions, Rotation};

/// A named step of a filter chain
pub struct FilterStage<T> {
    pub name: &'static str,
    produce: fn(&T) -> Option<String>,
}

impl<T> FilterStage<T> {
    pub const fn new(name: &'static str, produce: fn(&T) -> Option<String>) -> Self {
        Self { name, produce }
    }

    /// The expression this stage adds, or `None` when its condition is not met
    pub fn expression(&self, options: &T) -> Option<String> {
        (self.produce)(options)
    }
}

/// Fixed-order list of stages
pub struct FilterChain<T: 'static> {
    stages: &'static [FilterStage<T>],
}

impl<T> FilterChain<T> {
    pub const fn new(stages: &'static [FilterStage<T>]) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name).collect()
    }

    /// Expressions of every enabled stage, in order
    pub fn expressions(&self, options: &T) -> Vec<String> {
        self.stages
            .iter()
            .filter_map(|stage| stage.expression(options))
            .collect()
    }

    /// The comma-joined chain, or `None` if no stage is enabled
    pub fn render(&self, options: &T) -> Option<String> {
        let expressions = self.expressions(options);
        if expressions.is_empty() {
            None
        } else {
            Some(expressions.join(","))
        }
    }
}

/// `-vf` chain of the filter operation
pub static VIDEO_FILTERS: FilterChain<FilterOptions> = FilterChain::new(&[
    FilterStage::new("rotate", rotate),
    FilterStage::new("hflip", hflip),
    FilterStage::new("vflip", vflip),
    FilterStage::new("speed", speed),
    FilterStage::new("color", color),
    FilterStage::new("blur", blur),
]);

/// `-af` chain of audio extraction
pub static AUDIO_FILTERS: FilterChain<AudioExtractOptions> = FilterChain::new(&[
    FilterStage::new("volume", volume),
    FilterStage::new("fade-in", fade_in),
    FilterStage::new("fade-out", fade_out),
]);

fn rotate(options: &FilterOptions) -> Option<String> {
    let expression = match options.rotation {
        Rotation::None => return None,
        Rotation::Clockwise90 => "transpose=1",
        Rotation::Clockwise180 => "transpose=1,transpose=1",
        Rotation::Clockwise270 => "transpose=2",
    };
    Some(expression.to_string())
}

fn hflip(options: &FilterOptions) -> Option<String> {
    options.hflip.then(|| "hflip".to_string())
}

fn vflip(options: &FilterOptions) -> Option<String> {
    options.vflip.then(|| "vflip".to_string())
}

fn speed(options: &FilterOptions) -> Option<String> {
    if options.speed == 1.0 {
        return None;
    }
    Some(format!("setpts={}*PTS", 1.0 / options.speed))
}

fn color(options: &FilterOptions) -> Option<String> {
    if options.brightness == 0.0 && options.contrast == 1.0 && options.saturation == 1.0 {
        return None;
    }
    Some(format!(
        "eq=brightness={}:contrast={}:saturation={}",
        options.brightness, options.contrast, options.saturation
    ))
}

fn blur(options: &FilterOptions) -> Option<String> {
    options
        .blur_radius
        .map(|radius| format!("boxblur={r}:{r}", r = radius))
}

fn volume(options: &AudioExtractOptions) -> Option<String> {
    if options.volume == 1.0 {
        return None;
    }
    Some(format!("volume={}", options.volume))
}

fn fade_in(options: &AudioExtractOptions) -> Option<String> {
    options
        .fade_in
        .map(|seconds| format!("afade=t=in:st=0:d={}", seconds))
}

fn fade_out(options: &AudioExtractOptions) -> Option<String> {
    options
        .fade_out
        .map(|seconds| format!("afade=t=out:d={}", seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_options() -> FilterOptions {
        FilterOptions::new("in.mp4", "out.mp4")
    }

    #[test]
    fn test_neutral_options_produce_no_chain() {
        assert_eq!(VIDEO_FILTERS.render(&filter_options()), None);
        assert_eq!(
            AUDIO_FILTERS.render(&AudioExtractOptions::new("in.mp4", "out.mp3")),
            None
        );
    }

    #[test]
    fn test_stage_order_is_fixed() {
        assert_eq!(
            VIDEO_FILTERS.stage_names(),
            vec!["rotate", "hflip", "vflip", "speed", "color", "blur"]
        );

        let mut options = filter_options();
        options.blur_radius = Some(3);
        options.hflip = true;
        options.rotation = Rotation::Clockwise270;
        options.speed = 2.0;

        assert_eq!(
            VIDEO_FILTERS.render(&options).as_deref(),
            Some("transpose=2,hflip,setpts=0.5*PTS,boxblur=3:3")
        );
    }

    #[test]
    fn test_rotation_expressions() {
        let mut options = filter_options();
        options.rotation = Rotation::Clockwise90;
        assert_eq!(rotate(&options).as_deref(), Some("transpose=1"));
        options.rotation = Rotation::Clockwise180;
        assert_eq!(rotate(&options).as_deref(), Some("transpose=1,transpose=1"));
    }

    #[test]
    fn test_color_stage_enabled_by_any_non_neutral_value() {
        let mut options = filter_options();
        options.saturation = 1.5;
        assert_eq!(
            color(&options).as_deref(),
            Some("eq=brightness=0:contrast=1:saturation=1.5")
        );
    }

    #[test]
    fn test_audio_chain() {
        let mut options = AudioExtractOptions::new("in.mp4", "out.mp3");
        options.volume = 1.5;
        options.fade_in = Some(3.0);
        options.fade_out = Some(2.5);

        assert_eq!(
            AUDIO_FILTERS.render(&options).as_deref(),
            Some("volume=1.5,afade=t=in:st=0:d=3,afade=t=out:d=2.5")
        );
    }
}
