// src/negotiate.rs
//! Capture format negotiation.
//!
//! A capture source lists its native media types in its own preference
//! order. Negotiation walks that list for the first type with the required
//! resolution and frame rate, then makes sure the presenter can draw it:
//! the native subtype is used if a converter exists, otherwise each
//! supported subtype is offered to the source in registry order as an
//! alternate (sources often decode internally).

use crate::config::CaptureConfig;
use crate::device::{GraphicsBackend, Presenter};
use crate::error::{PresentError, Result};
use crate::format::MediaType;
use crate::lock::MediaBuffer;
use log::{debug, info, warn};

/// A device that produces frames in one of several media types.
pub trait CaptureSource {
    /// Native types in preference order.
    fn native_types(&self) -> Vec<MediaType>;

    /// Makes `media` the output type. Fails if the source cannot produce it.
    fn set_current_type(&mut self, media: &MediaType) -> Result<()>;

    fn current_type(&self) -> Option<MediaType>;

    /// Next frame in the current type; `None` marks a stream gap.
    fn read_sample(&mut self) -> Result<Option<Box<dyn MediaBuffer + Send>>>;
}

/// The capture mode the application asks for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Requirement {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Absolute tolerance on `fps`. Rates like 30000/1001 need one.
    pub fps_tolerance: f64,
}

impl Requirement {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            fps_tolerance: CaptureConfig::default().fps_tolerance,
        }
    }

    pub fn with_tolerance(mut self, fps_tolerance: f64) -> Self {
        self.fps_tolerance = fps_tolerance.abs();
        self
    }

    pub fn matches(&self, media: &MediaType) -> bool {
        if media.width != self.width || media.height != self.height {
            return false;
        }
        if media.frame_rate.denominator == 0 {
            return false;
        }
        (media.frame_rate.as_f64() - self.fps).abs() <= self.fps_tolerance
    }
}

impl From<&CaptureConfig> for Requirement {
    fn from(config: &CaptureConfig) -> Self {
        Requirement::new(config.width, config.height, config.fps)
            .with_tolerance(config.fps_tolerance)
    }
}

/// Picks a media type satisfying `requirement`, sets it on the source and
/// hands it to the presenter.
///
/// Returns the type in effect. A type the presenter rejects is skipped in
/// favour of the next match; an absent device ends negotiation at once.
/// When nothing is usable the last presenter rejection is returned, or
/// `NegotiationFailed` if there was none.
pub fn negotiate<S, B>(
    source: &mut S,
    presenter: &Presenter<B>,
    requirement: &Requirement,
) -> Result<MediaType>
where
    S: CaptureSource + ?Sized,
    B: GraphicsBackend,
{
    let native = source.native_types();
    debug!("negotiate: {} native types offered", native.len());

    let mut rejection = None;
    for candidate in native.iter().filter(|media| requirement.matches(media)) {
        debug!(
            "negotiate: {} {}x{} @ {}/{} matches",
            candidate.subtype,
            candidate.width,
            candidate.height,
            candidate.frame_rate.numerator,
            candidate.frame_rate.denominator
        );
        let Some(chosen) = adjust_to_presenter(source, presenter, candidate)? else {
            continue;
        };
        match presenter.set_media_type(&chosen) {
            Ok(()) => {
                info!(
                    "negotiate: selected {} {}x{}",
                    chosen.subtype, chosen.width, chosen.height
                );
                return Ok(chosen);
            }
            Err(PresentError::NotInitialized) => return Err(PresentError::NotInitialized),
            Err(e) => {
                debug!("negotiate: presenter rejected {}: {}", chosen.subtype, e);
                rejection = Some(e);
            }
        }
    }

    warn!(
        "negotiate: no native type for {}x{} @ {} fps",
        requirement.width, requirement.height, requirement.fps
    );
    Err(rejection.unwrap_or(PresentError::NegotiationFailed))
}

/// Sets `native` (or a presentable alternate) on the source.
fn adjust_to_presenter<S, B>(
    source: &mut S,
    presenter: &Presenter<B>,
    native: &MediaType,
) -> Result<Option<MediaType>>
where
    S: CaptureSource + ?Sized,
    B: GraphicsBackend,
{
    if presenter.is_format_supported(native.subtype) {
        return match source.set_current_type(native) {
            Ok(()) => Ok(Some(native.clone())),
            Err(e) => {
                debug!("negotiate: source rejected native {}: {}", native.subtype, e);
                Ok(None)
            }
        };
    }

    for subtype in presenter.supported_formats() {
        let alternate = MediaType {
            subtype,
            // Stride belongs to the native layout; derive it for the alternate.
            default_stride: None,
            ..native.clone()
        };
        match source.set_current_type(&alternate) {
            Ok(()) => {
                debug!("negotiate: {} accepted in place of {}", subtype, native.subtype);
                return Ok(Some(alternate));
            }
            Err(e) => debug!("negotiate: alternate {} rejected: {}", subtype, e),
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HeadlessBackend, HeadlessWindow, PresenterOptions};
    use crate::format::{FourCc, Ratio};
    use crate::source::TestPatternSource;
    use test_log::test;

    fn presenter() -> Presenter<HeadlessBackend> {
        let presenter = Presenter::new(HeadlessBackend::new(), PresenterOptions::default());
        presenter.create_device(HeadlessWindow::new(640, 480)).unwrap();
        presenter
    }

    #[test]
    fn ntsc_rate_matches_within_tolerance() {
        let requirement = Requirement::new(1280, 720, 30.0);
        let ntsc = MediaType::new(FourCc::NV12, 1280, 720, Ratio::new(30000, 1001));
        assert!(requirement.matches(&ntsc));
        assert!(!requirement.with_tolerance(0.0).matches(&ntsc));

        let slow = MediaType::new(FourCc::NV12, 1280, 720, Ratio::new(15, 1));
        assert!(!requirement.matches(&slow));
        let degenerate = MediaType::new(FourCc::NV12, 1280, 720, Ratio::new(30, 0));
        assert!(!requirement.matches(&degenerate));
    }

    #[test]
    fn first_matching_native_type_wins() {
        let presenter = presenter();
        let mut source = TestPatternSource::new(vec![
            MediaType::new(FourCc::YUY2, 640, 480, Ratio::new(15, 1)),
            MediaType::new(FourCc::YUY2, 1280, 720, Ratio::new(30, 1)),
            MediaType::new(FourCc::NV12, 1280, 720, Ratio::new(30, 1)),
        ]);
        let requirement = Requirement::new(1280, 720, 30.0);
        let chosen = negotiate(&mut source, &presenter, &requirement).unwrap();
        assert_eq!(chosen.subtype, FourCc::YUY2);
        assert_eq!(source.current_type(), Some(chosen));
        assert_eq!(presenter.video_format().unwrap().geometry.width, 1280);
    }

    #[test]
    fn unsupported_native_subtype_falls_back_to_alternate() {
        let presenter = presenter();
        let mut source = TestPatternSource::new(vec![MediaType::new(
            FourCc::MJPG,
            640,
            480,
            Ratio::new(30, 1),
        )])
        .with_decodable(vec![FourCc::NV12]);

        let requirement = Requirement::new(640, 480, 30.0);
        let chosen = negotiate(&mut source, &presenter, &requirement).unwrap();
        assert_eq!(chosen.subtype, FourCc::NV12);
        assert_eq!(chosen.default_stride, None);
        assert_eq!(source.current_type().map(|m| m.subtype), Some(FourCc::NV12));
    }

    #[test]
    fn presenter_rejection_moves_on_to_next_match() {
        let presenter = presenter();
        let mut bad_stride = MediaType::new(FourCc::NV12, 640, 480, Ratio::new(30, 1));
        bad_stride.default_stride = Some(100);
        let mut source = TestPatternSource::new(vec![
            bad_stride,
            MediaType::new(FourCc::YUY2, 640, 480, Ratio::new(30, 1)),
        ]);

        let requirement = Requirement::new(640, 480, 30.0);
        let chosen = negotiate(&mut source, &presenter, &requirement).unwrap();
        assert_eq!(chosen.subtype, FourCc::YUY2);
        assert_eq!(source.current_type(), Some(chosen));
        assert_eq!(
            presenter.video_format().map(|video| video.geometry.default_stride),
            Some(1280)
        );
    }

    #[test]
    fn only_rejected_matches_report_the_rejection() {
        let presenter = presenter();
        let mut bad_stride = MediaType::new(FourCc::NV12, 640, 480, Ratio::new(30, 1));
        bad_stride.default_stride = Some(100);
        let mut source = TestPatternSource::new(vec![bad_stride]);
        assert!(matches!(
            negotiate(&mut source, &presenter, &Requirement::new(640, 480, 30.0)),
            Err(PresentError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn nothing_matching_fails() {
        let presenter = presenter();
        let mut source = TestPatternSource::new(vec![MediaType::new(
            FourCc::MJPG,
            640,
            480,
            Ratio::new(30, 1),
        )]);
        assert_eq!(
            negotiate(&mut source, &presenter, &Requirement::new(640, 480, 30.0)),
            Err(PresentError::NegotiationFailed)
        );
        assert_eq!(
            negotiate(&mut source, &presenter, &Requirement::new(320, 240, 30.0)),
            Err(PresentError::NegotiationFailed)
        );
        assert_eq!(source.current_type(), None);
    }

    #[test]
    fn presenter_without_device_is_reported() {
        let presenter = Presenter::new(HeadlessBackend::new(), PresenterOptions::default());
        let mut source = TestPatternSource::new(vec![MediaType::new(
            FourCc::NV12,
            640,
            480,
            Ratio::new(30, 1),
        )]);
        assert_eq!(
            negotiate(&mut source, &presenter, &Requirement::new(640, 480, 30.0)),
            Err(PresentError::NotInitialized)
        );
    }
}
