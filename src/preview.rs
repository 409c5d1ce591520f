// src/preview.rs
//! Capture preview session: one source, one presenter.
//!
//! Opening negotiates a media type and configures the presenter. Each sample
//! read from the source is drawn; per-frame failures are counted and
//! skipped, device-level failures are returned to the owner.

use crate::device::{GraphicsBackend, Presenter, WindowOf};
use crate::error::{PresentError, Result};
use crate::format::MediaType;
use crate::lock::MediaBuffer;
use crate::negotiate::{negotiate, CaptureSource, Requirement};
use log::{debug, info, warn};
use std::sync::Arc;

/// Frame counters for a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PreviewStats {
    pub frames_drawn: u64,
    pub frames_dropped: u64,
    /// Samples that arrived without a buffer.
    pub gaps: u64,
}

pub struct Preview<S: CaptureSource, B: GraphicsBackend> {
    presenter: Arc<Presenter<B>>,
    requirement: Requirement,
    source: Option<S>,
    symbolic_link: Option<String>,
    media_type: Option<MediaType>,
    stats: PreviewStats,
}

impl<S: CaptureSource, B: GraphicsBackend> Preview<S, B> {
    pub fn new(presenter: Arc<Presenter<B>>, requirement: Requirement) -> Self {
        Self {
            presenter,
            requirement,
            source: None,
            symbolic_link: None,
            media_type: None,
            stats: PreviewStats::default(),
        }
    }

    /// Shared handle for threads that only need to resize or query state.
    pub fn presenter(&self) -> &Arc<Presenter<B>> {
        &self.presenter
    }

    /// Closes any open source, creates the device for `window` and
    /// negotiates a format with `source`.
    ///
    /// `symbolic_link` identifies the capture device for removal checks.
    pub fn open(
        &mut self,
        mut source: S,
        symbolic_link: impl Into<String>,
        window: WindowOf<B>,
    ) -> Result<MediaType> {
        self.close();
        let symbolic_link = symbolic_link.into();

        self.presenter.create_device(window)?;
        let media = negotiate(&mut source, &self.presenter, &self.requirement)?;
        info!(
            "Preview: opened {} as {} {}x{}",
            symbolic_link, media.subtype, media.width, media.height
        );

        self.source = Some(source);
        self.symbolic_link = Some(symbolic_link);
        self.media_type = Some(media.clone());
        self.stats = PreviewStats::default();
        Ok(media)
    }

    /// Draws one sample. `None` is a stream gap and draws nothing.
    pub fn on_sample(&mut self, sample: Option<&mut dyn MediaBuffer>) -> Result<()> {
        let Some(buffer) = sample else {
            self.stats.gaps += 1;
            return Ok(());
        };
        match self.presenter.draw_frame(buffer) {
            Ok(()) => {
                self.stats.frames_drawn += 1;
                Ok(())
            }
            Err(e)
                if e.is_per_frame()
                    || matches!(e, PresentError::DeviceLost | PresentError::DeviceNeedsReset) =>
            {
                self.stats.frames_dropped += 1;
                debug!("Preview: frame dropped: {}", e);
                Ok(())
            }
            Err(e) => {
                warn!("Preview: presentation failed: {}", e);
                Err(e)
            }
        }
    }

    /// Reads the next sample from the open source and draws it.
    pub fn pump(&mut self) -> Result<()> {
        let source = self.source.as_mut().ok_or(PresentError::NotInitialized)?;
        match source.read_sample()? {
            Some(mut sample) => {
                let buffer: &mut dyn MediaBuffer = &mut *sample;
                self.on_sample(Some(buffer))
            }
            None => self.on_sample(None),
        }
    }

    /// Call when the window's client area changes.
    pub fn resize(&self) {
        self.presenter.reset_video_size();
    }

    /// True if `removed_link` names the open capture device.
    ///
    /// Device-interface paths differ in case between notifications, so the
    /// comparison ignores ASCII case.
    pub fn is_device_lost(&self, removed_link: &str) -> bool {
        self.symbolic_link
            .as_deref()
            .is_some_and(|link| link.eq_ignore_ascii_case(removed_link))
    }

    /// Releases the source. The presenter keeps its device.
    pub fn close(&mut self) {
        if let Some(link) = self.symbolic_link.take() {
            info!("Preview: closing {}", link);
        }
        self.source = None;
        self.media_type = None;
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    pub fn media_type(&self) -> Option<&MediaType> {
        self.media_type.as_ref()
    }

    pub fn stats(&self) -> PreviewStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HeadlessBackend, HeadlessControl, HeadlessWindow, PresenterOptions};
    use crate::format::{FourCc, Ratio};
    use crate::lock::LinearBuffer;
    use crate::source::{Pattern, TestPatternSource};
    use test_log::test;

    const LINK: &str = r"\\?\usb#vid_046d&pid_0825#cam0#{e5323777-f976-4f5b-9b55-b94699c46e44}\global";

    fn session() -> (Preview<TestPatternSource, HeadlessBackend>, HeadlessControl) {
        let backend = HeadlessBackend::new();
        let control = backend.control();
        let presenter = Arc::new(Presenter::new(backend, PresenterOptions::default()));
        (
            Preview::new(presenter, Requirement::new(320, 240, 30.0)),
            control,
        )
    }

    fn camera() -> TestPatternSource {
        TestPatternSource::new(vec![
            MediaType::new(FourCc::MJPG, 320, 240, Ratio::new(30, 1)),
            MediaType::new(FourCc::YUY2, 320, 240, Ratio::new(30, 1)),
        ])
        .with_pattern(Pattern::GRAY)
    }

    #[test]
    fn open_negotiates_and_pumps_frames() {
        let (mut preview, control) = session();
        let media = preview
            .open(camera(), LINK, HeadlessWindow::new(640, 480))
            .unwrap();
        assert_eq!(media.subtype, FourCc::YUY2, "MJPG is replaced by an accepted alternate");
        assert!(preview.is_open());

        for _ in 0..3 {
            preview.pump().unwrap();
        }
        assert_eq!(preview.stats().frames_drawn, 3);
        assert_eq!(control.stats().frames_presented, 3);
    }

    #[test]
    fn gaps_and_dropped_frames_are_counted() {
        let (mut preview, control) = session();
        preview
            .open(camera(), LINK, HeadlessWindow::new(640, 480))
            .unwrap();

        preview.on_sample(None).unwrap();
        let mut bad = LinearBuffer::new(vec![0; 16]).fail_locks();
        preview.on_sample(Some(&mut bad)).unwrap();
        control.lose_next_presents(1);
        preview.pump().unwrap();

        let stats = preview.stats();
        assert_eq!(stats.gaps, 1);
        assert_eq!(stats.frames_dropped, 2);
        assert_eq!(stats.frames_drawn, 0);
    }

    #[test]
    fn device_failure_is_returned() {
        let (mut preview, control) = session();
        preview
            .open(camera(), LINK, HeadlessWindow::new(640, 480))
            .unwrap();
        control.script_status([crate::device::DeviceStatus::DriverInternalError]);
        assert_eq!(preview.pump(), Err(PresentError::DeviceFailed));
    }

    #[test]
    fn device_removal_matches_ignoring_case() {
        let (mut preview, _control) = session();
        assert!(!preview.is_device_lost(LINK));
        preview
            .open(camera(), LINK, HeadlessWindow::new(640, 480))
            .unwrap();
        assert!(preview.is_device_lost(&LINK.to_uppercase()));
        assert!(!preview.is_device_lost(r"\\?\usb#vid_0000&pid_0000#cam1"));

        preview.close();
        assert!(!preview.is_open());
        assert!(!preview.is_device_lost(LINK));
        assert_eq!(preview.pump(), Err(PresentError::NotInitialized));
    }
}
