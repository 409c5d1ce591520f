// src/device/presenter.rs
//! Presenter - owns the device, the video swap chain and the current format.
//!
//! Every public operation takes the instance mutex for its whole duration,
//! so a resize notification arriving on the window thread cannot interleave
//! with a frame being drawn on the capture thread.

use super::backend::{
    DeviceStatus, GraphicsBackend, GraphicsContext, PresentParams, RenderDevice, SurfaceFormat,
    SurfaceLock, SwapChainDesc, SwapChainFlags, SwapEffect, TextureFilter, VideoWindow,
};
use super::state::{DeviceEvent, DeviceState};
use crate::config::DisplayConfig;
use crate::convert::{self, Converter, Rgb};
use crate::error::{PresentError, Result};
use crate::format::{FourCc, FrameGeometry, MediaType};
use crate::geometry::{self, Rect};
use crate::lock::{BufferLock, MediaBuffer};
use log::{debug, error, info, trace, warn};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};

type ContextOf<B> = <B as GraphicsBackend>::Context;
type DeviceOf<B> = <ContextOf<B> as GraphicsContext>::Device;
type ChainOf<B> = <DeviceOf<B> as RenderDevice>::SwapChain;

/// Window type a presenter over backend `B` draws into.
pub type WindowOf<B> = <ContextOf<B> as GraphicsContext>::Window;

/// Presentation settings that do not change over the presenter's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenterOptions {
    /// Fill color for the letterbox margins.
    pub background: Rgb,
    pub back_buffer_count: u32,
}

impl Default for PresenterOptions {
    fn default() -> Self {
        Self {
            background: Rgb::new(0, 0, 0x80),
            back_buffer_count: 2,
        }
    }
}

impl From<&DisplayConfig> for PresenterOptions {
    fn from(config: &DisplayConfig) -> Self {
        let [red, green, blue] = config.background;
        Self {
            background: Rgb::new(red, green, blue),
            back_buffer_count: config.back_buffer_count.max(1),
        }
    }
}

/// One-shot notifications for the owning application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceNotice {
    /// A reset was exhausted; the device stays failed until re-created.
    Failed,
    /// A failed device was re-created.
    Recovered,
}

/// The negotiated source format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub converter: Converter,
    pub geometry: FrameGeometry,
}

/// Draws converted video frames, letterboxed, into a window.
pub struct Presenter<B: GraphicsBackend> {
    inner: Mutex<Inner<B>>,
}

// Field order is drop order: swap chain, device, then context.
struct Inner<B: GraphicsBackend> {
    swap_chain: Option<ChainOf<B>>,
    device: Option<DeviceOf<B>>,
    context: Option<ContextOf<B>>,
    backend: B,
    window: Option<WindowOf<B>>,
    params: PresentParams,
    state: DeviceState,
    video: Option<VideoFormat>,
    dest_rect: Rect,
    options: PresenterOptions,
    listeners: Vec<Sender<DeviceNotice>>,
    failure_reported: bool,
}

impl<B: GraphicsBackend> Presenter<B> {
    pub fn new(backend: B, options: PresenterOptions) -> Self {
        Self {
            inner: Mutex::new(Inner {
                swap_chain: None,
                device: None,
                context: None,
                backend,
                window: None,
                params: PresentParams::windowed(),
                state: DeviceState::Uninitialized,
                video: None,
                dest_rect: Rect::default(),
                options,
                listeners: Vec::new(),
                failure_reported: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<B>> {
        // A panic mid-operation leaves the state machine consistent enough to
        // tear down, so poisoning is ignored.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the device for `window`. Succeeds immediately if already ready.
    pub fn create_device(&self, window: WindowOf<B>) -> Result<()> {
        self.lock().create_device(window)
    }

    /// Selects the converter for `subtype`, (re)creates the swap chain at the
    /// source size and recomputes the destination rectangle.
    pub fn set_video_type(&self, subtype: FourCc, geometry: FrameGeometry) -> Result<()> {
        self.lock().set_video_type(subtype, geometry)
    }

    /// `set_video_type` for a capture media type, deriving defaults.
    pub fn set_media_type(&self, media: &MediaType) -> Result<()> {
        let geometry = media.frame_geometry()?;
        self.set_video_type(media.subtype, geometry)
    }

    /// Converts and presents one frame.
    ///
    /// Returns `Ok(())` without drawing until a device and swap chain exist.
    /// Per-frame failures drop the frame and leave the device ready.
    pub fn draw_frame(&self, buffer: &mut dyn MediaBuffer) -> Result<()> {
        self.lock().draw_frame(buffer)
    }

    /// Recomputes the destination rectangle from the window's client area.
    /// No GPU resources are touched.
    pub fn reset_video_size(&self) {
        self.lock().update_destination_rect();
    }

    /// Probes the device and resets it if it was lost.
    pub fn check_device_health(&self) -> Result<()> {
        self.lock().check_device_health()
    }

    /// Forces a reset: in place if possible, otherwise by re-creating the device.
    pub fn reset_device(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            DeviceState::Uninitialized => Err(PresentError::NotInitialized),
            DeviceState::Failed => Err(PresentError::DeviceFailed),
            DeviceState::Ready | DeviceState::Lost => inner.reset(),
        }
    }

    /// Releases the swap chain, device and context, in that order.
    pub fn destroy_device(&self) {
        self.lock().destroy_device();
    }

    pub fn is_format_supported(&self, subtype: FourCc) -> bool {
        convert::is_supported(subtype)
    }

    pub fn supported_formats(&self) -> Vec<FourCc> {
        convert::supported_formats()
    }

    pub fn state(&self) -> DeviceState {
        self.lock().state
    }

    pub fn destination_rect(&self) -> Rect {
        self.lock().dest_rect
    }

    pub fn video_format(&self) -> Option<VideoFormat> {
        self.lock().video
    }

    /// Registers for device notices.
    pub fn subscribe(&self) -> Receiver<DeviceNotice> {
        let (tx, rx) = mpsc::channel();
        self.lock().listeners.push(tx);
        rx
    }
}

impl<B: GraphicsBackend> Drop for Presenter<B> {
    fn drop(&mut self) {
        self.lock().release_resources();
    }
}

fn creation_error(e: PresentError) -> PresentError {
    match e {
        PresentError::DeviceCreation(_) => e,
        other => PresentError::DeviceCreation(other.to_string()),
    }
}

impl<B: GraphicsBackend> Inner<B> {
    fn apply(&mut self, event: DeviceEvent) {
        match self.state.transition(event) {
            Ok(next) => {
                if next != self.state {
                    debug!("Presenter: {:?} -> {:?} on {:?}", self.state, next, event);
                }
                self.state = next;
            }
            Err(e) => warn!("Presenter: {}", e),
        }
    }

    fn notify(&mut self, notice: DeviceNotice) {
        self.listeners.retain(|tx| tx.send(notice).is_ok());
    }

    fn report_failure(&mut self) {
        if !self.failure_reported {
            self.failure_reported = true;
            self.notify(DeviceNotice::Failed);
        }
    }

    fn release_resources(&mut self) {
        self.swap_chain = None;
        self.device = None;
        self.context = None;
    }

    fn create_device(&mut self, window: WindowOf<B>) -> Result<()> {
        if self.state.is_ready() && self.device.is_some() {
            trace!("Presenter: device already created");
            return Ok(());
        }

        self.release_resources();
        self.window = Some(window.clone());

        if let Err(e) = self.create_resources(&window) {
            self.release_resources();
            self.apply(DeviceEvent::CreateFailed);
            warn!("Presenter: device creation failed: {}", e);
            return Err(e);
        }

        self.apply(DeviceEvent::Created);
        info!("Presenter: device created");
        if self.failure_reported {
            self.failure_reported = false;
            self.notify(DeviceNotice::Recovered);
        }

        // A re-init after failure restores the video resources as well.
        if let Err(e) = self.restore_video_resources() {
            warn!("Presenter: could not restore video swap chain: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Context, display checks and device. Leaves nothing behind on failure.
    fn create_resources(&mut self, window: &WindowOf<B>) -> Result<()> {
        let mut context = match self.context.take() {
            Some(context) => context,
            None => self.backend.create_context().map_err(creation_error)?,
        };

        let mode = context.display_mode().map_err(creation_error)?;
        let params = PresentParams::windowed();
        context
            .check_device_type(mode.format, params.back_buffer_format, params.windowed)
            .map_err(creation_error)?;
        debug!(
            "Presenter: display {}x{} @{}Hz {:?}",
            mode.width, mode.height, mode.refresh_rate, mode.format
        );

        let device = context
            .create_device(window, &params)
            .map_err(creation_error)?;

        self.context = Some(context);
        self.device = Some(device);
        self.params = params;
        Ok(())
    }

    fn swap_chain_desc(&self, geometry: &FrameGeometry) -> SwapChainDesc {
        SwapChainDesc {
            width: geometry.width,
            height: geometry.height,
            format: SurfaceFormat::X8R8G8B8,
            back_buffer_count: self.options.back_buffer_count,
            swap_effect: SwapEffect::Flip,
            flags: SwapChainFlags::VIDEO
                | SwapChainFlags::DEVICE_CLIP
                | SwapChainFlags::LOCKABLE_BACK_BUFFER,
            immediate: true,
        }
    }

    fn set_video_type(&mut self, subtype: FourCc, geometry: FrameGeometry) -> Result<()> {
        let converter = convert::lookup(subtype)?;
        geometry.validate(converter.format())?;
        info!("Presenter: Video format: {}", converter.name());
        info!(
            "Presenter: resolution {}x{} stride {}",
            geometry.width, geometry.height, geometry.default_stride
        );

        let desc = self.swap_chain_desc(&geometry);
        let device = self.device.as_mut().ok_or(PresentError::NotInitialized)?;
        self.swap_chain = None;
        let chain = device.create_swap_chain(&desc)?;
        self.swap_chain = Some(chain);

        self.video = Some(VideoFormat {
            converter,
            geometry,
        });
        self.update_destination_rect();
        Ok(())
    }

    fn restore_video_resources(&mut self) -> Result<()> {
        let Some(video) = self.video else {
            return Ok(());
        };
        let desc = self.swap_chain_desc(&video.geometry);
        let device = self.device.as_mut().ok_or(PresentError::NotInitialized)?;
        self.swap_chain = None;
        self.swap_chain = Some(device.create_swap_chain(&desc)?);
        self.update_destination_rect();
        Ok(())
    }

    fn update_destination_rect(&mut self) {
        let (Some(video), Some(window)) = (&self.video, &self.window) else {
            return;
        };
        let source = Rect::from_size(video.geometry.width as i32, video.geometry.height as i32);
        let source = geometry::correct_aspect_ratio(source, video.geometry.pixel_aspect);
        self.dest_rect = geometry::letterbox(source, window.client_rect());
        debug!("Presenter: destination rect {:?}", self.dest_rect);
    }

    fn check_device_health(&mut self) -> Result<()> {
        if self.state == DeviceState::Failed {
            return Err(PresentError::DeviceFailed);
        }
        let status = match &self.device {
            Some(device) => device.test_cooperative_level(),
            None => return Err(PresentError::NotInitialized),
        };

        match status {
            DeviceStatus::Ok if self.state.is_ready() => Ok(()),
            DeviceStatus::Ok => self.reset(),
            DeviceStatus::Lost | DeviceStatus::NotReset => {
                warn!("Presenter: device reports {:?}", status);
                self.apply(DeviceEvent::LossDetected);
                self.reset()
            }
            DeviceStatus::DriverInternalError => {
                error!("Presenter: unrecoverable driver error");
                self.apply(DeviceEvent::Faulted);
                self.report_failure();
                Err(PresentError::DeviceFailed)
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        warn!("Presenter: resetting device");
        let Some(window) = self.window.clone() else {
            return Err(PresentError::NotInitialized);
        };

        // Swap chains must go before the device can be reset.
        self.swap_chain = None;

        let params = self.params;
        if let Some(device) = self.device.as_mut() {
            if let Err(e) = device.reset(&params) {
                warn!("Presenter: in-place reset failed ({}), re-creating device", e);
                self.device = None;
                self.context = None;
            }
        }

        if self.device.is_none() {
            if let Err(e) = self.create_resources(&window) {
                return Err(self.fail_reset(e));
            }
        }
        if let Err(e) = self.restore_video_resources() {
            return Err(self.fail_reset(e));
        }

        self.apply(DeviceEvent::ResetSucceeded);
        info!("Presenter: device reset complete");
        Ok(())
    }

    fn fail_reset(&mut self, cause: PresentError) -> PresentError {
        error!("Presenter: device reset failed: {}", cause);
        self.release_resources();
        self.apply(DeviceEvent::ResetFailed);
        self.report_failure();
        PresentError::DeviceFailed
    }

    fn destroy_device(&mut self) {
        self.release_resources();
        self.apply(DeviceEvent::Destroyed);
        info!("Presenter: device destroyed");
    }

    fn draw_frame(&mut self, buffer: &mut dyn MediaBuffer) -> Result<()> {
        match self.state {
            DeviceState::Failed => return Err(PresentError::DeviceFailed),
            DeviceState::Uninitialized => {
                trace!("Presenter: no device yet, nothing to draw");
                return Ok(());
            }
            DeviceState::Ready | DeviceState::Lost => {}
        }
        if self.swap_chain.is_none() && self.state.is_ready() {
            trace!("Presenter: no swap chain yet, nothing to draw");
            return Ok(());
        }

        self.check_device_health()?;

        let Some(video) = self.video else {
            return Ok(());
        };
        match self.render(buffer, video) {
            Ok(()) => Ok(()),
            Err(e) => {
                if matches!(e, PresentError::DeviceLost | PresentError::DeviceNeedsReset) {
                    self.apply(DeviceEvent::LossDetected);
                }
                debug!("Presenter: dropping frame: {}", e);
                Err(e)
            }
        }
    }

    fn render(&mut self, buffer: &mut dyn MediaBuffer, video: VideoFormat) -> Result<()> {
        let Inner {
            device: Some(device),
            swap_chain: Some(chain),
            dest_rect,
            options,
            ..
        } = self
        else {
            return Ok(());
        };
        let geometry = video.geometry;

        let mut source = BufferLock::new(buffer);
        let view = source.acquire(geometry.default_stride as isize, geometry.height)?;
        let mut target = SurfaceLock::acquire(&mut *chain)?;
        let pitch = target.pitch();
        video
            .converter
            .convert(target.bits(), pitch, &view, geometry.width, geometry.height)?;
        target.unlock()?;
        source.unlock();

        device.color_fill(options.background)?;
        device.stretch_rect(&*chain, *dest_rect, TextureFilter::Linear)?;
        device.present()?;
        trace!("Presenter: frame presented into {:?}", dest_rect);
        Ok(())
    }
}
