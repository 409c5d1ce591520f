// src/device/backend.rs
//! Backend trait family - the minimal primitives a presentation API must offer.
//!
//! The shape follows a classic immediate-mode GPU API:
//! - `GraphicsBackend` creates a `GraphicsContext` (the API entry object).
//! - The context reports the display mode, validates formats and creates a
//!   `RenderDevice` bound to a window.
//! - The device creates `SwapChain`s sized to the video, fills and stretches
//!   into its own primary back buffer, and presents.
//!
//! All lifetimes are owned Rust values: dropping a swap chain, device or
//! context releases it. Back-buffer access goes through `SurfaceLock`, which
//! unlocks on drop.

use crate::convert::Rgb;
use crate::error::Result;
use crate::geometry::Rect;
use bitflags::bitflags;
use log::warn;

/// Surface formats relevant to windowed video presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceFormat {
    Unknown,
    X8R8G8B8,
    A8R8G8B8,
    R5G6B5,
}

/// The adapter's current display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub refresh_rate: u32,
    pub format: SurfaceFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapEffect {
    Copy,
    Flip,
}

/// Parameters for the device's own (primary) presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentParams {
    pub back_buffer_format: SurfaceFormat,
    pub swap_effect: SwapEffect,
    pub windowed: bool,
    /// Present without waiting for vertical retrace.
    pub immediate: bool,
}

impl PresentParams {
    /// Windowed X8R8G8B8 with copy semantics; the back buffer tracks the
    /// window's client area.
    pub fn windowed() -> Self {
        Self {
            back_buffer_format: SurfaceFormat::X8R8G8B8,
            swap_effect: SwapEffect::Copy,
            windowed: true,
            immediate: true,
        }
    }
}

bitflags! {
    /// Creation flags for the video swap chain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SwapChainFlags: u32 {
        /// Content is video; lets the driver pick video-friendly paths.
        const VIDEO = 0x0000_0010;
        /// Clip presentation to the window region.
        const DEVICE_CLIP = 0x0000_0004;
        /// The back buffer must be CPU-lockable.
        const LOCKABLE_BACK_BUFFER = 0x0000_0001;
    }
}

/// Description of a swap chain sized to the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub format: SurfaceFormat,
    pub back_buffer_count: u32,
    pub swap_effect: SwapEffect,
    pub flags: SwapChainFlags,
    pub immediate: bool,
}

/// Result of a cooperative-level probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Ok,
    /// Lost and not yet resettable; a reset attempt may still recreate it.
    Lost,
    /// Lost and ready to be reset.
    NotReset,
    /// Unrecoverable driver failure.
    DriverInternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureFilter {
    Point,
    #[default]
    Linear,
}

/// The target window, as far as presentation is concerned.
pub trait VideoWindow: Clone + Send {
    fn client_rect(&self) -> Rect;
}

pub trait GraphicsBackend: Send {
    type Context: GraphicsContext;

    /// Creates the API entry object.
    fn create_context(&mut self) -> Result<Self::Context>;
}

pub trait GraphicsContext: Send {
    type Window: VideoWindow;
    type Device: RenderDevice;

    fn display_mode(&self) -> Result<DisplayMode>;

    /// Fails unless `back_buffer` can be presented over `display` in the
    /// requested windowing mode.
    fn check_device_type(
        &self,
        display: SurfaceFormat,
        back_buffer: SurfaceFormat,
        windowed: bool,
    ) -> Result<()>;

    fn create_device(&mut self, window: &Self::Window, params: &PresentParams)
        -> Result<Self::Device>;
}

pub trait RenderDevice: Send {
    type SwapChain: SwapChain;

    fn test_cooperative_level(&self) -> DeviceStatus;

    /// Reconfigures the device in place. Swap chains must be released first.
    fn reset(&mut self, params: &PresentParams) -> Result<()>;

    fn create_swap_chain(&mut self, desc: &SwapChainDesc) -> Result<Self::SwapChain>;

    /// Fills the whole primary back buffer.
    fn color_fill(&mut self, color: Rgb) -> Result<()>;

    /// Scales the swap chain's back buffer into `dst` on the primary back buffer.
    fn stretch_rect(&mut self, src: &Self::SwapChain, dst: Rect, filter: TextureFilter)
        -> Result<()>;

    fn present(&mut self) -> Result<()>;
}

pub trait SwapChain: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Locks the back buffer for CPU writes and returns its pitch in bytes.
    fn lock_back_buffer(&mut self) -> Result<usize>;

    /// Back-buffer bytes; only valid while locked.
    fn back_buffer_bits(&mut self) -> &mut [u8];

    fn unlock_back_buffer(&mut self) -> Result<()>;
}

/// Scoped lock over a swap chain's back buffer.
pub struct SurfaceLock<'a, S: SwapChain> {
    chain: &'a mut S,
    pitch: usize,
    released: bool,
}

impl<'a, S: SwapChain> SurfaceLock<'a, S> {
    pub fn acquire(chain: &'a mut S) -> Result<Self> {
        let pitch = chain.lock_back_buffer()?;
        Ok(Self {
            chain,
            pitch,
            released: false,
        })
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn bits(&mut self) -> &mut [u8] {
        self.chain.back_buffer_bits()
    }

    /// Unlocks now and reports whether the unlock itself succeeded.
    pub fn unlock(mut self) -> Result<()> {
        self.released = true;
        self.chain.unlock_back_buffer()
    }
}

impl<S: SwapChain> Drop for SurfaceLock<'_, S> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.chain.unlock_back_buffer() {
                warn!("SurfaceLock: unlock on drop failed: {}", e);
            }
        }
    }
}
