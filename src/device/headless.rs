// src/device/headless.rs
//! Headless software backend.
//!
//! Surfaces are plain byte vectors. Presenting copies the primary back buffer
//! into `PresentedFrame`, which a `HeadlessControl` handle can inspect. The
//! same handle scripts faults (lost devices, failed resets, failed locks) so
//! recovery paths can be driven deterministically.

use super::backend::{
    DeviceStatus, DisplayMode, GraphicsBackend, GraphicsContext, PresentParams, RenderDevice,
    SurfaceFormat, SwapChain, SwapChainDesc, SwapChainFlags, TextureFilter, VideoWindow,
};
use crate::convert::{Rgb, OUTPUT_BYTES_PER_PIXEL};
use crate::error::{PresentError, Result};
use crate::geometry::Rect;
use log::{debug, info, trace};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Row alignment of swap-chain back buffers, in bytes.
const SWAP_CHAIN_PITCH_ALIGN: usize = 64;

const DISPLAY_WIDTH: u32 = 1920;
const DISPLAY_HEIGHT: u32 = 1080;
const DISPLAY_REFRESH: u32 = 60;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// --- Window ---

/// A window whose client area can be resized from any thread.
#[derive(Debug, Clone)]
pub struct HeadlessWindow {
    size: Arc<Mutex<(u32, u32)>>,
}

impl HeadlessWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Arc::new(Mutex::new((width, height))),
        }
    }

    pub fn resize(&self, width: u32, height: u32) {
        debug!("HeadlessWindow: resize to {}x{}", width, height);
        *guard(&self.size) = (width, height);
    }

    pub fn size(&self) -> (u32, u32) {
        *guard(&self.size)
    }
}

impl VideoWindow for HeadlessWindow {
    fn client_rect(&self) -> Rect {
        let (width, height) = self.size();
        Rect::from_size(width as i32, height as i32)
    }
}

// --- Surfaces ---

#[derive(Debug, Clone, PartialEq, Eq)]
struct Surface {
    width: u32,
    height: u32,
    pitch: usize,
    data: Vec<u8>,
}

impl Surface {
    fn new(width: u32, height: u32, align: usize) -> Self {
        let row = width as usize * OUTPUT_BYTES_PER_PIXEL;
        let pitch = row.div_ceil(align.max(1)) * align.max(1);
        Self {
            width,
            height,
            pitch,
            data: vec![0; pitch * height as usize],
        }
    }

    fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        let at = y * self.pitch + x * OUTPUT_BYTES_PER_PIXEL;
        [
            self.data[at],
            self.data[at + 1],
            self.data[at + 2],
            self.data[at + 3],
        ]
    }

    fn set_pixel(&mut self, x: usize, y: usize, value: [u8; 4]) {
        let at = y * self.pitch + x * OUTPUT_BYTES_PER_PIXEL;
        self.data[at..at + OUTPUT_BYTES_PER_PIXEL].copy_from_slice(&value);
    }

    fn fill(&mut self, value: [u8; 4]) {
        if self.pitch == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(self.pitch) {
            for px in row.chunks_exact_mut(OUTPUT_BYTES_PER_PIXEL) {
                px.copy_from_slice(&value);
            }
        }
    }
}

/// A copy of the primary surface taken at present time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed B,G,R,X rows.
    pub pixels: Vec<u8>,
}

impl PresentedFrame {
    fn capture(surface: &Surface) -> Self {
        let row = surface.width as usize * OUTPUT_BYTES_PER_PIXEL;
        let mut pixels = Vec::with_capacity(row * surface.height as usize);
        if surface.pitch > 0 {
            for line in surface.data.chunks_exact(surface.pitch) {
                pixels.extend_from_slice(&line[..row]);
            }
        }
        Self {
            width: surface.width,
            height: surface.height,
            pixels,
        }
    }

    /// Color at (`x`, `y`), ignoring the X channel.
    pub fn rgb(&self, x: u32, y: u32) -> Rgb {
        let at = (y as usize * self.width as usize + x as usize) * OUTPUT_BYTES_PER_PIXEL;
        Rgb::new(self.pixels[at + 2], self.pixels[at + 1], self.pixels[at])
    }
}

/// Source coordinate for destination pixel `d`, in 8.8 fixed point, sampled
/// at pixel centers and clamped to the source.
fn source_coord(d: i64, dst_len: i64, src_len: i64) -> i64 {
    let fp = ((2 * d + 1) * src_len * 256) / (2 * dst_len) - 128;
    fp.clamp(0, (src_len - 1) * 256)
}

fn lerp(a: u8, b: u8, weight: i64) -> i64 {
    a as i64 * (256 - weight) + b as i64 * weight
}

fn sample_linear(src: &Surface, fx: i64, fy: i64) -> [u8; 4] {
    let x0 = (fx >> 8) as usize;
    let y0 = (fy >> 8) as usize;
    let x1 = (x0 + 1).min(src.width as usize - 1);
    let y1 = (y0 + 1).min(src.height as usize - 1);
    let (wx, wy) = (fx & 0xFF, fy & 0xFF);

    let (a, b) = (src.pixel(x0, y0), src.pixel(x1, y0));
    let (c, d) = (src.pixel(x0, y1), src.pixel(x1, y1));
    let mut out = [0u8; 4];
    for channel in 0..4 {
        let top = lerp(a[channel], b[channel], wx);
        let bottom = lerp(c[channel], d[channel], wx);
        let value = (top * (256 - wy) + bottom * wy + (1 << 15)) >> 16;
        out[channel] = value.clamp(0, 255) as u8;
    }
    out
}

fn stretch(src: &Surface, dst: &mut Surface, rect: Rect, filter: TextureFilter) {
    let (src_w, src_h) = (src.width as i64, src.height as i64);
    let (rect_w, rect_h) = (rect.width() as i64, rect.height() as i64);
    if src_w == 0 || src_h == 0 || rect_w <= 0 || rect_h <= 0 {
        return;
    }

    let x_range = rect.left.max(0)..rect.right.min(dst.width as i32);
    let y_range = rect.top.max(0)..rect.bottom.min(dst.height as i32);
    for dy in y_range {
        let fy = source_coord((dy - rect.top) as i64, rect_h, src_h);
        for dx in x_range.clone() {
            let fx = source_coord((dx - rect.left) as i64, rect_w, src_w);
            let value = match filter {
                TextureFilter::Point => {
                    src.pixel(((fx + 128) >> 8) as usize, ((fy + 128) >> 8) as usize)
                }
                TextureFilter::Linear => sample_linear(src, fx, fy),
            };
            dst.set_pixel(dx as usize, dy as usize, value);
        }
    }
}

// --- Shared fault script and statistics ---

/// Counters observed through `HeadlessControl::stats`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessStats {
    pub contexts_created: usize,
    pub devices_created: usize,
    pub swap_chains_created: usize,
    pub resets: usize,
    pub status_probes: usize,
    pub frames_presented: usize,
}

#[derive(Debug)]
struct Shared {
    display_format: SurfaceFormat,
    fail_contexts: bool,
    device_failures: u32,
    reset_failures: u32,
    swap_chain_failures: u32,
    lock_failures: u32,
    present_failures: u32,
    statuses: VecDeque<DeviceStatus>,
    stats: HeadlessStats,
    last_frame: Option<PresentedFrame>,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            display_format: SurfaceFormat::X8R8G8B8,
            fail_contexts: false,
            device_failures: 0,
            reset_failures: 0,
            swap_chain_failures: 0,
            lock_failures: 0,
            present_failures: 0,
            statuses: VecDeque::new(),
            stats: HeadlessStats::default(),
            last_frame: None,
        }
    }
}

/// Consumes one scripted failure; true if the call should fail.
fn take_failure(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

type SharedHandle = Arc<Mutex<Shared>>;

/// Test and diagnostics handle onto a `HeadlessBackend`.
#[derive(Debug, Clone)]
pub struct HeadlessControl {
    shared: SharedHandle,
}

impl HeadlessControl {
    pub fn set_display_format(&self, format: SurfaceFormat) {
        guard(&self.shared).display_format = format;
    }

    pub fn fail_context_creation(&self, fail: bool) {
        guard(&self.shared).fail_contexts = fail;
    }

    pub fn fail_next_device_creations(&self, count: u32) {
        guard(&self.shared).device_failures = count;
    }

    pub fn fail_next_resets(&self, count: u32) {
        guard(&self.shared).reset_failures = count;
    }

    pub fn fail_next_swap_chains(&self, count: u32) {
        guard(&self.shared).swap_chain_failures = count;
    }

    pub fn fail_next_back_buffer_locks(&self, count: u32) {
        guard(&self.shared).lock_failures = count;
    }

    /// The next `count` presents report a lost device.
    pub fn lose_next_presents(&self, count: u32) {
        guard(&self.shared).present_failures = count;
    }

    /// Queues results for upcoming cooperative-level probes; once drained
    /// probes report `Ok`.
    pub fn script_status(&self, statuses: impl IntoIterator<Item = DeviceStatus>) {
        guard(&self.shared).statuses.extend(statuses);
    }

    pub fn stats(&self) -> HeadlessStats {
        guard(&self.shared).stats
    }

    pub fn last_frame(&self) -> Option<PresentedFrame> {
        guard(&self.shared).last_frame.clone()
    }
}

// --- Backend ---

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    shared: SharedHandle,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn control(&self) -> HeadlessControl {
        HeadlessControl {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl GraphicsBackend for HeadlessBackend {
    type Context = HeadlessContext;

    fn create_context(&mut self) -> Result<HeadlessContext> {
        let mut shared = guard(&self.shared);
        if shared.fail_contexts {
            return Err(PresentError::Backend("graphics API unavailable".into()));
        }
        shared.stats.contexts_created += 1;
        trace!("HeadlessBackend: context created");
        Ok(HeadlessContext {
            shared: Arc::clone(&self.shared),
        })
    }
}

#[derive(Debug)]
pub struct HeadlessContext {
    shared: SharedHandle,
}

impl GraphicsContext for HeadlessContext {
    type Window = HeadlessWindow;
    type Device = HeadlessDevice;

    fn display_mode(&self) -> Result<DisplayMode> {
        Ok(DisplayMode {
            width: DISPLAY_WIDTH,
            height: DISPLAY_HEIGHT,
            refresh_rate: DISPLAY_REFRESH,
            format: guard(&self.shared).display_format,
        })
    }

    fn check_device_type(
        &self,
        display: SurfaceFormat,
        back_buffer: SurfaceFormat,
        windowed: bool,
    ) -> Result<()> {
        let supported = match (display, back_buffer) {
            (SurfaceFormat::Unknown, _) | (_, SurfaceFormat::Unknown) => false,
            // A windowed 32-bit back buffer cannot be presented over a 16-bit desktop.
            (SurfaceFormat::R5G6B5, _) => !windowed,
            (_, SurfaceFormat::X8R8G8B8 | SurfaceFormat::A8R8G8B8) => true,
            _ => false,
        };
        if supported {
            Ok(())
        } else {
            Err(PresentError::Backend(format!(
                "{:?} back buffer unsupported on {:?} display",
                back_buffer, display
            )))
        }
    }

    fn create_device(
        &mut self,
        window: &HeadlessWindow,
        params: &PresentParams,
    ) -> Result<HeadlessDevice> {
        let mut shared = guard(&self.shared);
        if take_failure(&mut shared.device_failures) {
            return Err(PresentError::DeviceCreation("no hardware device available".into()));
        }
        shared.stats.devices_created += 1;
        let (width, height) = window.size();
        info!(
            "HeadlessDevice: created for {}x{} window (windowed: {})",
            width, height, params.windowed
        );
        Ok(HeadlessDevice {
            shared: Arc::clone(&self.shared),
            window: window.clone(),
            primary: Surface::new(width, height, OUTPUT_BYTES_PER_PIXEL),
        })
    }
}

// --- Device ---

#[derive(Debug)]
pub struct HeadlessDevice {
    shared: SharedHandle,
    window: HeadlessWindow,
    primary: Surface,
}

impl HeadlessDevice {
    /// Windowed back buffers follow the client area.
    fn track_window(&mut self) {
        let (width, height) = self.window.size();
        if (width, height) != (self.primary.width, self.primary.height) {
            trace!("HeadlessDevice: primary surface now {}x{}", width, height);
            self.primary = Surface::new(width, height, OUTPUT_BYTES_PER_PIXEL);
        }
    }
}

impl RenderDevice for HeadlessDevice {
    type SwapChain = HeadlessSwapChain;

    fn test_cooperative_level(&self) -> DeviceStatus {
        let mut shared = guard(&self.shared);
        shared.stats.status_probes += 1;
        shared.statuses.pop_front().unwrap_or(DeviceStatus::Ok)
    }

    fn reset(&mut self, params: &PresentParams) -> Result<()> {
        {
            let mut shared = guard(&self.shared);
            shared.stats.resets += 1;
            if take_failure(&mut shared.reset_failures) {
                return Err(PresentError::DeviceLost);
            }
        }
        trace!("HeadlessDevice: reset (windowed: {})", params.windowed);
        self.track_window();
        Ok(())
    }

    fn create_swap_chain(&mut self, desc: &SwapChainDesc) -> Result<HeadlessSwapChain> {
        if !desc.flags.contains(SwapChainFlags::LOCKABLE_BACK_BUFFER) {
            return Err(PresentError::Backend("swap chain back buffer not lockable".into()));
        }
        if desc.format != SurfaceFormat::X8R8G8B8 {
            return Err(PresentError::Backend(format!(
                "unsupported swap chain format {:?}",
                desc.format
            )));
        }
        let mut shared = guard(&self.shared);
        if take_failure(&mut shared.swap_chain_failures) {
            return Err(PresentError::Backend("out of video memory".into()));
        }
        shared.stats.swap_chains_created += 1;
        debug!(
            "HeadlessDevice: swap chain {}x{} with {} back buffers",
            desc.width, desc.height, desc.back_buffer_count
        );
        Ok(HeadlessSwapChain {
            shared: Arc::clone(&self.shared),
            surface: Surface::new(desc.width, desc.height, SWAP_CHAIN_PITCH_ALIGN),
            locked: false,
        })
    }

    fn color_fill(&mut self, color: Rgb) -> Result<()> {
        self.track_window();
        self.primary.fill([color.blue, color.green, color.red, 0xFF]);
        Ok(())
    }

    fn stretch_rect(
        &mut self,
        src: &HeadlessSwapChain,
        dst: Rect,
        filter: TextureFilter,
    ) -> Result<()> {
        if src.locked {
            return Err(PresentError::Backend("stretch from a locked surface".into()));
        }
        stretch(&src.surface, &mut self.primary, dst, filter);
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let mut shared = guard(&self.shared);
        if take_failure(&mut shared.present_failures) {
            return Err(PresentError::DeviceLost);
        }
        shared.stats.frames_presented += 1;
        shared.last_frame = Some(PresentedFrame::capture(&self.primary));
        Ok(())
    }
}

// --- Swap chain ---

#[derive(Debug)]
pub struct HeadlessSwapChain {
    shared: SharedHandle,
    surface: Surface,
    locked: bool,
}

impl SwapChain for HeadlessSwapChain {
    fn width(&self) -> u32 {
        self.surface.width
    }

    fn height(&self) -> u32 {
        self.surface.height
    }

    fn lock_back_buffer(&mut self) -> Result<usize> {
        if self.locked || take_failure(&mut guard(&self.shared).lock_failures) {
            return Err(PresentError::LockFailure("back buffer"));
        }
        self.locked = true;
        Ok(self.surface.pitch)
    }

    fn back_buffer_bits(&mut self) -> &mut [u8] {
        &mut self.surface.data
    }

    fn unlock_back_buffer(&mut self) -> Result<()> {
        if !self.locked {
            return Err(PresentError::Backend("back buffer is not locked".into()));
        }
        self.locked = false;
        Ok(())
    }
}
