// src/source.rs
//! Synthetic capture source producing test patterns in any supported format.

use crate::convert::ycbcr_to_rgb;
use crate::error::{PresentError, Result};
use crate::format::{FourCc, FrameGeometry, MediaType, PixelFormat};
use crate::lock::{LinearBuffer, MediaBuffer};
use crate::negotiate::CaptureSource;
use log::{debug, trace};

/// 75% color bars as (Y, Cb, Cr), left to right.
const BARS: [(u8, u8, u8); 8] = [
    (180, 128, 128), // white
    (162, 44, 142),  // yellow
    (131, 156, 44),  // cyan
    (112, 72, 58),   // green
    (84, 184, 198),  // magenta
    (65, 100, 212),  // red
    (35, 212, 114),  // blue
    (16, 128, 128),  // black
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pattern {
    Uniform {
        y: u8,
        cb: u8,
        cr: u8,
    },
    #[default]
    Bars,
}

impl Pattern {
    /// Mid gray in every format.
    pub const GRAY: Pattern = Pattern::Uniform {
        y: 128,
        cb: 128,
        cr: 128,
    };

    fn sample(self, x: u32, width: u32) -> (u8, u8, u8) {
        match self {
            Pattern::Uniform { y, cb, cr } => (y, cb, cr),
            Pattern::Bars => BARS[(x as usize * BARS.len()) / width.max(1) as usize],
        }
    }
}

/// Renders one frame of `pattern` laid out per `geometry`.
///
/// A negative stride stores packed formats bottom-up. NV12 planes are always
/// stored top-down, with the chroma plane after the luma rows.
pub fn render_frame(format: PixelFormat, geometry: &FrameGeometry, pattern: Pattern) -> Vec<u8> {
    let stride = geometry.default_stride.unsigned_abs() as usize;
    let (width, height) = (geometry.width, geometry.height);
    let rows = format.rows_per_frame(height);
    let bottom_up = geometry.default_stride < 0 && format != PixelFormat::Nv12;
    let mut frame = vec![0u8; stride * rows];

    let row_start = |y: u32| {
        let physical = if bottom_up { height - 1 - y } else { y };
        physical as usize * stride
    };

    for y in 0..height {
        let row = &mut frame[row_start(y)..row_start(y) + stride];
        match format {
            PixelFormat::Rgb32 | PixelFormat::Rgb24 => {
                let bpp = if format == PixelFormat::Rgb32 { 4 } else { 3 };
                for x in 0..width {
                    let (luma, cb, cr) = pattern.sample(x, width);
                    let rgb = ycbcr_to_rgb(luma, cb, cr);
                    let at = x as usize * bpp;
                    row[at..at + 3].copy_from_slice(&[rgb.blue, rgb.green, rgb.red]);
                    if bpp == 4 {
                        row[at + 3] = 0xFF;
                    }
                }
            }
            PixelFormat::Yuy2 => {
                for pair in 0..width / 2 {
                    let (y0, cb, cr) = pattern.sample(pair * 2, width);
                    let (y1, _, _) = pattern.sample(pair * 2 + 1, width);
                    let at = pair as usize * 4;
                    row[at..at + 4].copy_from_slice(&[y0, cb, y1, cr]);
                }
            }
            PixelFormat::Nv12 => {
                for x in 0..width {
                    row[x as usize] = pattern.sample(x, width).0;
                }
            }
        }
    }

    if format == PixelFormat::Nv12 {
        let chroma = height as usize * stride;
        for cy in 0..(height / 2) as usize {
            let row = &mut frame[chroma + cy * stride..chroma + (cy + 1) * stride];
            for bx in 0..width / 2 {
                let (_, cb, cr) = pattern.sample(bx * 2, width);
                let at = bx as usize * 2;
                row[at] = cb;
                row[at + 1] = cr;
            }
        }
    }
    frame
}

/// A capture source that renders frames on demand.
///
/// Besides its native types it accepts any subtype listed as decodable, at
/// a native resolution and frame rate.
#[derive(Debug, Clone, Default)]
pub struct TestPatternSource {
    native: Vec<MediaType>,
    decodable: Vec<FourCc>,
    current: Option<MediaType>,
    pattern: Pattern,
    frames: u64,
}

impl TestPatternSource {
    pub fn new(native: Vec<MediaType>) -> Self {
        Self {
            native,
            ..Self::default()
        }
    }

    pub fn with_decodable(mut self, subtypes: Vec<FourCc>) -> Self {
        self.decodable = subtypes;
        self
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn set_pattern(&mut self, pattern: Pattern) {
        self.pattern = pattern;
    }

    pub fn frames_produced(&self) -> u64 {
        self.frames
    }

    fn accepts(&self, media: &MediaType) -> bool {
        self.native.iter().any(|native| {
            native.width == media.width
                && native.height == media.height
                && native.frame_rate == media.frame_rate
                && (native.subtype == media.subtype || self.decodable.contains(&media.subtype))
        })
    }
}

impl CaptureSource for TestPatternSource {
    fn native_types(&self) -> Vec<MediaType> {
        self.native.clone()
    }

    fn set_current_type(&mut self, media: &MediaType) -> Result<()> {
        if !self.accepts(media) {
            return Err(PresentError::UnsupportedFormat(media.subtype));
        }
        debug!(
            "TestPatternSource: output {} {}x{}",
            media.subtype, media.width, media.height
        );
        self.current = Some(media.clone());
        Ok(())
    }

    fn current_type(&self) -> Option<MediaType> {
        self.current.clone()
    }

    fn read_sample(&mut self) -> Result<Option<Box<dyn MediaBuffer + Send>>> {
        let media = self.current.as_ref().ok_or(PresentError::NotInitialized)?;
        let format = PixelFormat::from_subtype(media.subtype)
            .ok_or(PresentError::UnsupportedFormat(media.subtype))?;
        let geometry = media.frame_geometry()?;
        let frame = render_frame(format, &geometry, self.pattern);
        self.frames += 1;
        trace!("TestPatternSource: frame {} ({} bytes)", self.frames, frame.len());
        Ok(Some(Box::new(LinearBuffer::new(frame))))
    }
}
