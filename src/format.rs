// src/format.rs

//! Pixel formats, frame geometry and the media-type description handed over
//! by the capture side.
//!
//! A `FourCc` is the raw subtype tag reported by a capture source. Only four
//! of them map onto a `PixelFormat` this crate can convert; everything else
//! is carried around as an opaque tag so negotiation can reject it.

use crate::error::{PresentError, Result};
use std::fmt;

/// Four-character-code subtype tag, stored little-endian like the native API.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub u32);

impl FourCc {
    /// Packed 24-bit RGB. The native API tags RGB subtypes with a format
    /// enumerant rather than printable characters.
    pub const RGB24: FourCc = FourCc(20);
    /// Packed 32-bit RGB (X8R8G8B8).
    pub const RGB32: FourCc = FourCc(22);
    pub const YUY2: FourCc = FourCc::from_bytes(*b"YUY2");
    pub const NV12: FourCc = FourCc::from_bytes(*b"NV12");
    pub const MJPG: FourCc = FourCc::from_bytes(*b"MJPG");

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        FourCc(u32::from_le_bytes(bytes))
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic()) {
            for b in bytes {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({})", self)
    }
}

/// The source encodings the converter registry understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Packed 32-bit RGB, B,G,R,X in memory.
    Rgb32,
    /// Packed 24-bit RGB, B,G,R in memory.
    Rgb24,
    /// Packed 4:2:2 YCbCr; each 4-byte group carries two luma samples and one
    /// shared chroma pair.
    Yuy2,
    /// Planar 4:2:0 YCbCr: a full-resolution luma plane followed by one
    /// interleaved Cb/Cr plane at half resolution in both directions.
    Nv12,
}

impl PixelFormat {
    pub fn subtype(self) -> FourCc {
        match self {
            PixelFormat::Rgb32 => FourCc::RGB32,
            PixelFormat::Rgb24 => FourCc::RGB24,
            PixelFormat::Yuy2 => FourCc::YUY2,
            PixelFormat::Nv12 => FourCc::NV12,
        }
    }

    /// Exact match only; unknown subtypes yield `None`.
    pub fn from_subtype(subtype: FourCc) -> Option<Self> {
        match subtype {
            FourCc::RGB32 => Some(PixelFormat::Rgb32),
            FourCc::RGB24 => Some(PixelFormat::Rgb24),
            FourCc::YUY2 => Some(PixelFormat::Yuy2),
            FourCc::NV12 => Some(PixelFormat::Nv12),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Rgb32 => "RGB32",
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Yuy2 => "YUY2",
            PixelFormat::Nv12 => "NV12",
        }
    }

    /// Chroma-subsampled formats consume pixel pairs (and row pairs for 4:2:0),
    /// so their frame dimensions must be even.
    pub fn is_subsampled(self) -> bool {
        matches!(self, PixelFormat::Yuy2 | PixelFormat::Nv12)
    }

    /// Bytes of pixel data in one row, without padding. For NV12 this is a
    /// luma row. `None` if the width overflows.
    pub fn row_bytes(self, width: u32) -> Option<u32> {
        let bytes_per_pixel = match self {
            PixelFormat::Rgb32 => 4,
            PixelFormat::Rgb24 => 3,
            PixelFormat::Yuy2 => 2,
            PixelFormat::Nv12 => 1,
        };
        width.checked_mul(bytes_per_pixel)
    }

    /// Stride of a tightly packed frame, rounded the way bitmap headers round
    /// RGB rows (to 4 bytes). For NV12 this is the luma-plane stride.
    pub fn default_stride(self, width: u32) -> Option<i32> {
        let row = self.row_bytes(width)?;
        let stride = match self {
            PixelFormat::Rgb24 => row.checked_add(3)? & !3,
            _ => row,
        };
        i32::try_from(stride).ok()
    }

    /// Number of stride-sized rows one frame occupies.
    pub fn rows_per_frame(self, height: u32) -> usize {
        match self {
            PixelFormat::Nv12 => height as usize + height as usize / 2,
            _ => height as usize,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A numerator:denominator pair (pixel aspect ratio, frame rate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ratio {
    pub numerator: u32,
    pub denominator: u32,
}

impl Ratio {
    pub const ONE: Ratio = Ratio::new(1, 1);

    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn as_f64(self) -> f64 {
        if self.denominator == 0 {
            return 0.0;
        }
        self.numerator as f64 / self.denominator as f64
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Ratio::ONE
    }
}

/// Recorded for the session; frames are not processed differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterlaceMode {
    #[default]
    Progressive,
    Unknown,
}

/// Dimensions and layout of every frame in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub pixel_aspect: Ratio,
    pub interlace: InterlaceMode,
    /// Bytes per scanline; negative for bottom-up frames.
    pub default_stride: i32,
}

impl FrameGeometry {
    /// Tightly packed, square-pixel, progressive geometry for `format`.
    /// A width too large for any stride leaves it at 0, which `validate`
    /// rejects.
    pub fn packed(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixel_aspect: Ratio::ONE,
            interlace: InterlaceMode::Progressive,
            default_stride: format.default_stride(width).unwrap_or(0),
        }
    }

    pub fn with_pixel_aspect(mut self, pixel_aspect: Ratio) -> Self {
        self.pixel_aspect = pixel_aspect;
        self
    }

    pub fn with_stride(mut self, stride: i32) -> Self {
        self.default_stride = stride;
        self
    }

    /// Checks the geometry is usable for `format`.
    pub fn validate(&self, format: PixelFormat) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PresentError::InvalidGeometry(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        if format.is_subsampled() && (self.width % 2 != 0 || self.height % 2 != 0) {
            return Err(PresentError::InvalidGeometry(format!(
                "{} requires even dimensions, got {}x{}",
                format, self.width, self.height
            )));
        }
        if self.pixel_aspect.numerator == 0 || self.pixel_aspect.denominator == 0 {
            return Err(PresentError::InvalidGeometry(format!(
                "degenerate pixel aspect ratio {}:{}",
                self.pixel_aspect.numerator, self.pixel_aspect.denominator
            )));
        }
        let row_bytes = format
            .row_bytes(self.width)
            .ok_or_else(|| row_overflow(format, self.width))?;
        if self.default_stride.unsigned_abs() < row_bytes {
            return Err(PresentError::InvalidGeometry(format!(
                "stride {} is shorter than a {} row of width {}",
                self.default_stride, format, self.width
            )));
        }
        Ok(())
    }
}

fn row_overflow(format: PixelFormat, width: u32) -> PresentError {
    PresentError::InvalidGeometry(format!("a {} row of width {} overflows", format, width))
}

/// A media type as offered by a capture source. Optional attributes fall
/// back to defaults when the geometry is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub subtype: FourCc,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Ratio,
    pub pixel_aspect: Option<Ratio>,
    pub interlace: Option<InterlaceMode>,
    pub default_stride: Option<i32>,
}

impl MediaType {
    pub fn new(subtype: FourCc, width: u32, height: u32, frame_rate: Ratio) -> Self {
        Self {
            subtype,
            width,
            height,
            frame_rate,
            pixel_aspect: None,
            interlace: None,
            default_stride: None,
        }
    }

    /// Derives the session geometry: square pixels, progressive scan and a
    /// packed stride unless the type says otherwise.
    pub fn frame_geometry(&self) -> Result<FrameGeometry> {
        let format = PixelFormat::from_subtype(self.subtype)
            .ok_or(PresentError::UnsupportedFormat(self.subtype))?;
        let geometry = FrameGeometry {
            width: self.width,
            height: self.height,
            pixel_aspect: self.pixel_aspect.unwrap_or(Ratio::ONE),
            interlace: self.interlace.unwrap_or_default(),
            default_stride: match self.default_stride {
                Some(stride) => stride,
                None => format
                    .default_stride(self.width)
                    .ok_or_else(|| row_overflow(format, self.width))?,
            },
        };
        geometry.validate(format)?;
        Ok(geometry)
    }
}
