// src/convert/mod.rs
//! Pixel-format converter registry.
//!
//! Every converter turns one frame of scanlines into 32-bit X8R8G8B8 pixels
//! (B,G,R,X in memory). The set of formats is closed, so the registry is a
//! fixed table of `Converter` variants and dispatch is a `match`.
//!
//! Converters are stateless and may be called from any thread.

mod ycbcr;


pub use ycbcr::{ycbcr_to_rgb, Rgb};

use crate::error::{PresentError, Result};
use crate::format::{FourCc, PixelFormat};
use crate::lock::RowView;

/// Bytes per pixel of the presentable output surface.
pub const OUTPUT_BYTES_PER_PIXEL: usize = 4;

/// A stateless conversion function bound to one source format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Converter {
    Rgb32,
    Rgb24,
    Yuy2,
    Nv12,
}

/// Lookup order doubles as the preference order for alternate subtypes.
const REGISTRY: [Converter; 4] = [
    Converter::Rgb32,
    Converter::Rgb24,
    Converter::Yuy2,
    Converter::Nv12,
];

/// Converter for `subtype`, if any. Exact match only.
pub fn find(subtype: FourCc) -> Option<Converter> {
    REGISTRY
        .iter()
        .copied()
        .find(|converter| converter.format().subtype() == subtype)
}

/// Same as `find`, with the miss reported as `UnsupportedFormat`.
pub fn lookup(subtype: FourCc) -> Result<Converter> {
    find(subtype).ok_or(PresentError::UnsupportedFormat(subtype))
}

pub fn is_supported(subtype: FourCc) -> bool {
    find(subtype).is_some()
}

/// All supported subtypes in registry order.
pub fn supported_formats() -> Vec<FourCc> {
    REGISTRY
        .iter()
        .map(|converter| converter.format().subtype())
        .collect()
}

impl Converter {
    pub fn format(self) -> PixelFormat {
        match self {
            Converter::Rgb32 => PixelFormat::Rgb32,
            Converter::Rgb24 => PixelFormat::Rgb24,
            Converter::Yuy2 => PixelFormat::Yuy2,
            Converter::Nv12 => PixelFormat::Nv12,
        }
    }

    pub fn name(self) -> &'static str {
        self.format().name()
    }

    /// Bytes of source data one pixel row spans.
    fn source_row_bytes(self, width: usize) -> usize {
        match self {
            Converter::Rgb32 => width * 4,
            Converter::Rgb24 => width * 3,
            Converter::Yuy2 => width * 2,
            Converter::Nv12 => width,
        }
    }

    /// Converts `width` x `height` pixels from `src` into `dst`, writing rows
    /// `dst_stride` bytes apart.
    ///
    /// Source and destination strides are independent. Both extents are
    /// checked before any pixel is written; a short buffer yields
    /// `GeometryMismatch` and leaves `dst` untouched.
    pub fn convert(
        self,
        dst: &mut [u8],
        dst_stride: usize,
        src: &RowView<'_>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let width = width as usize;
        let height = height as usize;
        if self.format().is_subsampled() && (width % 2 != 0 || height % 2 != 0) {
            return Err(PresentError::InvalidGeometry(format!(
                "{} frames need even dimensions, got {}x{}",
                self.name(),
                width,
                height
            )));
        }

        let dst_row_bytes = width * OUTPUT_BYTES_PER_PIXEL;
        check_destination(dst.len(), dst_stride, dst_row_bytes, height)?;
        src.check_rows(
            self.format().rows_per_frame(height as u32),
            self.source_row_bytes(width),
        )?;

        match self {
            Converter::Rgb32 => copy_image(dst, dst_stride, src, dst_row_bytes, height),
            Converter::Rgb24 => rgb24_to_rgb32(dst, dst_stride, src, width, height),
            Converter::Yuy2 => yuy2_to_rgb32(dst, dst_stride, src, width, height),
            Converter::Nv12 => nv12_to_rgb32(dst, dst_stride, src, width, height),
        }
        Ok(())
    }
}

fn check_destination(len: usize, stride: usize, row_bytes: usize, rows: usize) -> Result<()> {
    let fits = rows == 0
        || (stride >= row_bytes
            && stride
                .checked_mul(rows - 1)
                .and_then(|offset| offset.checked_add(row_bytes))
                .is_some_and(|end| end <= len));
    if fits {
        Ok(())
    } else {
        Err(PresentError::GeometryMismatch {
            buffer: "destination",
            rows,
            row_bytes,
        })
    }
}

/// Destination row `y`; extents were validated by `check_destination`.
fn dst_row(dst: &mut [u8], stride: usize, y: usize, len: usize) -> &mut [u8] {
    let start = y * stride;
    &mut dst[start..start + len]
}

/// Source row `y`; extents were validated by `RowView::check_rows`.
fn src_row<'a>(src: &RowView<'a>, y: usize, len: usize) -> &'a [u8] {
    src.row(y, len).unwrap_or_default()
}

/// Row-wise bulk copy. The layouts already agree, so this is pure memcpy.
fn copy_image(dst: &mut [u8], dst_stride: usize, src: &RowView<'_>, row_bytes: usize, height: usize) {
    for y in 0..height {
        dst_row(dst, dst_stride, y, row_bytes).copy_from_slice(src_row(src, y, row_bytes));
    }
}

fn rgb24_to_rgb32(dst: &mut [u8], dst_stride: usize, src: &RowView<'_>, width: usize, height: usize) {
    for y in 0..height {
        let src_line = src_row(src, y, width * 3);
        let dst_line = dst_row(dst, dst_stride, y, width * OUTPUT_BYTES_PER_PIXEL);
        for (out, bgr) in dst_line.chunks_exact_mut(4).zip(src_line.chunks_exact(3)) {
            out[0] = bgr[0];
            out[1] = bgr[1];
            out[2] = bgr[2];
            out[3] = 0xFF;
        }
    }
}

/// Byte order per 4-byte group is Y0 U Y1 V; both luma samples share the chroma pair.
fn yuy2_to_rgb32(dst: &mut [u8], dst_stride: usize, src: &RowView<'_>, width: usize, height: usize) {
    for y in 0..height {
        let src_line = src_row(src, y, width * 2);
        let dst_line = dst_row(dst, dst_stride, y, width * OUTPUT_BYTES_PER_PIXEL);
        for (out, group) in dst_line.chunks_exact_mut(8).zip(src_line.chunks_exact(4)) {
            let (y0, cb, y1, cr) = (group[0], group[1], group[2], group[3]);
            ycbcr_to_rgb(y0, cb, cr).write_bgrx(&mut out[0..4]);
            ycbcr_to_rgb(y1, cb, cr).write_bgrx(&mut out[4..8]);
        }
    }
}

/// Two luma rows per pass; each 2x2 luma block shares one Cb/Cr pair from
/// the chroma plane, which starts at logical row `height`.
fn nv12_to_rgb32(dst: &mut [u8], dst_stride: usize, src: &RowView<'_>, width: usize, height: usize) {
    for y in (0..height).step_by(2) {
        let luma_top = src_row(src, y, width);
        let luma_bottom = src_row(src, y + 1, width);
        let chroma = src_row(src, height + y / 2, width);

        for x in (0..width).step_by(2) {
            let cb = chroma[x];
            let cr = chroma[x + 1];

            let top = dst_row(dst, dst_stride, y, width * OUTPUT_BYTES_PER_PIXEL);
            ycbcr_to_rgb(luma_top[x], cb, cr).write_bgrx(&mut top[x * 4..x * 4 + 4]);
            ycbcr_to_rgb(luma_top[x + 1], cb, cr).write_bgrx(&mut top[x * 4 + 4..x * 4 + 8]);

            let bottom = dst_row(dst, dst_stride, y + 1, width * OUTPUT_BYTES_PER_PIXEL);
            ycbcr_to_rgb(luma_bottom[x], cb, cr).write_bgrx(&mut bottom[x * 4..x * 4 + 4]);
            ycbcr_to_rgb(luma_bottom[x + 1], cb, cr).write_bgrx(&mut bottom[x * 4 + 4..x * 4 + 8]);
        }
    }
}
