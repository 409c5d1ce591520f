// src/lock/mod.rs
//! Scoped read access to a frame's pixel memory.
//!
//! A capture buffer either exposes strided 2-D access (it knows its own
//! pitch and where scanline 0 lives) or only a linear block, in which case
//! the caller's default stride is ground truth. `BufferLock` hides which one
//! is in use and always hands back a `RowView` whose row 0 is the visually
//! top scanline.
//!
//! ## Stride sign
//! A negative stride means the memory is bottom-up. The view's origin then
//! sits at `|stride| * (height - 1)` and rows are reached by *adding* the
//! negative stride, so a single converter loop serves both orientations.
//!
//! ## Release
//! The lock is released exactly once: by `unlock()` or on drop, whichever
//! comes first. Releasing twice is a no-op.

pub mod buffers;


pub use buffers::{LinearBuffer, PitchedBuffer};

use crate::error::{PresentError, Result};
use log::trace;

/// Where scanline 0 starts within a 2-D locked buffer and its pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lock2d {
    pub scanline0: usize,
    pub pitch: isize,
}

/// Native strided access. Implemented by buffers that know their own layout.
pub trait Buffer2D {
    fn lock_2d(&mut self) -> Result<Lock2d>;
    fn unlock_2d(&mut self);
}

/// A frame buffer owned by the capture side.
///
/// `contents` is only meaningful between a successful `lock`/`lock_2d` and
/// the matching unlock.
pub trait MediaBuffer {
    fn lock(&mut self) -> Result<()>;
    fn unlock(&mut self);
    fn contents(&self) -> &[u8];

    /// Capability probe for strided access. Buffers without it keep the default.
    fn as_2d(&mut self) -> Option<&mut dyn Buffer2D> {
        None
    }
}

/// A borrowed, read-only window onto scanlines with a signed stride.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    data: &'a [u8],
    origin: usize,
    stride: isize,
}

impl<'a> RowView<'a> {
    /// `origin` is the byte offset of logical scanline 0 inside `data`.
    pub fn new(data: &'a [u8], origin: usize, stride: isize) -> Self {
        Self {
            data,
            origin,
            stride,
        }
    }

    /// Top-down view over a tightly laid out buffer.
    pub fn top_down(data: &'a [u8], stride: usize) -> Self {
        Self::new(data, 0, stride as isize)
    }

    pub fn stride(&self) -> isize {
        self.stride
    }

    pub fn origin(&self) -> usize {
        self.origin
    }

    /// Bytes of logical row `y`, or `None` when the row falls outside the buffer.
    pub fn row(&self, y: usize, len: usize) -> Option<&'a [u8]> {
        let start = (self.origin as isize).checked_add((y as isize).checked_mul(self.stride)?)?;
        if start < 0 {
            return None;
        }
        let start = start as usize;
        let end = start.checked_add(len)?;
        self.data.get(start..end)
    }

    /// Verifies rows `0..rows` each hold `len` bytes. Row addresses are
    /// monotonic in `y`, so the first and last row bound all the others.
    pub fn check_rows(&self, rows: usize, len: usize) -> Result<()> {
        if rows == 0 {
            return Ok(());
        }
        if self.row(0, len).is_some() && self.row(rows - 1, len).is_some() {
            return Ok(());
        }
        Err(PresentError::GeometryMismatch {
            buffer: "source",
            rows,
            row_bytes: len,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Strided,
    Linear,
}

/// Scoped lock over a `MediaBuffer`.
pub struct BufferLock<'a> {
    buffer: &'a mut dyn MediaBuffer,
    has_2d: bool,
    locked: Option<LockMode>,
    stride: isize,
}

impl<'a> BufferLock<'a> {
    /// Wraps `buffer`, probing once for strided access. Nothing is locked yet.
    pub fn new(buffer: &'a mut dyn MediaBuffer) -> Self {
        let has_2d = buffer.as_2d().is_some();
        Self {
            buffer,
            has_2d,
            locked: None,
            stride: 0,
        }
    }

    /// Locks the buffer and returns a view whose row 0 is the top scanline.
    ///
    /// `min_stride` is the default stride of the negotiated format and is
    /// only used when the buffer has no 2-D access; otherwise the buffer's
    /// own pitch (which may include padding) wins. Read the stride in effect
    /// from the returned view or `stride()`, not from `min_stride`.
    pub fn acquire(&mut self, min_stride: isize, height: u32) -> Result<RowView<'_>> {
        self.unlock();
        self.stride = 0;

        if self.has_2d {
            let lock = match self.buffer.as_2d() {
                Some(strided) => strided.lock_2d()?,
                None => return Err(PresentError::LockFailure("source buffer (2-D)")),
            };
            self.locked = Some(LockMode::Strided);
            self.stride = lock.pitch;
            trace!(
                "BufferLock: 2-D lock, pitch {} (requested {})",
                lock.pitch,
                min_stride
            );
            return Ok(RowView::new(self.buffer.contents(), lock.scanline0, lock.pitch));
        }

        self.buffer.lock()?;
        self.locked = Some(LockMode::Linear);
        self.stride = min_stride;

        let origin = if min_stride < 0 {
            min_stride.unsigned_abs() * (height.max(1) as usize - 1)
        } else {
            0
        };
        trace!(
            "BufferLock: linear lock, stride {}, scanline 0 at +{}",
            min_stride,
            origin
        );
        Ok(RowView::new(self.buffer.contents(), origin, min_stride))
    }

    /// Stride in effect after the last successful `acquire`.
    pub fn stride(&self) -> isize {
        self.stride
    }

    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    /// Releases the lock if held.
    pub fn unlock(&mut self) {
        match self.locked.take() {
            Some(LockMode::Strided) => {
                if let Some(strided) = self.buffer.as_2d() {
                    strided.unlock_2d();
                }
            }
            Some(LockMode::Linear) => self.buffer.unlock(),
            None => {}
        }
    }
}

impl Drop for BufferLock<'_> {
    fn drop(&mut self) {
        self.unlock();
    }
}
