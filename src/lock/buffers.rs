// src/lock/buffers.rs
//! In-memory `MediaBuffer` implementations.
//!
//! `LinearBuffer` only offers linear locking, so the caller's stride decides
//! the layout. `PitchedBuffer` owns its layout (including row padding and
//! orientation) and exposes it through `Buffer2D`.

use super::{Buffer2D, Lock2d, MediaBuffer};
use crate::error::{PresentError, Result};

/// Lock bookkeeping shared by both buffer kinds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LockCounters {
    pub locks: usize,
    pub unlocks: usize,
}

/// A contiguous frame block without 2-D access.
#[derive(Debug, Default, Clone)]
pub struct LinearBuffer {
    data: Vec<u8>,
    locked: bool,
    fail_lock: bool,
    counters: LockCounters,
}

impl LinearBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Makes every subsequent `lock` fail.
    pub fn fail_locks(mut self) -> Self {
        self.fail_lock = true;
        self
    }

    pub fn counters(&self) -> LockCounters {
        self.counters
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl MediaBuffer for LinearBuffer {
    fn lock(&mut self) -> Result<()> {
        if self.fail_lock || self.locked {
            return Err(PresentError::LockFailure("source buffer"));
        }
        self.locked = true;
        self.counters.locks += 1;
        Ok(())
    }

    fn unlock(&mut self) {
        if self.locked {
            self.locked = false;
            self.counters.unlocks += 1;
        }
    }

    fn contents(&self) -> &[u8] {
        &self.data
    }
}

/// A frame with a native pitch that may exceed the packed row size.
///
/// Rows are stored top-down unless `bottom_up` is set, in which case the last
/// row in memory is the top of the image and the reported pitch is negative.
#[derive(Debug, Clone)]
pub struct PitchedBuffer {
    data: Vec<u8>,
    pitch: usize,
    rows: usize,
    bottom_up: bool,
    locked: bool,
    fail_lock: bool,
    counters: LockCounters,
}

impl PitchedBuffer {
    /// Zero-filled buffer of `rows` rows, `pitch` bytes apart.
    pub fn new(pitch: usize, rows: usize) -> Self {
        Self {
            data: vec![0; pitch * rows],
            pitch,
            rows,
            bottom_up: false,
            locked: false,
            fail_lock: false,
            counters: LockCounters::default(),
        }
    }

    pub fn bottom_up(mut self) -> Self {
        self.bottom_up = true;
        self
    }

    pub fn fail_locks(mut self) -> Self {
        self.fail_lock = true;
        self
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn counters(&self) -> LockCounters {
        self.counters
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Mutable access to logical row `y` (0 is the top of the image).
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let physical = if self.bottom_up { self.rows - 1 - y } else { y };
        let start = physical * self.pitch;
        &mut self.data[start..start + self.pitch]
    }
}

impl Buffer2D for PitchedBuffer {
    fn lock_2d(&mut self) -> Result<Lock2d> {
        if self.fail_lock || self.locked {
            return Err(PresentError::LockFailure("source buffer (2-D)"));
        }
        self.locked = true;
        self.counters.locks += 1;
        let lock = if self.bottom_up {
            Lock2d {
                scanline0: self.pitch * self.rows.saturating_sub(1),
                pitch: -(self.pitch as isize),
            }
        } else {
            Lock2d {
                scanline0: 0,
                pitch: self.pitch as isize,
            }
        };
        Ok(lock)
    }

    fn unlock_2d(&mut self) {
        if self.locked {
            self.locked = false;
            self.counters.unlocks += 1;
        }
    }
}

impl MediaBuffer for PitchedBuffer {
    fn lock(&mut self) -> Result<()> {
        self.lock_2d().map(|_| ())
    }

    fn unlock(&mut self) {
        self.unlock_2d();
    }

    fn contents(&self) -> &[u8] {
        &self.data
    }

    fn as_2d(&mut self) -> Option<&mut dyn Buffer2D> {
        Some(self)
    }
}
