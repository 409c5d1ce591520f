// src/error.rs

//! Error taxonomy for frame conversion and presentation.
//!
//! Errors fall into two groups. Per-frame errors (`LockFailure`,
//! `GeometryMismatch`, `Backend` raised while drawing) drop the current frame
//! and leave the device usable. Device-level errors (`DeviceCreation`,
//! `DeviceFailed`) are surfaced to the owner, who decides whether to retry.

use crate::format::FourCc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresentError {
    #[error("no converter registered for subtype {0}")]
    UnsupportedFormat(FourCc),
    #[error("failed to lock {0}")]
    LockFailure(&'static str),
    #[error("presentation device lost")]
    DeviceLost,
    #[error("presentation device needs reset")]
    DeviceNeedsReset,
    #[error("failed to create presentation device: {0}")]
    DeviceCreation(String),
    #[error("geometry mismatch: {rows} rows of {row_bytes} bytes exceed the {buffer} extent")]
    GeometryMismatch {
        buffer: &'static str,
        rows: usize,
        row_bytes: usize,
    },
    #[error("presentation device failed and must be re-created")]
    DeviceFailed,
    #[error("presentation device not initialized")]
    NotInitialized,
    #[error("invalid video geometry: {0}")]
    InvalidGeometry(String),
    #[error("backend call failed: {0}")]
    Backend(String),
    #[error("no native media type could be negotiated")]
    NegotiationFailed,
}

impl PresentError {
    /// True for errors that only cost the current frame.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            PresentError::LockFailure(_)
                | PresentError::GeometryMismatch { .. }
                | PresentError::Backend(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PresentError>;
