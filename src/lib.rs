//! Frameview library crate.
//!
//! Converts captured video frames to 32-bit RGB and presents them
//! letterboxed into a window, recovering from graphics device loss.

/// Configuration management.
pub mod config;
/// Pixel-format converters.
pub mod convert;
/// Presentation device, backends and the presenter.
pub mod device;
/// Error types.
pub mod error;
/// Media subtypes and frame geometry.
pub mod format;
/// Aspect correction and letterboxing.
pub mod geometry;
/// Scoped access to frame buffers.
pub mod lock;
/// Capture format negotiation.
pub mod negotiate;
/// Capture preview sessions.
pub mod preview;
/// Synthetic capture source.
pub mod source;

pub use error::{PresentError, Result};
