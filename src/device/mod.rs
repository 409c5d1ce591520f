// src/device/mod.rs
//! Presentation device management.
//!
//! - `backend`: trait family a graphics API implements.
//! - `state`: the device lifecycle (`Uninitialized`, `Ready`, `Lost`, `Failed`).
//! - `Presenter`: converts frames into a swap chain and presents them
//!   letterboxed, recovering from device loss on the way.
//! - `headless`: a software backend for tests and the demo binary.

pub mod backend;
pub mod headless;
pub mod state;

mod presenter;

#[cfg(test)]
mod tests;

pub use backend::{DeviceStatus, GraphicsBackend, SurfaceFormat, TextureFilter, VideoWindow};
pub use headless::{HeadlessBackend, HeadlessControl, HeadlessWindow, PresentedFrame};
pub use presenter::{DeviceNotice, Presenter, PresenterOptions, VideoFormat, WindowOf};
pub use state::DeviceState;
