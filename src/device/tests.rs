// src/device/tests.rs

use super::*;
use crate::convert::{ycbcr_to_rgb, Rgb};
use crate::error::PresentError;
use crate::format::{FourCc, FrameGeometry, MediaType, PixelFormat, Ratio};
use crate::geometry::Rect;
use crate::lock::{LinearBuffer, PitchedBuffer};
use std::sync::mpsc::TryRecvError;
use std::sync::Arc;
use std::thread;
use test_log::test;

const BACKGROUND: Rgb = Rgb::new(0, 0, 0x80);

fn nv12_frame(width: usize, height: usize, y: u8, cb: u8, cr: u8) -> LinearBuffer {
    let mut data = vec![y; width * height];
    for _ in 0..height / 2 {
        for _ in 0..width / 2 {
            data.extend_from_slice(&[cb, cr]);
        }
    }
    LinearBuffer::new(data)
}

struct Rig {
    presenter: Presenter<HeadlessBackend>,
    control: HeadlessControl,
    window: HeadlessWindow,
}

impl Rig {
    fn new(window_width: u32, window_height: u32) -> Self {
        let backend = HeadlessBackend::new();
        let control = backend.control();
        Self {
            presenter: Presenter::new(backend, PresenterOptions::default()),
            control,
            window: HeadlessWindow::new(window_width, window_height),
        }
    }

    /// Device created and a 640x480 NV12 format set.
    fn ready(window_width: u32, window_height: u32) -> Self {
        let rig = Self::new(window_width, window_height);
        rig.presenter.create_device(rig.window.clone()).unwrap();
        rig.presenter
            .set_video_type(FourCc::NV12, FrameGeometry::packed(PixelFormat::Nv12, 640, 480))
            .unwrap();
        rig
    }

    fn gray(&self) -> LinearBuffer {
        nv12_frame(640, 480, 128, 128, 128)
    }
}

// --- End to end ---

#[test]
fn nv12_gray_is_presented_letterboxed_on_background() {
    let rig = Rig::ready(1280, 720);
    assert_eq!(rig.presenter.destination_rect(), Rect::new(160, 0, 1120, 720));

    rig.presenter.draw_frame(&mut rig.gray()).unwrap();

    let frame = rig.control.last_frame().expect("a frame was presented");
    assert_eq!((frame.width, frame.height), (1280, 720));
    let gray = ycbcr_to_rgb(128, 128, 128);
    assert_eq!(gray, Rgb::new(130, 130, 130));
    for (x, y) in [(640, 360), (160, 0), (1119, 719), (400, 100)] {
        assert_eq!(frame.rgb(x, y), gray, "inside at ({}, {})", x, y);
    }
    for (x, y) in [(0, 0), (159, 360), (1120, 360), (1279, 719)] {
        assert_eq!(frame.rgb(x, y), BACKGROUND, "margin at ({}, {})", x, y);
    }
}

#[test]
fn bottom_up_rgb24_buffer_is_presented_upright() {
    let rig = Rig::new(2, 2);
    rig.presenter.create_device(rig.window.clone()).unwrap();
    rig.presenter
        .set_video_type(FourCc::RGB24, FrameGeometry::packed(PixelFormat::Rgb24, 2, 2))
        .unwrap();

    let mut buffer = PitchedBuffer::new(8, 2).bottom_up();
    buffer.row_mut(0)[..6].copy_from_slice(&[10, 20, 30, 40, 50, 60]);
    buffer.row_mut(1)[..6].copy_from_slice(&[70, 80, 90, 100, 110, 120]);
    rig.presenter.draw_frame(&mut buffer).unwrap();

    let frame = rig.control.last_frame().unwrap();
    assert_eq!(frame.rgb(0, 0), Rgb::new(30, 20, 10));
    assert_eq!(frame.rgb(1, 0), Rgb::new(60, 50, 40));
    assert_eq!(frame.rgb(0, 1), Rgb::new(90, 80, 70));
    assert_eq!(frame.rgb(1, 1), Rgb::new(120, 110, 100));
    assert!(!buffer.is_locked());
    assert_eq!(buffer.counters().unlocks, 1);
}

#[test]
fn tightly_packed_rgb24_media_type_draws() {
    let rig = Rig::new(2, 2);
    rig.presenter.create_device(rig.window.clone()).unwrap();
    let mut media = MediaType::new(FourCc::RGB24, 2, 2, Ratio::new(30, 1));
    media.default_stride = Some(6);
    rig.presenter.set_media_type(&media).unwrap();

    let mut buffer = LinearBuffer::new(vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120]);
    rig.presenter.draw_frame(&mut buffer).unwrap();

    let frame = rig.control.last_frame().unwrap();
    assert_eq!(frame.rgb(1, 0), Rgb::new(60, 50, 40));
    assert_eq!(frame.rgb(0, 1), Rgb::new(90, 80, 70));
}

// --- Not ready ---

#[test]
fn draw_before_device_is_a_noop() {
    let rig = Rig::new(640, 480);
    rig.presenter.draw_frame(&mut rig.gray()).unwrap();
    assert_eq!(rig.control.stats().frames_presented, 0);
    assert_eq!(rig.presenter.state(), DeviceState::Uninitialized);
}

#[test]
fn draw_before_video_type_is_a_noop() {
    let rig = Rig::new(640, 480);
    rig.presenter.create_device(rig.window.clone()).unwrap();
    let mut buffer = rig.gray();
    rig.presenter.draw_frame(&mut buffer).unwrap();
    assert_eq!(rig.control.stats().frames_presented, 0);
    assert_eq!(buffer.counters().locks, 0, "source is never locked");
}

#[test]
fn video_type_requires_device() {
    let rig = Rig::new(640, 480);
    let err = rig
        .presenter
        .set_video_type(FourCc::NV12, FrameGeometry::packed(PixelFormat::Nv12, 640, 480))
        .unwrap_err();
    assert_eq!(err, PresentError::NotInitialized);
}

#[test]
fn unsupported_subtype_leaves_format_unchanged() {
    let rig = Rig::ready(640, 480);
    let before = rig.presenter.video_format();
    let err = rig
        .presenter
        .set_video_type(FourCc::MJPG, FrameGeometry::packed(PixelFormat::Nv12, 640, 480))
        .unwrap_err();
    assert_eq!(err, PresentError::UnsupportedFormat(FourCc::MJPG));
    assert_eq!(rig.presenter.video_format(), before);
    assert!(!rig.presenter.is_format_supported(FourCc::MJPG));
    assert_eq!(rig.presenter.supported_formats().len(), 4);
}

#[test]
fn failed_swap_chain_keeps_previous_format_out() {
    let rig = Rig::new(640, 480);
    rig.presenter.create_device(rig.window.clone()).unwrap();
    rig.control.fail_next_swap_chains(1);
    assert!(rig
        .presenter
        .set_video_type(FourCc::YUY2, FrameGeometry::packed(PixelFormat::Yuy2, 320, 240))
        .is_err());
    assert_eq!(rig.presenter.video_format(), None);
}

// --- Creation ---

#[test]
fn create_device_is_idempotent() {
    let rig = Rig::new(640, 480);
    rig.presenter.create_device(rig.window.clone()).unwrap();
    rig.presenter.create_device(rig.window.clone()).unwrap();
    assert_eq!(rig.control.stats().devices_created, 1);
    assert_eq!(rig.control.stats().contexts_created, 1);
    assert_eq!(rig.presenter.state(), DeviceState::Ready);
}

#[test]
fn creation_failure_leaves_nothing_behind() {
    let rig = Rig::new(640, 480);
    rig.control.fail_context_creation(true);
    let err = rig.presenter.create_device(rig.window.clone()).unwrap_err();
    assert!(matches!(err, PresentError::DeviceCreation(_)));
    assert_eq!(rig.presenter.state(), DeviceState::Uninitialized);

    rig.control.fail_context_creation(false);
    rig.control.set_display_format(SurfaceFormat::R5G6B5);
    assert!(matches!(
        rig.presenter.create_device(rig.window.clone()),
        Err(PresentError::DeviceCreation(_))
    ));

    rig.control.set_display_format(SurfaceFormat::X8R8G8B8);
    rig.control.fail_next_device_creations(1);
    assert!(rig.presenter.create_device(rig.window.clone()).is_err());
    assert_eq!(rig.presenter.state(), DeviceState::Uninitialized);

    rig.presenter.create_device(rig.window.clone()).unwrap();
    assert_eq!(rig.presenter.state(), DeviceState::Ready);
}

// --- Loss and reset ---

#[test]
fn needs_reset_resets_once_then_draws() {
    let rig = Rig::ready(640, 480);
    rig.control.script_status([DeviceStatus::NotReset]);

    rig.presenter.draw_frame(&mut rig.gray()).unwrap();

    let stats = rig.control.stats();
    assert_eq!(stats.resets, 1);
    assert_eq!(stats.devices_created, 1, "reset happened in place");
    assert_eq!(stats.frames_presented, 1);
    assert_eq!(rig.presenter.state(), DeviceState::Ready);
}

#[test]
fn failed_in_place_reset_recreates_device() {
    let rig = Rig::ready(640, 480);
    rig.control.script_status([DeviceStatus::Lost]);
    rig.control.fail_next_resets(1);

    rig.presenter.draw_frame(&mut rig.gray()).unwrap();

    let stats = rig.control.stats();
    assert_eq!(stats.resets, 1);
    assert_eq!(stats.devices_created, 2);
    assert_eq!(stats.swap_chains_created, 2, "video swap chain restored");
    assert_eq!(stats.frames_presented, 1);
}

#[test]
fn exhausted_reset_fails_without_drawing_and_notifies_once() {
    let rig = Rig::ready(640, 480);
    let notices = rig.presenter.subscribe();
    rig.control.script_status([DeviceStatus::NotReset]);
    rig.control.fail_next_resets(1);
    rig.control.fail_next_device_creations(1);

    let err = rig.presenter.draw_frame(&mut rig.gray()).unwrap_err();
    assert_eq!(err, PresentError::DeviceFailed);
    assert_eq!(rig.control.stats().frames_presented, 0);
    assert_eq!(rig.presenter.state(), DeviceState::Failed);

    let err = rig.presenter.draw_frame(&mut rig.gray()).unwrap_err();
    assert_eq!(err, PresentError::DeviceFailed);
    assert_eq!(rig.presenter.reset_device(), Err(PresentError::DeviceFailed));

    assert_eq!(notices.try_recv(), Ok(DeviceNotice::Failed));
    assert_eq!(notices.try_recv(), Err(TryRecvError::Empty));
}

#[test]
fn reinit_after_failure_recovers_video() {
    let rig = Rig::ready(640, 480);
    let notices = rig.presenter.subscribe();
    rig.control.script_status([DeviceStatus::DriverInternalError]);
    assert_eq!(
        rig.presenter.draw_frame(&mut rig.gray()),
        Err(PresentError::DeviceFailed)
    );
    assert_eq!(rig.presenter.state(), DeviceState::Failed);

    rig.presenter.create_device(rig.window.clone()).unwrap();
    assert_eq!(rig.presenter.state(), DeviceState::Ready);
    rig.presenter.draw_frame(&mut rig.gray()).unwrap();
    assert_eq!(rig.control.stats().frames_presented, 1);

    assert_eq!(notices.try_recv(), Ok(DeviceNotice::Failed));
    assert_eq!(notices.try_recv(), Ok(DeviceNotice::Recovered));
}

#[test]
fn lost_present_marks_device_lost_and_next_frame_recovers() {
    let rig = Rig::ready(640, 480);
    rig.control.lose_next_presents(1);

    let err = rig.presenter.draw_frame(&mut rig.gray()).unwrap_err();
    assert_eq!(err, PresentError::DeviceLost);
    assert_eq!(rig.presenter.state(), DeviceState::Lost);

    rig.presenter.draw_frame(&mut rig.gray()).unwrap();
    assert_eq!(rig.presenter.state(), DeviceState::Ready);
    assert_eq!(rig.control.stats().resets, 1);
    assert_eq!(rig.control.stats().frames_presented, 1);
}

#[test]
fn explicit_reset_requires_a_device() {
    let rig = Rig::new(640, 480);
    assert_eq!(rig.presenter.reset_device(), Err(PresentError::NotInitialized));
    rig.presenter.create_device(rig.window.clone()).unwrap();
    rig.presenter.reset_device().unwrap();
    assert_eq!(rig.control.stats().resets, 1);
    assert_eq!(rig.presenter.check_device_health(), Ok(()));
}

// --- Per-frame failures ---

#[test]
fn source_lock_failure_drops_frame_and_stays_ready() {
    let rig = Rig::ready(640, 480);
    let mut buffer = rig.gray().fail_locks();
    let err = rig.presenter.draw_frame(&mut buffer).unwrap_err();
    assert!(err.is_per_frame());
    assert_eq!(rig.presenter.state(), DeviceState::Ready);
    assert_eq!(rig.control.stats().frames_presented, 0);

    rig.presenter.draw_frame(&mut rig.gray()).unwrap();
    assert_eq!(rig.control.stats().frames_presented, 1);
}

#[test]
fn back_buffer_lock_failure_releases_source() {
    let rig = Rig::ready(640, 480);
    rig.control.fail_next_back_buffer_locks(1);
    let mut buffer = rig.gray();
    let err = rig.presenter.draw_frame(&mut buffer).unwrap_err();
    assert_eq!(err, PresentError::LockFailure("back buffer"));
    assert!(!buffer.is_locked());
    assert_eq!(buffer.counters().unlocks, 1);
    assert_eq!(rig.presenter.state(), DeviceState::Ready);
}

#[test]
fn short_source_buffer_is_dropped() {
    let rig = Rig::ready(640, 480);
    let mut buffer = nv12_frame(640, 240, 128, 128, 128);
    assert!(matches!(
        rig.presenter.draw_frame(&mut buffer),
        Err(PresentError::GeometryMismatch { .. })
    ));
    assert_eq!(rig.presenter.state(), DeviceState::Ready);
}

// --- Geometry ---

#[test]
fn resize_recomputes_destination_only() {
    let rig = Rig::ready(1280, 720);
    let chains = rig.control.stats().swap_chains_created;

    rig.window.resize(640, 960);
    rig.presenter.reset_video_size();
    assert_eq!(rig.presenter.destination_rect(), Rect::new(0, 240, 640, 720));
    assert_eq!(rig.control.stats().swap_chains_created, chains);

    rig.presenter.draw_frame(&mut rig.gray()).unwrap();
    let frame = rig.control.last_frame().unwrap();
    assert_eq!((frame.width, frame.height), (640, 960));
    assert_eq!(frame.rgb(320, 100), BACKGROUND);
    assert_eq!(frame.rgb(320, 480), Rgb::new(130, 130, 130));
}

#[test]
fn pixel_aspect_widens_destination() {
    let rig = Rig::new(1600, 486);
    rig.presenter.create_device(rig.window.clone()).unwrap();
    let geometry =
        FrameGeometry::packed(PixelFormat::Yuy2, 720, 486).with_pixel_aspect(Ratio::new(10, 9));
    rig.presenter.set_video_type(FourCc::YUY2, geometry).unwrap();
    assert_eq!(rig.presenter.destination_rect(), Rect::new(400, 0, 1200, 486));
}

// --- Lifecycle ---

#[test]
fn destroy_then_recreate_restores_format() {
    let rig = Rig::ready(640, 480);
    rig.presenter.destroy_device();
    assert_eq!(rig.presenter.state(), DeviceState::Uninitialized);
    rig.presenter.draw_frame(&mut rig.gray()).unwrap();
    assert_eq!(rig.control.stats().frames_presented, 0);

    rig.presenter.create_device(rig.window.clone()).unwrap();
    rig.presenter.draw_frame(&mut rig.gray()).unwrap();
    assert_eq!(rig.control.stats().frames_presented, 1);
}

#[test]
fn resize_and_draw_from_different_threads() {
    let rig = Rig::ready(1280, 720);
    let presenter = Arc::new(rig.presenter);
    let window = rig.window.clone();

    let drawer = {
        let presenter = Arc::clone(&presenter);
        thread::spawn(move || {
            for _ in 0..40 {
                let mut buffer = nv12_frame(640, 480, 128, 128, 128);
                presenter.draw_frame(&mut buffer).unwrap();
            }
        })
    };
    for step in 0..40u32 {
        window.resize(320 + step * 16, 240 + step * 9);
        presenter.reset_video_size();
    }
    drawer.join().unwrap();

    assert_eq!(rig.control.stats().frames_presented, 40);
    assert_eq!(presenter.state(), DeviceState::Ready);
}
