// src/main.rs

//! Headless preview run: negotiates a test-pattern camera, presents frames
//! through the software backend and exercises a resize and a device loss.

use anyhow::Context;
use frameview::config::CONFIG;
use frameview::device::{
    DeviceNotice, DeviceStatus, HeadlessBackend, HeadlessWindow, Presenter, PresenterOptions,
};
use frameview::format::{FourCc, MediaType, Ratio};
use frameview::negotiate::Requirement;
use frameview::preview::Preview;
use frameview::source::TestPatternSource;
use log::{info, warn};
use std::sync::Arc;

const DEFAULT_FRAME_COUNT: u32 = 90;
const SYMBOLIC_LINK: &str = r"\\?\root#camera#0000#{frameview-test-pattern}";

fn main() -> anyhow::Result<()> {
    // Default filter is "info" if RUST_LOG is not set.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    info!("Starting frameview...");

    let frame_count = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse::<u32>()
            .with_context(|| format!("Invalid frame count '{}'", arg))?,
        None => DEFAULT_FRAME_COUNT,
    };

    let capture = &CONFIG.capture;
    let display = &CONFIG.display;
    info!(
        "Requesting {}x{} @ {} fps, window {}x{}",
        capture.width, capture.height, capture.fps, display.window_width, display.window_height
    );

    // --- Presentation ---
    let backend = HeadlessBackend::new();
    let control = backend.control();
    let presenter = Arc::new(Presenter::new(backend, PresenterOptions::from(display)));
    let notices = presenter.subscribe();
    let window = HeadlessWindow::new(display.window_width, display.window_height);

    // --- Capture ---
    let rate = Ratio::new(capture.fps.round().max(1.0) as u32, 1);
    let camera = TestPatternSource::new(vec![
        MediaType::new(FourCc::MJPG, capture.width, capture.height, rate),
        MediaType::new(FourCc::NV12, capture.width, capture.height, rate),
        MediaType::new(FourCc::YUY2, capture.width / 2, capture.height / 2, rate),
    ]);

    let mut preview = Preview::new(Arc::clone(&presenter), Requirement::from(capture));
    let media = preview
        .open(camera, SYMBOLIC_LINK, window.clone())
        .context("Failed to open preview")?;
    info!("Negotiated {} {}x{}", media.subtype, media.width, media.height);

    // --- Frame loop ---
    for frame in 0..frame_count {
        if frame == frame_count / 3 {
            info!("Simulating window resize");
            window.resize(display.window_width / 2, display.window_height);
            preview.resize();
        }
        if frame == 2 * frame_count / 3 {
            info!("Simulating device loss");
            control.script_status([DeviceStatus::NotReset]);
        }
        preview
            .pump()
            .with_context(|| format!("Presentation failed at frame {}", frame))?;
    }

    while let Ok(notice) = notices.try_recv() {
        match notice {
            DeviceNotice::Failed => warn!("Device failed during the run"),
            DeviceNotice::Recovered => info!("Device recovered during the run"),
        }
    }

    let stats = preview.stats();
    let backend_stats = control.stats();
    info!(
        "Drawn {} frames, dropped {}, gaps {}",
        stats.frames_drawn, stats.frames_dropped, stats.gaps
    );
    info!(
        "Backend: {} presents, {} resets, {} devices, destination {:?}",
        backend_stats.frames_presented,
        backend_stats.resets,
        backend_stats.devices_created,
        presenter.destination_rect()
    );
    // Removal notifications carry the device path in arbitrary case.
    if preview.is_device_lost(&SYMBOLIC_LINK.to_uppercase()) {
        info!("Simulated removal of {}, closing preview", SYMBOLIC_LINK);
        preview.close();
    }
    presenter.destroy_device();
    info!("frameview exiting.");
    Ok(())
}
