//! Fly a viewer once around a ring and report streaming stats.
//!
//! Usage: cargo run --release --bin ring_flythrough -- [--config ring.json] [--profile profile.json] [--frames 600]

use std::path::PathBuf;
use std::time::Instant;

use ringfield::core::logging;
use ringfield::core::types::DVec3;
use ringfield::core::{Viewer, ViewerId};
use ringfield::ring::{RingConfig, RingProfile};
use ringfield::RingEngine;

fn arg_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn main() -> ringfield::core::types::Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().collect();

    let config = match arg_value(&args, "--config") {
        Some(path) => RingConfig::load(&PathBuf::from(path))?,
        None => RingConfig::default(),
    };
    let profile = match arg_value(&args, "--profile") {
        Some(path) => RingProfile::load(&PathBuf::from(path))?,
        None => RingProfile::constant(1.0, 64),
    };
    let frames: u64 = arg_value(&args, "--frames")
        .and_then(|s| s.parse().ok())
        .unwrap_or(600);

    let radius = 0.5 * (config.shape.inner_radius + config.shape.outer_radius);
    let mut engine = RingEngine::new(config, profile);

    let start = Instant::now();
    let mut peak_particles = 0;
    for frame in 0..frames {
        let angle = frame as f64 / frames.max(1) as f64 * std::f64::consts::TAU;
        let position = DVec3::new(angle.cos(), 0.0, angle.sin()) * radius;
        let heading = DVec3::new(-angle.sin(), 0.0, angle.cos());
        let viewer = Viewer::look_at(ViewerId(0), position, position + heading, DVec3::Y, 70.0, 16.0 / 9.0, 5000.0);

        let stats = engine.update(&[viewer]);
        peak_particles = peak_particles.max(stats.particles);
        if frame % 60 == 0 {
            log::info!("Frame {}: {} chunks, {} particles, pool {}/{} free, {} skipped",
                frame, stats.current, stats.particles, stats.free, stats.total, stats.skipped);
        }
        engine.pack(frame as f64 / 60.0);
    }

    let elapsed = start.elapsed();
    log::info!("{} frames in {:.2?} ({:.3} ms/frame), peak {} particles",
        frames, elapsed, elapsed.as_secs_f64() * 1000.0 / frames.max(1) as f64, peak_particles);

    Ok(())
}
