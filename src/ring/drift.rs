//! Deterministic per-particle drift.
//!
//! The vertex stage applies the same offset, so anything that resolves a
//! particle's position on the CPU (search, handle lookups) must go through
//! `drift_offset` to agree with what is drawn.

use std::f64::consts::TAU;

use crate::core::types::{DVec3, Vec3};
use super::config::DriftConfig;

/// Integer hash producing a value in [0, 1].
fn hash_unit(mut h: u32) -> f64 {
    h = h.wrapping_mul(374761393);
    h = (h ^ (h >> 13)).wrapping_mul(1103515245);
    h ^= h >> 16;
    f64::from(h & 0x7FFF_FFFF) / f64::from(0x7FFF_FFFF_u32)
}

/// Three phases derived from the particle's spawn position.
fn phases(unit: Vec3) -> [f64; 3] {
    let [x, y, z] = unit.to_array().map(f32::to_bits);
    [
        hash_unit(x ^ y.rotate_left(11) ^ z.rotate_left(22)) * TAU,
        hash_unit(y ^ z.rotate_left(11) ^ x.rotate_left(22)) * TAU,
        hash_unit(z ^ x.rotate_left(11) ^ y.rotate_left(22)) * TAU,
    ]
}

/// Offset of a particle spawned at `unit` (position within its chunk) at `time`.
pub fn drift_offset(unit: Vec3, drift: &DriftConfig, time: f64) -> DVec3 {
    if drift.distance == 0.0 {
        return DVec3::ZERO;
    }
    let [px, py, pz] = phases(unit);
    let angle = time * drift.speed;
    DVec3::new(
        (angle + px).sin(),
        (angle * 0.5 + py).sin() * 0.25,
        (angle + pz).cos(),
    ) * drift.distance
}
