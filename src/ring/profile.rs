//! Radial ring profile and the density function used for rejection sampling.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::types::{DVec3, Result};
use super::config::RingShape;

/// Two 1-D curves sampled uniformly over normalized radius [0, 1].
///
/// Supplied by the broader renderer; the arrays may differ in length.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RingProfile {
    /// Opacity by radius, values in [0, 1].
    pub opacity: Vec<f32>,
    /// Relative thickness by radius, values in [0, 1].
    pub thickness: Vec<f32>,
}

impl RingProfile {
    pub fn new(opacity: Vec<f32>, thickness: Vec<f32>) -> Self {
        Self { opacity, thickness }
    }

    /// Flat profile with `value` everywhere
    pub fn constant(value: f32, samples: usize) -> Self {
        Self {
            opacity: vec![value; samples],
            thickness: vec![value; samples],
        }
    }

    /// Load from a JSON file with `opacity` and `thickness` arrays
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn is_empty(&self) -> bool {
        self.opacity.is_empty() || self.thickness.is_empty()
    }
}

/// Piecewise-linear lookup at `t` in [0, 1], clamped at both ends.
/// Returns `None` for an empty curve.
pub fn sample_curve(samples: &[f32], t: f64) -> Option<f64> {
    match samples {
        [] => None,
        [only] => Some(f64::from(*only)),
        _ => {
            let last = samples.len() - 1;
            let x = t.clamp(0.0, 1.0) * last as f64;
            let i = (x.floor() as usize).min(last - 1);
            let frac = x - i as f64;
            let a = f64::from(samples[i]);
            let b = f64::from(samples[i + 1]);
            Some(a + (b - a) * frac)
        }
    }
}

/// Acceptance probability of a candidate particle at a ring-local position.
///
/// Pure and cheap to clone; shared read-only by the parallel spawn phase.
#[derive(Clone, Debug)]
pub struct DensitySampler {
    shape: RingShape,
    profile: RingProfile,
}

impl DensitySampler {
    pub fn new(shape: RingShape, profile: RingProfile) -> Self {
        Self { shape, profile }
    }

    pub fn shape(&self) -> &RingShape {
        &self.shape
    }

    pub fn profile(&self) -> &RingProfile {
        &self.profile
    }

    /// True when the configuration leaves nothing to sample.
    pub fn is_degenerate(&self) -> bool {
        self.profile.is_empty()
            || !(self.shape.outer_radius > self.shape.inner_radius)
            || !(self.shape.thickness > 0.0)
    }

    /// Radius normalized over [inner, outer], or `None` outside the annulus.
    pub fn normalized_radius(&self, local: DVec3) -> Option<f64> {
        let span = self.shape.outer_radius - self.shape.inner_radius;
        if !(span > 0.0) {
            return None;
        }
        let radius = (local.x * local.x + local.z * local.z).sqrt();
        let t = (radius - self.shape.inner_radius) / span;
        (0.0..=1.0).contains(&t).then_some(t)
    }

    /// Probability in [0, 1] of accepting a candidate at `local`.
    pub fn density(&self, local: DVec3) -> f32 {
        let Some(t) = self.normalized_radius(local) else {
            return 0.0;
        };
        let (Some(opacity), Some(thickness_curve)) = (
            sample_curve(&self.profile.opacity, t),
            sample_curve(&self.profile.thickness, t),
        ) else {
            return 0.0;
        };

        let squash = self.shape.squash.clamp(0.0, 1.0);
        let effective = self.shape.thickness * (1.0 - squash + squash * thickness_curve);
        if !(effective > 0.0) {
            return 0.0;
        }

        let height = (local.y.abs() / effective).clamp(0.0, 1.0);
        let vertical = (1.0 - height).powf(self.shape.weight_exponent);
        let probability = opacity * vertical;

        if probability.is_finite() {
            probability.clamp(0.0, 1.0) as f32
        } else {
            0.0
        }
    }
}
