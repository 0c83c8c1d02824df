//! Viewers observing the ring, and per-viewer state carried between frames

use std::collections::HashMap;

use crate::core::types::{DMat4, DVec3};
use crate::math::Frustum;

/// Stable identity of a viewer across frames
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewerId(pub u64);

/// A camera looking at the ring this frame, in world space
#[derive(Clone, Copy, Debug)]
pub struct Viewer {
    pub id: ViewerId,
    /// World position
    pub position: DVec3,
    /// World-space frustum planes
    pub frustum: Frustum,
    /// Unit view direction
    pub forward: DVec3,
    /// Unit up vector (roll reference)
    pub up: DVec3,
    /// Bitmask of render layers this viewer draws
    pub layer_mask: u32,
}

impl Viewer {
    /// Viewer with an explicit frustum, looking down -Z with all layers enabled
    pub fn new(id: ViewerId, position: DVec3, frustum: Frustum) -> Self {
        Self {
            id,
            position,
            frustum,
            forward: DVec3::NEG_Z,
            up: DVec3::Y,
            layer_mask: u32::MAX,
        }
    }

    /// Perspective viewer at `position` looking at `target`
    pub fn look_at(
        id: ViewerId,
        position: DVec3,
        target: DVec3,
        up: DVec3,
        fov_y_degrees: f64,
        aspect: f64,
        far: f64,
    ) -> Self {
        let view = DMat4::look_at_rh(position, target, up);
        let proj = DMat4::perspective_rh(fov_y_degrees.to_radians(), aspect, 0.1, far);
        let forward = (target - position).normalize_or_zero();
        let right = forward.cross(up).normalize_or_zero();

        Self {
            id,
            position,
            frustum: Frustum::from_view_projection(&(proj * view)),
            forward,
            up: right.cross(forward),
            layer_mask: u32::MAX,
        }
    }

    pub fn with_layer_mask(mut self, layer_mask: u32) -> Self {
        self.layer_mask = layer_mask;
        self
    }

    /// Whether this viewer draws objects on `layer`
    pub fn sees_layer(&self, layer: u8) -> bool {
        layer < 32 && self.layer_mask & (1 << layer) != 0
    }
}

#[derive(Clone, Copy, Debug)]
struct RollState {
    up: DVec3,
    roll: f64,
}

/// Accumulated camera roll per viewer.
///
/// Billboarded particles are oriented by this angle, so it has to change
/// continuously as a camera banks instead of snapping with its up vector.
#[derive(Debug, Default)]
pub struct RollTracker {
    states: HashMap<ViewerId, RollState>,
}

impl RollTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold this frame's viewers in. Viewers missing from `viewers` are forgotten.
    pub fn update(&mut self, viewers: &[Viewer]) {
        self.states.retain(|id, _| viewers.iter().any(|v| v.id == *id));

        for viewer in viewers {
            match self.states.get_mut(&viewer.id) {
                Some(state) => {
                    let delta = signed_roll(state.up, viewer.up, viewer.forward);
                    state.roll = (state.roll + delta).rem_euclid(std::f64::consts::TAU);
                    state.up = viewer.up;
                }
                None => {
                    self.states.insert(viewer.id, RollState { up: viewer.up, roll: 0.0 });
                }
            }
        }
    }

    /// Accumulated roll in radians, 0 for unknown viewers
    pub fn roll(&self, id: ViewerId) -> f64 {
        self.states.get(&id).map_or(0.0, |s| s.roll)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Signed angle from `from` to `to` around `axis`, both projected onto the
/// plane perpendicular to `axis`.
fn signed_roll(from: DVec3, to: DVec3, axis: DVec3) -> f64 {
    let axis = axis.normalize_or_zero();
    let a = from - axis * from.dot(axis);
    let b = to - axis * to.dot(axis);
    if a.length_squared() < 1e-12 || b.length_squared() < 1e-12 {
        return 0.0;
    }
    axis.dot(a.cross(b)).atan2(a.dot(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn viewer_with_up(id: u64, up: DVec3) -> Viewer {
        let mut v = Viewer::new(ViewerId(id), DVec3::ZERO, Frustum::new([crate::math::Plane::new(DVec3::X, 0.0); 6]));
        v.up = up;
        v
    }

    #[test]
    fn test_layer_mask() {
        let v = viewer_with_up(1, DVec3::Y).with_layer_mask(0b100);
        assert!(v.sees_layer(2));
        assert!(!v.sees_layer(0));
        assert!(!v.sees_layer(40));
    }

    #[test]
    fn test_look_at_basis() {
        let v = Viewer::look_at(ViewerId(0), DVec3::ZERO, DVec3::new(0.0, 0.0, -10.0), DVec3::Y, 60.0, 1.0, 1000.0);
        assert!((v.forward - DVec3::NEG_Z).length() < 1e-12);
        assert!((v.up - DVec3::Y).length() < 1e-12);
        assert!(v.frustum.contains_point(DVec3::new(0.0, 0.0, -5.0)));
        assert!(!v.frustum.contains_point(DVec3::new(0.0, 0.0, 5.0)));
    }

    #[test]
    fn test_roll_accumulates_around_forward() {
        let mut tracker = RollTracker::new();
        tracker.update(&[viewer_with_up(7, DVec3::Y)]);
        assert_eq!(tracker.roll(ViewerId(7)), 0.0);

        // Forward is -Z; turning up from +Y to +X is positive about -Z.
        tracker.update(&[viewer_with_up(7, DVec3::X)]);
        assert!((tracker.roll(ViewerId(7)) - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_absent_viewers_are_dropped() {
        let mut tracker = RollTracker::new();
        tracker.update(&[viewer_with_up(1, DVec3::Y), viewer_with_up(2, DVec3::Y)]);
        assert_eq!(tracker.len(), 2);

        tracker.update(&[viewer_with_up(2, DVec3::Y)]);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.roll(ViewerId(1)), 0.0);
    }
}
