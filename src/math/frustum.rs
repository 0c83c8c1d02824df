//! View frustum for culling

use crate::core::types::{DVec3, DVec4, DMat4};
use super::aabb::Aabb;

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// Build from (a, b, c, d) coefficients, normalizing the normal.
    /// A zero normal is kept as-is; degenerate planes are the caller's problem.
    pub fn from_coefficients(coefficients: DVec4) -> Self {
        let normal = coefficients.truncate();
        let len = normal.length();
        if len > 0.0 {
            Self {
                normal: normal / len,
                distance: coefficients.w / len,
            }
        } else {
            Self {
                normal,
                distance: coefficients.w,
            }
        }
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }

    /// Re-express this plane in the frame mapped to world by `local_to_world`.
    ///
    /// Planes transform by the inverse-transpose of the point transform; for the
    /// world-to-local point map that is the transpose of `local_to_world`.
    pub fn to_local(&self, local_to_world: &DMat4) -> Plane {
        let world = self.normal.extend(self.distance);
        Plane::from_coefficients(local_to_world.transpose() * world)
    }
}

/// View frustum with 6 planes (Near, Far, Left, Right, Top, Bottom)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from view-projection matrix
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let m = vp.to_cols_array_2d();

        let row = |i: usize| DVec4::new(m[0][i], m[1][i], m[2][i], m[3][i]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        // glam projections map depth to [0, 1]
        let near = Plane::from_coefficients(r2);
        let far = Plane::from_coefficients(r3 - r2);
        let left = Plane::from_coefficients(r3 + r0);
        let right = Plane::from_coefficients(r3 - r0);
        let top = Plane::from_coefficients(r3 - r1);
        let bottom = Plane::from_coefficients(r3 + r1);

        Self {
            planes: [near, far, left, right, top, bottom],
        }
    }

    /// Same frustum expressed in the local frame of `local_to_world`
    pub fn to_local(&self, local_to_world: &DMat4) -> Frustum {
        Frustum {
            planes: self.planes.map(|p| p.to_local(local_to_world)),
        }
    }

    /// Check if point is inside frustum
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Check if AABB intersects frustum (conservative test)
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            // Corner furthest along the normal; if even that one is behind the
            // plane the whole box is outside.
            let p = DVec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );

            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}
