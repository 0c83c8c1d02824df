//! Axis-aligned bounding box in ring-local space

use crate::core::types::DVec3;

/// Axis-aligned bounding box defined by min and max corners
///
/// Double precision: chunk bounds at planetary radii lose whole meters in f32.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Bounds of the grid cell `index` for cells of edge `cell_size`
    pub fn from_cell(index: [i64; 3], cell_size: f64) -> Self {
        let min = DVec3::new(
            index[0] as f64 * cell_size,
            index[1] as f64 * cell_size,
            index[2] as f64 * cell_size,
        );
        Self {
            min,
            max: min + DVec3::splat(cell_size),
        }
    }

    /// Get size (max - min)
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Map a point in the unit cube onto this box
    pub fn lerp_unit(&self, unit: DVec3) -> DVec3 {
        self.min + unit * self.size()
    }
}
