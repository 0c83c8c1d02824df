//! Per-viewer cell selection: a 5×5×5 neighborhood per octave, frustum culled

use crate::core::types::{DMat4, DVec3};
use crate::core::Viewer;
use crate::math::Frustum;
use crate::ring::StreamingConfig;
use super::coord::ChunkCoord;

/// Cells on each side of the viewer's cell that are considered
pub const NEIGHBORHOOD_RADIUS: i64 = 2;

/// A viewer expressed in the ring's local frame
#[derive(Clone, Copy, Debug)]
pub struct LocalView {
    pub position: DVec3,
    pub frustum: Frustum,
}

impl LocalView {
    pub fn new(position: DVec3, frustum: Frustum) -> Self {
        Self { position, frustum }
    }

    pub fn from_viewer(viewer: &Viewer, local_to_world: &DMat4, world_to_local: &DMat4) -> Self {
        Self {
            position: world_to_local.transform_point3(viewer.position),
            frustum: viewer.frustum.to_local(local_to_world),
        }
    }

    /// The viewer's own cell at `octave`
    pub fn home_cell(&self, streaming: &StreamingConfig, octave: u8) -> ChunkCoord {
        ChunkCoord::from_local_pos(self.position, streaming.cell_size_at(octave), octave)
    }
}

/// Append every cell around `view` that survives frustum culling, octave by
/// octave. Appends nothing when the grid configuration is unusable.
pub fn select_visible(view: &LocalView, streaming: &StreamingConfig, out: &mut Vec<ChunkCoord>) {
    let r = NEIGHBORHOOD_RADIUS;
    for octave in 0..streaming.octave_count() {
        let cell_size = streaming.cell_size_at(octave);
        let home = view.home_cell(streaming, octave);

        for dx in -r..=r {
            for dy in -r..=r {
                for dz in -r..=r {
                    let coord = home.offset(dx, dy, dz);
                    if view.frustum.intersects_aabb(&coord.bounds(cell_size)) {
                        out.push(coord);
                    }
                }
            }
        }
    }
}

pub fn visible_cells(view: &LocalView, streaming: &StreamingConfig) -> Vec<ChunkCoord> {
    let mut out = Vec::new();
    select_visible(view, streaming, &mut out);
    out
}
