//! Grid cell and particle addressing

use crate::core::types::DVec3;
use crate::math::Aabb;

/// Octave value reserved for "no chunk".
pub const UNSET_OCTAVE: u8 = 255;

/// One grid cell at one octave. Octave `k` cells are `cell_size * 2^k` wide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i64,
    pub y: i64,
    pub z: i64,
    pub octave: u8,
}

impl ChunkCoord {
    /// Sentinel used by cursors that are not pointing at any chunk
    pub const UNSET: ChunkCoord = ChunkCoord { x: 0, y: 0, z: 0, octave: UNSET_OCTAVE };

    pub const fn new(x: i64, y: i64, z: i64, octave: u8) -> Self {
        Self { x, y, z, octave }
    }

    pub fn is_unset(&self) -> bool {
        self.octave == UNSET_OCTAVE
    }

    /// Cell containing a ring-local position (floor division)
    pub fn from_local_pos(pos: DVec3, cell_size: f64, octave: u8) -> Self {
        let cell = (pos / cell_size).floor();
        Self::new(cell.x as i64, cell.y as i64, cell.z as i64, octave)
    }

    /// Neighbor at an integer offset on the same octave
    pub fn offset(&self, dx: i64, dy: i64, dz: i64) -> Self {
        Self::new(
            self.x.wrapping_add(dx),
            self.y.wrapping_add(dy),
            self.z.wrapping_add(dz),
            self.octave,
        )
    }

    /// Local-space bounds for cells of edge `cell_size`
    pub fn bounds(&self, cell_size: f64) -> Aabb {
        Aabb::from_cell([self.x, self.y, self.z], cell_size)
    }

    /// Per-chunk RNG seed. Depends only on the global seed and this coordinate.
    pub fn seed(&self, global_seed: u64) -> u64 {
        let mut h = splitmix64(global_seed);
        for v in [self.x as u64, self.y as u64, self.z as u64, u64::from(self.octave)] {
            h = splitmix64(h ^ v);
        }
        h
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Stable handle to one particle, valid while its chunk stays current.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleCoord {
    pub chunk: ChunkCoord,
    pub index: u32,
}

impl ParticleCoord {
    pub const fn new(chunk: ChunkCoord, index: u32) -> Self {
        Self { chunk, index }
    }
}
