//! Chunk records: one cell's generated particles plus its private RNG

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::core::types::Vec3;
use crate::math::Aabb;
use crate::ring::DensitySampler;
use super::coord::ChunkCoord;

/// Stable index of a chunk record inside the pool
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(pub u32);

impl ChunkId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which set currently owns a chunk record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    /// Parked in the pool, empty
    Free,
    /// Visible this frame
    Current,
    /// Visible last frame, not yet reclaimed this frame
    Stale,
}

/// A generated particle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    /// Position inside the chunk's cell, each axis in [0, 1)
    pub position: Vec3,
    /// Owning chunk's tag; negative when the particle is hidden
    pub tag: i32,
}

impl Particle {
    pub fn is_visible(&self) -> bool {
        self.tag > 0
    }
}

/// Reusable record for one cubical cell.
///
/// `samples_drawn` counts rejection-sampling attempts, accepted or not, so a
/// cell with a low acceptance rate still finishes its quota.
#[derive(Debug)]
pub struct Chunk {
    id: ChunkId,
    state: ChunkState,
    coord: ChunkCoord,
    bounds: Aabb,
    rng: ChaCha8Rng,
    samples_drawn: u32,
    particles: Vec<Particle>,
}

impl Chunk {
    pub(crate) fn new(id: ChunkId, particle_capacity: usize) -> Self {
        Self {
            id,
            state: ChunkState::Free,
            coord: ChunkCoord::UNSET,
            bounds: Aabb::default(),
            rng: ChaCha8Rng::seed_from_u64(0),
            samples_drawn: 0,
            particles: Vec::with_capacity(particle_capacity),
        }
    }

    /// Take ownership of a cell: reseed and mark current.
    pub(crate) fn assign(&mut self, coord: ChunkCoord, cell_size: f64, global_seed: u64) {
        debug_assert_eq!(self.state, ChunkState::Free);
        debug_assert!(self.particles.is_empty() && self.samples_drawn == 0);
        self.coord = coord;
        self.bounds = coord.bounds(cell_size);
        self.rng = ChaCha8Rng::seed_from_u64(coord.seed(global_seed));
        self.state = ChunkState::Current;
    }

    /// Empty the record for reuse. Keeps the particle allocation.
    pub(crate) fn recycle(&mut self) {
        self.particles.clear();
        self.samples_drawn = 0;
        self.coord = ChunkCoord::UNSET;
        self.state = ChunkState::Free;
    }

    pub(crate) fn set_state(&mut self, state: ChunkState) {
        self.state = state;
    }

    /// Run `attempts` rejection-sampling draws from this chunk's own stream.
    /// Returns how many were accepted.
    pub fn draw_samples(&mut self, attempts: u32, sampler: &DensitySampler) -> u32 {
        let tag = self.tag();
        let mut accepted = 0;
        for _ in 0..attempts {
            let unit = Vec3::new(self.rng.random(), self.rng.random(), self.rng.random());
            let probability = sampler.density(self.bounds.lerp_unit(unit.as_dvec3()));
            let roll: f32 = self.rng.random();
            if roll < probability {
                self.particles.push(Particle { position: unit, tag });
                accepted += 1;
            }
        }
        self.samples_drawn = self.samples_drawn.saturating_add(attempts);
        accepted
    }

    /// Show or hide a particle. False if `index` is out of range.
    pub fn set_visible(&mut self, index: u32, visible: bool) -> bool {
        match self.particles.get_mut(index as usize) {
            Some(p) => {
                p.tag = if visible { p.tag.abs() } else { -p.tag.abs() };
                true
            }
            None => false,
        }
    }

    /// Positive tag identifying this record
    pub fn tag(&self) -> i32 {
        self.id.0 as i32 + 1
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn samples_drawn(&self) -> u32 {
        self.samples_drawn
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particle_capacity(&self) -> usize {
        self.particles.capacity()
    }
}
