//! Coordinate → chunk maps, rebuilt every frame from the previous one

use std::collections::HashMap;

use super::chunk::{ChunkId, ChunkState};
use super::coord::ChunkCoord;
use super::pool::ChunkPool;

/// Current and stale chunk maps.
///
/// At the start of a frame every current chunk becomes stale. Cells selected
/// again move back to current with their particles intact; whatever is left
/// stale afterwards goes back to the pool.
#[derive(Debug, Default)]
pub struct ChunkGrid {
    current: HashMap<ChunkCoord, ChunkId>,
    stale: HashMap<ChunkCoord, ChunkId>,
}

impl ChunkGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Demote every current chunk to stale
    pub fn begin_frame(&mut self, pool: &mut ChunkPool) {
        debug_assert!(self.stale.is_empty(), "stale chunks leaked across frames");
        std::mem::swap(&mut self.current, &mut self.stale);
        for &id in self.stale.values() {
            if let Some(chunk) = pool.get_mut(id) {
                chunk.set_state(ChunkState::Stale);
            }
        }
    }

    /// Move `coord` from stale back to current. False if it was not stale.
    pub fn reclaim(&mut self, coord: ChunkCoord, pool: &mut ChunkPool) -> bool {
        match self.stale.remove(&coord) {
            Some(id) => {
                if let Some(chunk) = pool.get_mut(id) {
                    chunk.set_state(ChunkState::Current);
                }
                self.current.insert(coord, id);
                true
            }
            None => false,
        }
    }

    /// Register a freshly seeded chunk
    pub fn insert(&mut self, coord: ChunkCoord, id: ChunkId) {
        self.current.insert(coord, id);
    }

    /// Return every unreclaimed stale chunk to the pool
    pub fn recycle_stale(&mut self, pool: &mut ChunkPool) -> usize {
        let count = self.stale.len();
        for (_, id) in self.stale.drain() {
            pool.release(id);
        }
        count
    }

    pub fn get(&self, coord: &ChunkCoord) -> Option<ChunkId> {
        self.current.get(coord).copied()
    }

    pub fn contains(&self, coord: &ChunkCoord) -> bool {
        self.current.contains_key(coord)
    }

    /// Current chunks in map iteration order
    pub fn iter(&self) -> impl Iterator<Item = (ChunkCoord, ChunkId)> + '_ {
        self.current.iter().map(|(c, id)| (*c, *id))
    }

    /// Current coordinates in ascending order
    pub fn sorted_coords(&self) -> Vec<ChunkCoord> {
        let mut coords: Vec<_> = self.current.keys().copied().collect();
        coords.sort_unstable();
        coords
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn stale_len(&self) -> usize {
        self.stale.len()
    }
}
