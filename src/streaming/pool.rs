//! Chunk pool: an arena of chunk records addressed by stable `ChunkId`.
//!
//! Records are only ever allocated here (initial fill and top-ups) and are
//! never freed; recycling returns them to the free list with their particle
//! storage intact.

use crate::ring::PoolConfig;
use super::chunk::{Chunk, ChunkId, ChunkState};

pub struct ChunkPool {
    /// All records ever allocated, indexed by `ChunkId`
    chunks: Vec<Chunk>,
    /// Ids of records in `ChunkState::Free`
    free: Vec<ChunkId>,
    /// Particle slots preallocated per record
    particle_capacity: usize,
    /// Hard limit on `chunks.len()`
    ceiling: usize,
}

impl ChunkPool {
    /// Create a pool holding `config.initial` records (bounded by the ceiling)
    pub fn new(config: &PoolConfig, particle_capacity: usize) -> Self {
        let mut pool = Self {
            chunks: Vec::new(),
            free: Vec::new(),
            particle_capacity,
            ceiling: config.ceiling,
        };
        pool.allocate(config.initial);
        pool
    }

    /// Allocate up to `count` new records, never exceeding the ceiling.
    /// Returns how many were created.
    fn allocate(&mut self, count: usize) -> usize {
        let count = count.min(self.ceiling.saturating_sub(self.chunks.len()));
        self.chunks.reserve(count);
        self.free.reserve(count);
        for _ in 0..count {
            let id = ChunkId(self.chunks.len() as u32);
            self.chunks.push(Chunk::new(id, self.particle_capacity));
            self.free.push(id);
        }
        count
    }

    /// Refill in `batch`-sized steps until at least `target` records are free
    /// or the ceiling is reached. Returns how many were created.
    pub fn top_up(&mut self, target: usize, batch: usize) -> usize {
        let batch = batch.max(1);
        let mut created = 0;
        while self.free.len() < target {
            let n = self.allocate(batch);
            if n == 0 {
                break;
            }
            created += n;
        }
        if created > 0 {
            log::trace!("Chunk pool topped up by {} (total {}, free {})",
                created, self.chunks.len(), self.free.len());
        }
        created
    }

    /// Take a free record, or `None` when the pool is dry
    pub fn pop(&mut self) -> Option<ChunkId> {
        self.free.pop()
    }

    /// Clear a record and return it to the free list
    pub fn release(&mut self, id: ChunkId) {
        if let Some(chunk) = self.chunks.get_mut(id.index()) {
            debug_assert_ne!(chunk.state(), ChunkState::Free, "double release of {id:?}");
            chunk.recycle();
            self.free.push(id);
        }
    }

    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(id.index())
    }

    pub fn get_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.chunks.get_mut(id.index())
    }

    /// All records, indexed by id
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub(crate) fn chunks_mut(&mut self) -> &mut [Chunk] {
        &mut self.chunks
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Records ever allocated
    pub fn total(&self) -> usize {
        self.chunks.len()
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn at_ceiling(&self) -> bool {
        self.chunks.len() >= self.ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::ChunkCoord;

    fn config(initial: usize, ceiling: usize) -> PoolConfig {
        PoolConfig { initial, low_water: 2, batch: 4, ceiling }
    }

    #[test]
    fn test_initial_fill_respects_ceiling() {
        let pool = ChunkPool::new(&config(10, 6), 8);
        assert_eq!(pool.total(), 6);
        assert_eq!(pool.free_count(), 6);
        assert!(pool.at_ceiling());
    }

    #[test]
    fn test_pop_until_dry() {
        let mut pool = ChunkPool::new(&config(2, 10), 8);
        assert!(pool.pop().is_some());
        assert!(pool.pop().is_some());
        assert!(pool.pop().is_none());
    }

    #[test]
    fn test_top_up_in_batches_until_target() {
        let mut pool = ChunkPool::new(&config(0, 100), 8);
        assert_eq!(pool.top_up(10, 4), 12);
        assert_eq!(pool.free_count(), 12);
        // Already above target
        assert_eq!(pool.top_up(10, 4), 0);
    }

    #[test]
    fn test_top_up_stops_at_ceiling() {
        let mut pool = ChunkPool::new(&config(0, 5), 8);
        assert_eq!(pool.top_up(50, 4), 5);
        assert_eq!(pool.total(), 5);
    }

    #[test]
    fn test_release_recycles_record() {
        let mut pool = ChunkPool::new(&config(1, 1), 8);
        let id = pool.pop().unwrap();
        pool.get_mut(id).unwrap().assign(ChunkCoord::new(1, 2, 3, 0), 4.0, 9);
        assert_eq!(pool.get(id).unwrap().state(), ChunkState::Current);

        pool.release(id);
        assert_eq!(pool.free_count(), 1);
        let chunk = pool.get(id).unwrap();
        assert_eq!(chunk.state(), ChunkState::Free);
        assert_eq!(chunk.samples_drawn(), 0);
        assert!(chunk.coord().is_unset());
    }
}
