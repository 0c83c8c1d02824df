//! Amortized proximity search.
//!
//! The scanner never looks at more than `speed` new particles per frame. It
//! walks current chunks in coordinate order, resuming where it stopped last
//! frame, so a particle entering the query radius is found within about
//! `total_particles / speed` frames while per-frame cost stays flat.

use std::collections::HashSet;

use crate::core::types::DVec3;
use crate::ring::{DriftConfig, SearchConfig, drift_offset};
use crate::streaming::{ChunkCoord, FieldState, ParticleCoord};

/// Scan position, persisted across frames
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchCursor {
    pub chunk: ChunkCoord,
    pub index: u32,
}

impl SearchCursor {
    pub const UNSET: SearchCursor = SearchCursor { chunk: ChunkCoord::UNSET, index: 0 };

    pub fn is_unset(&self) -> bool {
        self.chunk.is_unset()
    }
}

impl Default for SearchCursor {
    fn default() -> Self {
        Self::UNSET
    }
}

/// A particle found within the query radius
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchResult {
    pub coord: ParticleCoord,
    /// Ring-local position including drift, as of the last validation
    pub position: DVec3,
}

/// Ring-local position of a live, visible particle at `time`.
/// `None` if the chunk is gone, the index is out of range, or it is hidden.
pub fn resolve_particle(
    state: &FieldState,
    coord: ParticleCoord,
    drift: &DriftConfig,
    time: f64,
) -> Option<DVec3> {
    let chunk = state.pool.get(state.grid.get(&coord.chunk)?)?;
    let particle = chunk.particles().get(coord.index as usize)?;
    if !particle.is_visible() {
        return None;
    }
    let base = chunk.bounds().lerp_unit(particle.position.as_dvec3());
    Some(base + drift_offset(particle.position, drift, time))
}

pub struct SearchScanner {
    config: SearchConfig,
    cursor: SearchCursor,
    /// Last chunk finished; the next scan starts after it
    resume_after: Option<ChunkCoord>,
    results: Vec<SearchResult>,
}

impl SearchScanner {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            results: Vec::with_capacity(config.capacity),
            config,
            cursor: SearchCursor::UNSET,
            resume_after: None,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn cursor(&self) -> SearchCursor {
        self.cursor
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    /// Forget results and restart the scan
    pub fn reset(&mut self) {
        self.results.clear();
        self.cursor = SearchCursor::UNSET;
        self.resume_after = None;
    }

    /// Advance one frame around `query` (ring-local). Returns the current results.
    pub fn advance(
        &mut self,
        state: &FieldState,
        query: DVec3,
        drift: &DriftConfig,
        time: f64,
    ) -> &[SearchResult] {
        let radius_sq = self.config.radius * self.config.radius;
        let within = |p: DVec3| p.distance_squared(query) <= radius_sq;

        // Re-validate what we already hold
        self.results.retain_mut(|result| {
            match resolve_particle(state, result.coord, drift, time) {
                Some(position) if within(position) => {
                    result.position = position;
                    true
                }
                _ => false,
            }
        });

        if !self.config.enabled || self.results.len() >= self.config.capacity {
            return &self.results;
        }

        let order = state.grid.sorted_coords();
        if order.is_empty() {
            self.cursor = SearchCursor::UNSET;
            return &self.results;
        }

        if !self.cursor.is_unset() && !state.grid.contains(&self.cursor.chunk) {
            // Chunk vanished under the cursor
            self.resume_after = Some(self.cursor.chunk);
            self.cursor = SearchCursor::UNSET;
        }
        if self.cursor.is_unset() {
            self.cursor = SearchCursor { chunk: next_after(&order, self.resume_after), index: 0 };
        }

        let known: HashSet<ParticleCoord> = self.results.iter().map(|r| r.coord).collect();
        let mut budget = self.config.speed;
        let mut finished = 0;

        loop {
            let Some(chunk) = state.grid.get(&self.cursor.chunk).and_then(|id| state.pool.get(id)) else {
                self.cursor = SearchCursor::UNSET;
                break;
            };
            let particles = chunk.particles();

            while (self.cursor.index as usize) < particles.len()
                && budget > 0
                && self.results.len() < self.config.capacity
            {
                let coord = ParticleCoord::new(self.cursor.chunk, self.cursor.index);
                self.cursor.index += 1;
                if known.contains(&coord) {
                    continue;
                }
                budget -= 1;

                let particle = &particles[coord.index as usize];
                if !particle.is_visible() {
                    continue;
                }
                let position = chunk.bounds().lerp_unit(particle.position.as_dvec3())
                    + drift_offset(particle.position, drift, time);
                if within(position) {
                    self.results.push(SearchResult { coord, position });
                }
            }

            if (self.cursor.index as usize) < particles.len() {
                // Out of budget or capacity mid-chunk
                break;
            }

            self.resume_after = Some(self.cursor.chunk);
            self.cursor = SearchCursor::UNSET;
            finished += 1;
            if budget == 0 || self.results.len() >= self.config.capacity || finished >= order.len() {
                break;
            }
            self.cursor = SearchCursor { chunk: next_after(&order, self.resume_after), index: 0 };
        }

        &self.results
    }
}

/// First coordinate strictly after `after`, wrapping; the first one if `None`
fn next_after(order: &[ChunkCoord], after: Option<ChunkCoord>) -> ChunkCoord {
    let start = after.map_or(0, |a| order.partition_point(|c| *c <= a));
    order[start % order.len()]
}
