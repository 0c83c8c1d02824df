//! The per-frame streaming pipeline.
//!
//! Phase 1 runs visibility selection for every viewer in parallel; it only
//! reads the grid configuration and produces candidate cells. Phase 2 is
//! single threaded and owns all structural mutation: claiming cells,
//! recycling stale chunks, pool top-up, then the (internally parallel) spawn
//! pass over disjoint chunks.

use std::collections::HashSet;

use rayon::prelude::*;

use crate::ring::{DensitySampler, RingConfig, StreamingConfig};
use super::coord::ChunkCoord;
use super::grid::ChunkGrid;
use super::pool::ChunkPool;
use super::spawn::{plan_spawn, run_spawn};
use super::visibility::{LocalView, visible_cells};

/// Upper bound on particle slots reserved per pooled chunk
const MAX_PREALLOCATED_PARTICLES: usize = 4096;

/// Everything the pipeline mutates. Moved into the background job while a
/// frame is in flight, so nothing else can observe it half-updated.
pub struct FieldState {
    pub pool: ChunkPool,
    pub grid: ChunkGrid,
}

impl FieldState {
    pub fn new(config: &RingConfig) -> Self {
        let capacity = (config.streaming.sample_quota() as usize).min(MAX_PREALLOCATED_PARTICLES);
        Self {
            pool: ChunkPool::new(&config.streaming.pool, capacity),
            grid: ChunkGrid::new(),
        }
    }

    /// Particles currently held by visible chunks
    pub fn particle_count(&self) -> usize {
        self.grid
            .iter()
            .filter_map(|(_, id)| self.pool.get(id))
            .map(|c| c.particles().len())
            .sum()
    }
}

/// Read-only inputs shared by every stage of a frame
#[derive(Clone, Debug)]
pub struct FrameContext {
    pub streaming: StreamingConfig,
    pub sampler: DensitySampler,
}

/// What one frame did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub viewers: usize,
    /// Distinct cells that passed culling
    pub cells_selected: usize,
    /// Chunks visible after the frame
    pub current: usize,
    /// Chunks carried over from last frame
    pub reused: usize,
    /// Chunks seeded for newly visible cells
    pub seeded: usize,
    /// Chunks returned to the pool
    pub recycled: usize,
    /// Cells left empty because the pool was dry
    pub skipped: usize,
    /// Records created by pool top-up
    pub allocated: usize,
    pub free: usize,
    pub total: usize,
    pub attempts: u64,
    pub accepted: u64,
    pub particles: usize,
}

/// Phase 1: candidate cells for every view, first claim wins
pub fn select_cells(views: &[LocalView], streaming: &StreamingConfig) -> Vec<ChunkCoord> {
    let per_view: Vec<Vec<ChunkCoord>> = views
        .par_iter()
        .map(|view| visible_cells(view, streaming))
        .collect();

    let mut seen = HashSet::new();
    per_view
        .into_iter()
        .flatten()
        .filter(|coord| seen.insert(*coord))
        .collect()
}

/// Run one complete frame over `state`
pub fn run_frame(state: &mut FieldState, ctx: &FrameContext, views: &[LocalView], frame: u64) -> FrameStats {
    let claims = select_cells(views, &ctx.streaming);
    let FieldState { pool, grid } = state;

    grid.begin_frame(pool);

    let mut misses = Vec::new();
    let mut reused = 0;
    for &coord in &claims {
        if grid.reclaim(coord, pool) {
            reused += 1;
        } else {
            misses.push(coord);
        }
    }

    let recycled = grid.recycle_stale(pool);

    let pool_config = &ctx.streaming.pool;
    let allocated = pool.top_up(pool_config.low_water.max(misses.len()), pool_config.batch);

    let mut seeded = 0;
    let mut skipped = 0;
    for coord in misses {
        let Some(id) = pool.pop() else {
            skipped += 1;
            continue;
        };
        if let Some(chunk) = pool.get_mut(id) {
            chunk.assign(coord, ctx.streaming.cell_size_at(coord.octave), ctx.streaming.seed);
        }
        grid.insert(coord, id);
        seeded += 1;
    }

    if skipped > 0 {
        if pool.at_ceiling() {
            log::warn!("Frame {}: chunk pool at its ceiling of {} records, {} cells left empty",
                frame, pool.ceiling(), skipped);
        } else {
            log::warn!("Frame {}: chunk pool exhausted at {} records, {} cells left empty",
                frame, pool.total(), skipped);
        }
    }

    // Sorted so the budget split does not depend on hash order
    let quota = ctx.streaming.sample_quota();
    let needs: Vec<_> = grid
        .sorted_coords()
        .iter()
        .filter_map(|coord| grid.get(coord))
        .filter_map(|id| pool.get(id).map(|c| (id, quota.saturating_sub(c.samples_drawn()))))
        .collect();
    let grants = plan_spawn(&needs, ctx.streaming.spawn_budget);
    let report = run_spawn(pool, &grants, &ctx.sampler);

    let stats = FrameStats {
        frame,
        viewers: views.len(),
        cells_selected: claims.len(),
        current: grid.len(),
        reused,
        seeded,
        recycled,
        skipped,
        allocated,
        free: pool.free_count(),
        total: pool.total(),
        attempts: report.attempts,
        accepted: report.accepted,
        particles: state.particle_count(),
    };

    log::debug!("Frame {}: {} current ({} reused, {} seeded, {} recycled), {} attempts -> {} accepted, {} particles",
        stats.frame, stats.current, stats.reused, stats.seeded, stats.recycled,
        stats.attempts, stats.accepted, stats.particles);

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DVec3;
    use crate::math::{Frustum, Plane};
    use crate::ring::{PoolConfig, RingProfile, RingShape};
    use crate::streaming::{ChunkState, CELLS_PER_OCTAVE};

    fn open_frustum() -> Frustum {
        Frustum::new([Plane::new(DVec3::X, 1.0e12); 6])
    }

    /// Slab ring around y = 0 that covers the whole neighborhood
    fn context(pool: PoolConfig, spawn_budget: u32) -> (RingConfig, FrameContext) {
        let mut config = RingConfig::default();
        config.shape = RingShape {
            inner_radius: 0.0,
            outer_radius: 1000.0,
            thickness: 10.0,
            squash: 0.0,
            weight_exponent: 1.0,
        };
        config.streaming = StreamingConfig {
            cell_size: 4.0,
            octaves: 1,
            density: 50 * CELLS_PER_OCTAVE,
            spawn_budget,
            seed: 1234,
            worker_threads: 0,
            pool,
        };
        let ctx = FrameContext {
            streaming: config.streaming.clone(),
            sampler: DensitySampler::new(config.shape.clone(), RingProfile::constant(1.0, 4)),
        };
        (config, ctx)
    }

    fn roomy_pool() -> PoolConfig {
        PoolConfig { initial: 256, low_water: 16, batch: 32, ceiling: 1024 }
    }

    fn view_at(x: f64) -> LocalView {
        LocalView::new(DVec3::new(x, 1.0, 1.0), open_frustum())
    }

    fn conserved(state: &FieldState) -> bool {
        state.grid.len() + state.grid.stale_len() + state.pool.free_count() == state.pool.total()
    }

    #[test]
    fn test_no_viewers_selects_nothing() {
        let (config, ctx) = context(roomy_pool(), 1000);
        let mut state = FieldState::new(&config);
        let stats = run_frame(&mut state, &ctx, &[], 0);
        assert_eq!(stats.current, 0);
        assert_eq!(stats.attempts, 0);
    }

    #[test]
    fn test_overlapping_viewers_claim_once() {
        let cells = select_cells(&[view_at(1.0), view_at(5.0)], &StreamingConfig {
            cell_size: 4.0,
            octaves: 1,
            ..Default::default()
        });
        // Home cells 0 and 1 along x: union spans 6 columns
        assert_eq!(cells.len(), 6 * 25);
        let unique: HashSet<_> = cells.iter().collect();
        assert_eq!(unique.len(), cells.len());
    }

    #[test]
    fn test_idempotent_reselection() {
        let (config, ctx) = context(roomy_pool(), 500);
        let mut state = FieldState::new(&config);
        run_frame(&mut state, &ctx, &[view_at(1.0)], 0);

        let snapshot = |state: &FieldState| -> Vec<_> {
            state.grid.sorted_coords().into_iter().map(|c| {
                let id = state.grid.get(&c).unwrap();
                (c, id, state.pool.get(id).unwrap().particles().to_vec())
            }).collect()
        };

        // Finish quotas, then compare two quiet frames
        for frame in 1..40 {
            run_frame(&mut state, &ctx, &[view_at(1.0)], frame);
        }
        let before = snapshot(&state);
        let stats = run_frame(&mut state, &ctx, &[view_at(1.0)], 40);
        assert_eq!(stats.reused, CELLS_PER_OCTAVE as usize);
        assert_eq!(stats.seeded, 0);
        assert_eq!(stats.attempts, 0);
        assert_eq!(snapshot(&state), before);
    }

    #[test]
    fn test_quota_monotonic_and_reset_on_recycle() {
        let (config, ctx) = context(roomy_pool(), 300);
        let mut state = FieldState::new(&config);
        let coord = ChunkCoord::new(-2, 0, 0, 0);

        let mut last = 0;
        for frame in 0..10 {
            run_frame(&mut state, &ctx, &[view_at(1.0)], frame);
            let id = state.grid.get(&coord).unwrap();
            let drawn = state.pool.get(id).unwrap().samples_drawn();
            assert!(drawn >= last);
            assert!(drawn <= ctx.streaming.sample_quota());
            last = drawn;
        }
        let id = state.grid.get(&coord).unwrap();

        // Move far enough that x = -2 drops out of the neighborhood
        run_frame(&mut state, &ctx, &[view_at(100.0)], 10);
        assert!(state.grid.get(&coord).is_none());
        let chunk = state.pool.get(id).unwrap();
        assert!(chunk.state() == ChunkState::Free || chunk.coord() != coord);
        if chunk.state() == ChunkState::Free {
            assert_eq!(chunk.samples_drawn(), 0);
        }
    }

    #[test]
    fn test_budget_respected_each_frame() {
        let (config, ctx) = context(roomy_pool(), 777);
        let mut state = FieldState::new(&config);
        for frame in 0..20 {
            let x = frame as f64 * 3.0;
            let stats = run_frame(&mut state, &ctx, &[view_at(x)], frame);
            assert!(stats.attempts <= 777);
            assert!(conserved(&state));
        }
    }

    #[test]
    fn test_pool_conservation_without_top_up() {
        let pool = PoolConfig { initial: 300, low_water: 0, batch: 1, ceiling: 300 };
        let (config, ctx) = context(pool, 1000);
        let mut state = FieldState::new(&config);
        for frame in 0..12 {
            let stats = run_frame(&mut state, &ctx, &[view_at(frame as f64 * 5.0)], frame);
            assert_eq!(stats.total, 300);
            assert_eq!(stats.allocated, 0);
            assert!(conserved(&state));
        }
    }

    #[test]
    fn test_dry_pool_skips_cells() {
        let pool = PoolConfig { initial: 10, low_water: 0, batch: 1, ceiling: 10 };
        let (config, ctx) = context(pool, 1000);
        let mut state = FieldState::new(&config);
        let stats = run_frame(&mut state, &ctx, &[view_at(1.0)], 0);
        assert_eq!(stats.current, 10);
        assert_eq!(stats.skipped, CELLS_PER_OCTAVE as usize - 10);
        assert!(state.pool.at_ceiling());
        assert_eq!(state.pool.ceiling(), stats.total);
        assert!(conserved(&state));
    }

    #[test]
    fn test_top_up_meets_demand() {
        let pool = PoolConfig { initial: 0, low_water: 8, batch: 16, ceiling: 1024 };
        let (config, ctx) = context(pool, 1000);
        let mut state = FieldState::new(&config);
        let stats = run_frame(&mut state, &ctx, &[view_at(1.0)], 0);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.current, CELLS_PER_OCTAVE as usize);
        assert_eq!(stats.allocated, 128);
    }

    #[test]
    fn test_chunk_particles_independent_of_neighbors() {
        // Same cell generated alone and alongside many others, with the same
        // per-frame attempt counts, must hold the same particles.
        let target = ChunkCoord::new(0, 0, 0, 0);
        let (config, ctx) = context(roomy_pool(), 1_000_000);

        let mut crowded = FieldState::new(&config);
        run_frame(&mut crowded, &ctx, &[view_at(1.0)], 0);

        let mut frustum = open_frustum();
        // Keep only cells with 0 <= x < 4, 0 <= y < 4, 0 <= z < 4
        frustum.planes[0] = Plane::new(DVec3::X, -0.5);
        frustum.planes[1] = Plane::new(DVec3::NEG_X, 3.5);
        frustum.planes[2] = Plane::new(DVec3::Y, -0.5);
        frustum.planes[3] = Plane::new(DVec3::NEG_Y, 3.5);
        frustum.planes[4] = Plane::new(DVec3::Z, -0.5);
        frustum.planes[5] = Plane::new(DVec3::NEG_Z, 3.5);
        let mut alone = FieldState::new(&config);
        let stats = run_frame(&mut alone, &ctx, &[LocalView::new(DVec3::splat(1.0), frustum)], 0);
        assert_eq!(stats.current, 1);

        let particles = |state: &FieldState| {
            let id = state.grid.get(&target).unwrap();
            state.pool.get(id).unwrap().particles().iter().map(|p| p.position).collect::<Vec<_>>()
        };
        assert!(!particles(&alone).is_empty());
        assert_eq!(particles(&alone), particles(&crowded));
    }
}
