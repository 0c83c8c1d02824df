//! Spawn sampling: spreads a per-frame attempt budget over chunks still
//! short of their quota, then runs rejection sampling in parallel.
//!
//! Each chunk draws from its own RNG, so the particles a chunk ends up with
//! depend only on its seed and on how many attempts it was granted each
//! frame, not on which thread ran it or what else was in flight.

use rayon::prelude::*;

use crate::ring::DensitySampler;
use super::chunk::ChunkId;
use super::pool::ChunkPool;

/// Attempts granted to one chunk this frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpawnGrant {
    pub chunk: ChunkId,
    pub attempts: u32,
}

/// Outcome of one spawn pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpawnReport {
    pub attempts: u64,
    pub accepted: u64,
}

/// Divide `budget` attempts over `needs` (chunk, outstanding quota) pairs.
///
/// Every needy chunk is offered `ceil(outstanding * budget / total)`, at least
/// one and at most its outstanding count. Grants are issued in the order given
/// and stop once the budget is spent, so the sum never exceeds `budget`.
pub fn plan_spawn(needs: &[(ChunkId, u32)], budget: u32) -> Vec<SpawnGrant> {
    let total: u64 = needs.iter().map(|&(_, n)| u64::from(n)).sum();
    if total == 0 || budget == 0 {
        return Vec::new();
    }

    let scale = f64::from(budget) / total as f64;
    let mut issued: u32 = 0;
    let mut grants = Vec::with_capacity(needs.len());

    for &(chunk, outstanding) in needs {
        if outstanding == 0 {
            continue;
        }
        let share = (f64::from(outstanding) * scale).ceil() as u32;
        let attempts = share.clamp(1, outstanding).min(budget - issued);
        if attempts == 0 {
            break;
        }
        issued += attempts;
        grants.push(SpawnGrant { chunk, attempts });
    }

    grants
}

/// Execute grants against the pool, one rayon task per chunk
pub fn run_spawn(pool: &mut ChunkPool, grants: &[SpawnGrant], sampler: &DensitySampler) -> SpawnReport {
    if grants.is_empty() {
        return SpawnReport::default();
    }

    let mut attempts_by_id = vec![0u32; pool.total()];
    for grant in grants {
        if let Some(slot) = attempts_by_id.get_mut(grant.chunk.index()) {
            *slot += grant.attempts;
        }
    }

    let accepted = pool
        .chunks_mut()
        .par_iter_mut()
        .zip(attempts_by_id.par_iter())
        .filter(|(_, attempts)| **attempts > 0)
        .map(|(chunk, &attempts)| u64::from(chunk.draw_samples(attempts, sampler)))
        .sum::<u64>();

    SpawnReport {
        attempts: grants.iter().map(|g| u64::from(g.attempts)).sum(),
        accepted,
    }
}
