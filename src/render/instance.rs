//! Instance buffer packing for the ring particle draw.
//!
//! Particles are uploaded once per frame as compact offsets inside their
//! cell. Each viewer additionally gets a per-chunk integer delta (cell index
//! relative to the viewer's own cell) and per-octave pivots holding the
//! camera-relative origin of that cell, so the vertex stage reconstructs
//!
//! ```text
//! view_pos = pivot[octave].origin + (delta + particle.position) * pivot[octave].cell_size
//! ```
//!
//! without ever touching a large absolute coordinate.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use crate::core::types::DVec3;
use crate::core::ViewerId;
use crate::ring::RingConfig;
use crate::streaming::{ChunkCoord, FieldState, LocalView, MAX_OCTAVES};

/// Instances per draw call
pub const DRAW_BATCH_SIZE: u32 = 4096;

/// One particle instance (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuParticle {
    /// Position inside the cell, [0, 1) per axis
    pub position: [f32; 3],
    /// 1-based index into the delta array; negative = hidden
    pub chunk: i32,
}

/// Cell offset of one chunk relative to the viewer's cell (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuChunkDelta {
    pub offset: [i32; 3],
    pub octave: u32,
}

/// Camera-relative origin of the viewer's cell at one octave (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuOctavePivot {
    pub origin: [f32; 3],
    pub cell_size: f32,
}

/// Per-octave sizing (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuOctaveRange {
    /// Billboard radius; doubles per octave
    pub particle_radius: f32,
    pub inv_cell_size: f32,
    pub _pad: [f32; 2],
}

/// Per-viewer uniform (32 bytes, 16-byte aligned)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RingParams {
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub drift_distance: f32,
    pub drift_speed: f32,
    // -- 16 bytes --
    pub time: f32,
    /// Accumulated camera roll (radians)
    pub roll: f32,
    pub particle_count: u32,
    pub octave_count: u32,
    // -- 16 bytes --
}

/// A viewer to pack for, already in ring-local space
#[derive(Clone, Copy, Debug)]
pub struct PackView {
    pub id: ViewerId,
    pub view: LocalView,
    pub roll: f64,
}

/// Everything one viewer's draw needs besides the shared particle buffer
#[derive(Clone, Debug)]
pub struct ViewerPacking {
    pub viewer: ViewerId,
    pub params: RingParams,
    pub pivots: [GpuOctavePivot; MAX_OCTAVES as usize],
    pub ranges: [GpuOctaveRange; MAX_OCTAVES as usize],
    /// Parallel to `InstanceBuffer::chunks`
    pub deltas: Vec<GpuChunkDelta>,
}

impl ViewerPacking {
    /// Instance ranges for this viewer's draw calls
    pub fn batches(&self) -> impl Iterator<Item = Range<u32>> {
        draw_batches(self.params.particle_count, DRAW_BATCH_SIZE)
    }
}

/// Flattened frame output for the rendering backend.
///
/// Reuses its allocations across frames.
#[derive(Debug, Default)]
pub struct InstanceBuffer {
    particles: Vec<GpuParticle>,
    chunks: Vec<ChunkCoord>,
    viewers: Vec<ViewerPacking>,
}

impl InstanceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the current chunk set
    pub fn pack(&mut self, state: &FieldState, views: &[PackView], config: &RingConfig, time: f64) {
        self.particles.clear();
        self.chunks.clear();
        self.viewers.clear();

        for (coord, id) in state.grid.iter() {
            let Some(chunk) = state.pool.get(id) else {
                continue;
            };
            self.chunks.push(coord);
            let slot = self.chunks.len() as i32;
            self.particles.extend(chunk.particles().iter().map(|p| GpuParticle {
                position: p.position.to_array(),
                chunk: if p.is_visible() { slot } else { -slot },
            }));
        }

        let streaming = &config.streaming;
        let octaves = streaming.octave_count();

        for pv in views {
            let mut pivots = [GpuOctavePivot::default(); MAX_OCTAVES as usize];
            let mut ranges = [GpuOctaveRange::default(); MAX_OCTAVES as usize];
            let mut homes = [ChunkCoord::UNSET; MAX_OCTAVES as usize];

            for octave in 0..octaves {
                let k = octave as usize;
                let cell_size = streaming.cell_size_at(octave);
                let home = pv.view.home_cell(streaming, octave);
                let origin = DVec3::new(home.x as f64, home.y as f64, home.z as f64) * cell_size
                    - pv.view.position;

                homes[k] = home;
                pivots[k] = GpuOctavePivot {
                    origin: origin.as_vec3().to_array(),
                    cell_size: cell_size as f32,
                };
                ranges[k] = GpuOctaveRange {
                    particle_radius: config.render.particle_radius * (1u32 << octave) as f32,
                    inv_cell_size: (1.0 / cell_size) as f32,
                    _pad: [0.0; 2],
                };
            }

            let deltas = self.chunks.iter().map(|coord| {
                let home = homes.get(coord.octave as usize).copied().unwrap_or(ChunkCoord::UNSET);
                GpuChunkDelta {
                    offset: [
                        saturate_i32(coord.x.wrapping_sub(home.x)),
                        saturate_i32(coord.y.wrapping_sub(home.y)),
                        saturate_i32(coord.z.wrapping_sub(home.z)),
                    ],
                    octave: u32::from(coord.octave),
                }
            }).collect();

            self.viewers.push(ViewerPacking {
                viewer: pv.id,
                params: RingParams {
                    inner_radius: config.shape.inner_radius as f32,
                    outer_radius: config.shape.outer_radius as f32,
                    drift_distance: config.drift.distance as f32,
                    drift_speed: config.drift.speed as f32,
                    time: time as f32,
                    roll: pv.roll as f32,
                    particle_count: self.particles.len() as u32,
                    octave_count: u32::from(octaves),
                },
                pivots,
                ranges,
                deltas,
            });
        }
    }

    pub fn particles(&self) -> &[GpuParticle] {
        &self.particles
    }

    pub fn particle_count(&self) -> u32 {
        self.particles.len() as u32
    }

    /// Chunks in packing order; `GpuParticle::chunk` indexes this (1-based)
    pub fn chunks(&self) -> &[ChunkCoord] {
        &self.chunks
    }

    pub fn viewers(&self) -> &[ViewerPacking] {
        &self.viewers
    }

    pub fn viewer(&self, id: ViewerId) -> Option<&ViewerPacking> {
        self.viewers.iter().find(|v| v.viewer == id)
    }
}

fn saturate_i32(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Split `count` instances into consecutive ranges of at most `batch`
pub fn draw_batches(count: u32, batch: u32) -> impl Iterator<Item = Range<u32>> {
    let batch = batch.max(1);
    (0..count.div_ceil(batch)).map(move |i| {
        let start = i * batch;
        start..(start + batch).min(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Frustum, Plane};
    use crate::ring::{DensitySampler, PoolConfig, RingProfile, RingShape, StreamingConfig};
    use crate::streaming::{FrameContext, ParticleCoord, run_frame, CELLS_PER_OCTAVE};

    fn open_frustum() -> Frustum {
        Frustum::new([Plane::new(DVec3::X, 1.0e15); 6])
    }

    fn config(cell_size: f64, octaves: u8) -> RingConfig {
        let mut config = RingConfig::default();
        config.shape = RingShape {
            inner_radius: 0.0,
            outer_radius: 1.0e12,
            thickness: 1.0e12,
            squash: 0.0,
            weight_exponent: 0.0,
        };
        config.streaming = StreamingConfig {
            cell_size,
            octaves,
            density: 4 * CELLS_PER_OCTAVE,
            spawn_budget: 1_000_000,
            seed: 77,
            worker_threads: 0,
            pool: PoolConfig { initial: 1024, low_water: 0, batch: 1, ceiling: 1024 },
        };
        config
    }

    fn generated(config: &RingConfig, view: LocalView) -> FieldState {
        let ctx = FrameContext {
            streaming: config.streaming.clone(),
            sampler: DensitySampler::new(config.shape.clone(), RingProfile::constant(1.0, 2)),
        };
        let mut state = FieldState::new(config);
        run_frame(&mut state, &ctx, &[view], 0);
        state
    }

    #[test]
    fn test_gpu_struct_sizes() {
        assert_eq!(std::mem::size_of::<GpuParticle>(), 16);
        assert_eq!(std::mem::size_of::<GpuChunkDelta>(), 16);
        assert_eq!(std::mem::size_of::<GpuOctavePivot>(), 16);
        assert_eq!(std::mem::size_of::<GpuOctaveRange>(), 16);
        assert_eq!(std::mem::size_of::<RingParams>(), 32);
        assert_eq!(std::mem::size_of::<RingParams>() % 16, 0);
    }

    #[test]
    fn test_bytemuck_cast() {
        let particles = [GpuParticle::zeroed(); 3];
        assert_eq!(bytemuck::cast_slice::<_, u8>(&particles).len(), 48);
    }

    #[test]
    fn test_draw_batches() {
        let batches: Vec<_> = draw_batches(10, 4).collect();
        assert_eq!(batches, vec![0..4, 4..8, 8..10]);
        assert_eq!(draw_batches(0, 4).count(), 0);
        assert_eq!(draw_batches(8, 4).count(), 2);
    }

    #[test]
    fn test_packs_every_particle_once() {
        let config = config(10.0, 2);
        let view = LocalView::new(DVec3::splat(3.0), open_frustum());
        let state = generated(&config, view);

        let mut buffer = InstanceBuffer::new();
        buffer.pack(&state, &[PackView { id: ViewerId(1), view, roll: 0.5 }], &config, 2.0);

        assert_eq!(buffer.particle_count() as usize, state.particle_count());
        assert_eq!(buffer.chunks().len(), 2 * CELLS_PER_OCTAVE as usize);
        let packing = buffer.viewer(ViewerId(1)).unwrap();
        assert_eq!(packing.deltas.len(), buffer.chunks().len());
        assert_eq!(packing.params.particle_count, buffer.particle_count());
        assert_eq!(packing.params.octave_count, 2);
        assert_eq!(packing.params.roll, 0.5);
        assert_eq!(packing.ranges[1].particle_radius, config.render.particle_radius * 2.0);
        assert!(packing.deltas.iter().all(|d| d.offset.iter().all(|o| (-2..=2).contains(o))));
    }

    #[test]
    fn test_hidden_particles_have_negative_chunk() {
        let config = config(10.0, 1);
        let view = LocalView::new(DVec3::splat(3.0), open_frustum());
        let mut state = generated(&config, view);

        let target = ParticleCoord::new(ChunkCoord::new(0, 0, 0, 0), 0);
        let id = state.grid.get(&target.chunk).unwrap();
        state.pool.get_mut(id).unwrap().set_visible(target.index, false);

        let mut buffer = InstanceBuffer::new();
        buffer.pack(&state, &[], &config, 0.0);

        let slot = buffer.chunks().iter().position(|c| *c == target.chunk).unwrap() as i32 + 1;
        let hidden: Vec<_> = buffer.particles().iter().filter(|p| p.chunk < 0).collect();
        assert_eq!(hidden.len(), 1);
        assert_eq!(hidden[0].chunk, -slot);
        assert!(buffer.viewers().is_empty());
    }

    #[test]
    fn test_camera_relative_reconstruction_at_planetary_scale() {
        let config = config(32.0, 3);
        let viewer_pos = DVec3::new(6.0e7 + 13.37, -2.5e6 + 0.25, 1.4e8 - 7.0);
        let view = LocalView::new(viewer_pos, open_frustum());
        let state = generated(&config, view);

        let mut buffer = InstanceBuffer::new();
        buffer.pack(&state, &[PackView { id: ViewerId(0), view, roll: 0.0 }], &config, 0.0);
        let packing = &buffer.viewers()[0];

        let mut checked = 0;
        for particle in buffer.particles() {
            let slot = (particle.chunk.unsigned_abs() - 1) as usize;
            let coord = buffer.chunks()[slot];
            let delta = packing.deltas[slot];
            let pivot = packing.pivots[delta.octave as usize];

            let offset = glam::Vec3::from_array(delta.offset.map(|o| o as f32));
            let unit = glam::Vec3::from_array(particle.position);
            let reconstructed = glam::Vec3::from_array(pivot.origin) + (offset + unit) * pivot.cell_size;

            let id = state.grid.get(&coord).unwrap();
            let bounds = *state.pool.get(id).unwrap().bounds();
            let exact = bounds.lerp_unit(unit.as_dvec3()) - viewer_pos;

            assert!((reconstructed.as_dvec3() - exact).length() < 1e-2);
            checked += 1;
        }
        assert!(checked > 0);
    }
}
