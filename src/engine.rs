//! Ring engine: the per-instance context that owns all streaming state.
//!
//! A frame runs as one background job on the engine's own rayon pool, so
//! driving the engine from inside another rayon pool cannot starve it.
//! `dispatch` moves
//! the chunk state into that job and returns; the state comes back through a
//! channel when the job finishes. Every call that reads chunks (`pack`,
//! `advance_search`, particle handles) and the next `dispatch` block on that
//! job first, so at most one frame is ever in flight and nothing observes the
//! chunk maps mid-update.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, SyncSender};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::core::types::{DMat4, DVec3};
use crate::core::{RollTracker, Viewer};
use crate::query::{SearchResult, SearchScanner, resolve_particle};
use crate::render::{InstanceBuffer, PackView};
use crate::ring::{DensitySampler, RingConfig, RingProfile};
use crate::streaming::{FieldState, FrameContext, FrameStats, LocalView, ParticleCoord, run_frame};

type FrameResult = (FieldState, FrameStats);

pub struct RingEngine {
    config: RingConfig,
    context: Arc<FrameContext>,
    local_to_world: DMat4,
    world_to_local: DMat4,
    /// `None` only while a frame is in flight
    state: Option<FieldState>,
    in_flight: Option<Receiver<FrameResult>>,
    stats: FrameStats,
    frame: u64,
    rolls: RollTracker,
    /// Viewers of the last dispatched frame, in ring-local space
    views: Vec<PackView>,
    search: Option<SearchScanner>,
    instances: InstanceBuffer,
    /// Frame workers; `None` runs frames inline on the caller
    workers: Option<ThreadPool>,
}

/// Run one frame and hand the result back. A panicking frame sends nothing,
/// which `join` sees as a closed channel.
fn run_guarded(tx: SyncSender<FrameResult>, frame: u64, job: impl FnOnce() -> FrameResult) {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        // Receiver gone means the engine was dropped; nothing to report to.
        Ok(result) => {
            let _ = tx.send(result);
        }
        Err(_) => log::error!("Ring frame {} panicked", frame),
    }
}

fn build_workers(threads: usize) -> Option<ThreadPool> {
    match ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("ringfield-{}", i))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            log::warn!("Ring frame pool unavailable ({}); frames will run on the caller", e);
            None
        }
    }
}

impl RingEngine {
    /// Create an engine with an identity ring transform.
    ///
    /// Invalid settings are logged and degrade the ring instead of failing.
    pub fn new(config: RingConfig, profile: RingProfile) -> Self {
        for problem in config.validate() {
            log::warn!("Ring config: {}", problem);
        }

        let sampler = DensitySampler::new(config.shape.clone(), profile);
        if sampler.is_degenerate() {
            log::warn!("Ring density is zero everywhere; nothing will spawn");
        }

        log::info!("Ring engine: {} octaves of {}m cells, quota {} samples/chunk, budget {}/frame, seed {}",
            config.streaming.octave_count(), config.streaming.cell_size,
            config.streaming.sample_quota(), config.streaming.spawn_budget, config.streaming.seed);

        let search = config.search.enabled.then(|| SearchScanner::new(config.search.clone()));
        let workers = build_workers(config.streaming.worker_threads);

        Self {
            context: Arc::new(FrameContext {
                streaming: config.streaming.clone(),
                sampler,
            }),
            state: Some(FieldState::new(&config)),
            config,
            local_to_world: DMat4::IDENTITY,
            world_to_local: DMat4::IDENTITY,
            in_flight: None,
            stats: FrameStats::default(),
            frame: 0,
            rolls: RollTracker::new(),
            views: Vec::new(),
            search,
            instances: InstanceBuffer::new(),
            workers,
        }
    }

    pub fn with_transform(mut self, local_to_world: DMat4) -> Self {
        self.set_transform(local_to_world);
        self
    }

    /// Place the ring in the world. A singular matrix is ignored.
    pub fn set_transform(&mut self, local_to_world: DMat4) {
        let det = local_to_world.determinant();
        if det == 0.0 || !det.is_finite() {
            log::warn!("Ignoring singular ring transform");
            return;
        }
        self.local_to_world = local_to_world;
        self.world_to_local = local_to_world.inverse();
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    pub fn local_to_world(&self) -> &DMat4 {
        &self.local_to_world
    }

    /// Frames dispatched so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start the next frame in the background. Blocks on the previous frame first.
    pub fn dispatch(&mut self, viewers: &[Viewer]) {
        self.join();

        let layer = self.config.render.layer;
        let active: Vec<Viewer> = viewers.iter().filter(|v| v.sees_layer(layer)).copied().collect();
        self.rolls.update(&active);

        self.views = active
            .iter()
            .map(|v| PackView {
                id: v.id,
                view: LocalView::from_viewer(v, &self.local_to_world, &self.world_to_local),
                roll: self.rolls.roll(v.id),
            })
            .collect();
        let local_views: Vec<LocalView> = self.views.iter().map(|pv| pv.view).collect();

        let mut state = self.take_state();
        let context = Arc::clone(&self.context);
        let frame = self.frame;
        let (tx, rx) = mpsc::sync_channel(1);

        let job = move || {
            run_guarded(tx, frame, move || {
                let stats = run_frame(&mut state, &context, &local_views, frame);
                (state, stats)
            });
        };
        match &self.workers {
            Some(workers) => workers.spawn(job),
            None => job(),
        }

        self.in_flight = Some(rx);
        self.frame += 1;
    }

    /// Wait for the in-flight frame, if any. Returns the latest frame's stats.
    pub fn join(&mut self) -> &FrameStats {
        if let Some(rx) = self.in_flight.take() {
            match rx.recv() {
                Ok((state, stats)) => {
                    self.state = Some(state);
                    self.stats = stats;
                }
                Err(_) => {
                    log::error!("Ring frame {} was lost; restarting from an empty field",
                        self.frame.saturating_sub(1));
                    self.state = Some(FieldState::new(&self.config));
                    self.stats = FrameStats::default();
                }
            }
        }
        &self.stats
    }

    /// Run one frame to completion
    pub fn update(&mut self, viewers: &[Viewer]) -> FrameStats {
        self.dispatch(viewers);
        self.join().clone()
    }

    /// Stats of the last completed frame (does not wait)
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Settled chunk state
    pub fn state(&mut self) -> &FieldState {
        self.join();
        self.state.get_or_insert_with(|| FieldState::new(&self.config))
    }

    fn take_state(&mut self) -> FieldState {
        match self.state.take() {
            Some(state) => state,
            None => FieldState::new(&self.config),
        }
    }

    /// Flatten current chunks for the rendering backend
    pub fn pack(&mut self, time: f64) -> &InstanceBuffer {
        self.join();
        let state = self.state.get_or_insert_with(|| FieldState::new(&self.config));
        self.instances.pack(state, &self.views, &self.config, time);
        &self.instances
    }

    /// Advance the proximity search around a world-space point.
    /// Empty when search is disabled.
    pub fn advance_search(&mut self, query: DVec3, time: f64) -> &[SearchResult] {
        self.join();
        let local = self.world_to_local.transform_point3(query);
        let state = self.state.get_or_insert_with(|| FieldState::new(&self.config));
        match self.search.as_mut() {
            Some(scanner) => scanner.advance(state, local, &self.config.drift, time),
            None => &[],
        }
    }

    /// World position of a particle at `time`, or `None` for a stale or hidden handle
    pub fn particle_position(&mut self, coord: ParticleCoord, time: f64) -> Option<DVec3> {
        let drift = self.config.drift.clone();
        let local = resolve_particle(self.state(), coord, &drift, time)?;
        Some(self.local_to_world.transform_point3(local))
    }

    pub fn hide_particle(&mut self, coord: ParticleCoord) -> bool {
        self.set_particle_visible(coord, false)
    }

    pub fn show_particle(&mut self, coord: ParticleCoord) -> bool {
        self.set_particle_visible(coord, true)
    }

    fn set_particle_visible(&mut self, coord: ParticleCoord, visible: bool) -> bool {
        self.join();
        let Some(state) = self.state.as_mut() else {
            return false;
        };
        let Some(id) = state.grid.get(&coord.chunk) else {
            return false;
        };
        state.pool.get_mut(id).is_some_and(|chunk| chunk.set_visible(coord.index, visible))
    }
}

impl Drop for RingEngine {
    fn drop(&mut self) {
        self.join();
    }
}
