//! Rendering-side output: flattening current chunks for the particle draw

pub mod instance;

pub use instance::{
    GpuChunkDelta, GpuOctavePivot, GpuOctaveRange, GpuParticle, InstanceBuffer, PackView,
    RingParams, ViewerPacking, draw_batches, DRAW_BATCH_SIZE,
};
