//! Real-time blur built from chained resampling passes on the GPU.
//!
//! Two engines share one recording abstraction:
//!
//! - [`PyramidBlurEngine`] — large-radius blur via a mip-style pyramid:
//!   a downsample chain of halved-resolution targets, then a widened
//!   tent/box upsample chain that folds each level back in. A continuous
//!   `diffusion` knob in `[0, 10]` selects pyramid depth and a fractional
//!   sample widening so the radius animates without stepping.
//! - [`CascadeDownsampler`] — a cheaper one-directional cascade of
//!   fixed-kernel compute downsamples approximating a Gaussian at a
//!   requested blur resolution.
//!
//! Both record passes through the [`BlurContext`] trait into a
//! caller-owned command encoder; [`gpu::WgpuBlurContext`] is the wgpu
//! backing, and tests substitute a recording mock. Scratch targets come
//! from a [`TexturePool`] keyed by size and format, and every target an
//! engine acquires is released before its record call returns.

pub mod cascade;
pub mod gpu;
pub mod pass;
pub mod pool;
pub mod pyramid;
pub mod settings;
pub mod sizing;
pub mod validation;
pub mod wgsl;

pub use cascade::CascadeDownsampler;
pub use gpu::{BlurPipelines, ExternalImage, WgpuBlurContext};
pub use pass::{Blur, BlurContext, BlurPhase, ImageRef};
pub use pool::{ResourceName, TargetDesc, TargetId, TargetPool, TexturePool};
pub use pyramid::PyramidBlurEngine;
pub use settings::BlurSettings;
pub use sizing::{CascadePlan, IterationPlan, MAX_PYRAMID_LEVELS};
