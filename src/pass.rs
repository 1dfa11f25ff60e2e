//! Pass selection and the recording seam between the blur algorithms and
//! the GPU backend.

use anyhow::Result;

use crate::pool::{TargetDesc, TargetId};

/// The four selectable fragment passes of the blur program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurPhase {
    /// High-quality 13-tap box downsample.
    Downsample13,
    /// Cheap 4-tap downsample.
    Downsample4,
    /// 9-tap tent reconstruction; consumes the sample-scale parameter.
    UpsampleTent,
    /// Cheap box upsample.
    UpsampleBox,
}

impl BlurPhase {
    pub fn downsample(fast_mode: bool) -> Self {
        if fast_mode {
            BlurPhase::Downsample4
        } else {
            BlurPhase::Downsample13
        }
    }

    pub fn upsample(fast_mode: bool) -> Self {
        if fast_mode {
            BlurPhase::UpsampleBox
        } else {
            BlurPhase::UpsampleTent
        }
    }

    pub fn is_upsample(self) -> bool {
        matches!(self, BlurPhase::UpsampleTent | BlurPhase::UpsampleBox)
    }

    pub fn label(self) -> &'static str {
        match self {
            BlurPhase::Downsample13 => "downsample13",
            BlurPhase::Downsample4 => "downsample4",
            BlurPhase::UpsampleTent => "upsample_tent",
            BlurPhase::UpsampleBox => "upsample_box",
        }
    }
}

/// An image a pass can read from or write to: the caller-supplied source
/// or destination of the current render call, or a pooled scratch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRef {
    Source,
    Dest,
    Target(TargetId),
}

/// Recording surface the blur engines drive.
///
/// The real implementation records wgpu work into a command encoder; tests
/// substitute an op-logging mock, which is what makes the resource
/// bookkeeping of the engines checkable without a GPU. Nothing here blocks:
/// recording completes on the calling thread and the GPU executes later in
/// recorded order.
pub trait BlurContext {
    /// Borrow a scratch target for the remainder of this render call.
    fn acquire(&mut self, desc: &TargetDesc) -> Result<TargetId>;

    /// Return a borrowed target. Every acquired target must be released
    /// exactly once before the recording call returns.
    fn release(&mut self, id: TargetId) -> Result<()>;

    /// Set the tent-filter footprint correction used by subsequent
    /// upsample passes.
    fn set_sample_scale(&mut self, sample_scale: f32);

    /// Record one fragment blur pass. Upsample phases read `bloom` as a
    /// side input; it is an explicit argument rather than ambient binding
    /// state so interleaved recordings cannot observe each other.
    fn blur_pass(
        &mut self,
        phase: BlurPhase,
        src: ImageRef,
        bloom: Option<ImageRef>,
        dst: TargetId,
    ) -> Result<()>;

    /// Record a plain resampling blit (bilinear, implicit resize).
    fn blit(&mut self, src: ImageRef, dst: ImageRef) -> Result<()>;

    /// Thread-group size the downsample kernel was compiled with.
    fn workgroup_size(&self) -> [u32; 3];

    /// Record one compute downsample dispatch writing `dst_size` pixels
    /// with the given group counts.
    fn dispatch_downsample(
        &mut self,
        src: ImageRef,
        dst: ImageRef,
        dst_size: [u32; 2],
        groups: [u32; 3],
    ) -> Result<()>;
}

/// The "blur a buffer" capability. Both blur paths implement it; they stay
/// separate strategies because their cost models differ (fragment-pass mip
/// chain vs compute-kernel cascade), and hosts pick one per use.
pub trait Blur {
    /// Record a full blur of the context's source image into its
    /// destination. `source_size` is the source's pixel size and `format`
    /// the pixel format scratch targets are allocated with.
    fn blur(
        &self,
        ctx: &mut dyn BlurContext,
        source_size: [u32; 2],
        format: wgpu::TextureFormat,
    ) -> Result<()>;
}
