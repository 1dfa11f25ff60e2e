//! Cascaded Gaussian downsampler: a one-directional chain of fixed-kernel
//! compute dispatches at decreasing power-of-two sizes, plus fractional
//! extra passes at the final size.

use anyhow::Result;
use tracing::debug;

use crate::pass::{Blur, BlurContext, ImageRef};
use crate::pool::{ResourceName, TargetDesc, TargetId};
use crate::sizing::{self, CascadePlan, MAX_PYRAMID_LEVELS};

/// Cheaper alternative blur path to [`crate::PyramidBlurEngine`].
///
/// Approximates a target blur resolution with `lod` halvings plus up to 4
/// extra equal-variance passes at the final size (stacked Gaussians add
/// variance). Temporaries are chained hand-over-hand: at most one is alive
/// at any instant, except during the allocate-before-release overlap of a
/// single step.
pub struct CascadeDownsampler {
    plan: CascadePlan,
    lod_names: Vec<ResourceName>,
    iter_name: ResourceName,
}

impl CascadeDownsampler {
    /// Plan a cascade approximating a blur from `source_res` down to
    /// `blur_res` (see [`sizing::find_size`]).
    pub fn new(source_res: u32, blur_res: u32) -> Self {
        Self::with_plan(sizing::find_size(source_res, blur_res))
    }

    pub fn with_plan(plan: CascadePlan) -> Self {
        let lod_names = (0..=MAX_PYRAMID_LEVELS)
            .map(|l| ResourceName::from(format!("sys.blur.cascade.lod.{l}")))
            .collect();
        Self {
            plan,
            lod_names,
            iter_name: ResourceName::from("sys.blur.cascade.iter"),
        }
    }

    pub fn plan(&self) -> CascadePlan {
        self.plan
    }

    /// Record a single fixed-kernel downsample of `src` into `dst`,
    /// dispatching one thread per destination pixel.
    pub fn record_single<C: BlurContext + ?Sized>(
        &self,
        ctx: &mut C,
        src: ImageRef,
        dst: ImageRef,
        dst_size: [u32; 2],
    ) -> Result<()> {
        let groups = sizing::dispatch_size_3d(
            [dst_size[0], dst_size[1], 1],
            ctx.workgroup_size(),
        );
        ctx.dispatch_downsample(src, dst, dst_size, groups)
    }

    /// Record the full cascade: `lod` halving steps, then `iterations`
    /// extra passes at the final size, then a blit into the destination.
    ///
    /// `lod` saturates at 16. The external source is never released; the
    /// final temporary (if any) is released after the blit.
    pub fn record<C: BlurContext + ?Sized>(
        &self,
        ctx: &mut C,
        source_size: [u32; 2],
        format: wgpu::TextureFormat,
        iterations: u32,
        lod: u32,
    ) -> Result<()> {
        let lod = lod.min(MAX_PYRAMID_LEVELS);
        debug!(iterations, lod, "recording gaussian cascade");

        let mut open: Vec<TargetId> = Vec::new();
        let outcome =
            self.record_chain(ctx, source_size, format, iterations, lod, &mut open);

        // Anything still open here means the chain bailed early.
        let mut cleanup: Result<()> = Ok(());
        for id in open {
            let released = ctx.release(id);
            if cleanup.is_ok() {
                cleanup = released;
            }
        }

        outcome.and(cleanup)
    }

    fn record_chain<C: BlurContext + ?Sized>(
        &self,
        ctx: &mut C,
        source_size: [u32; 2],
        format: wgpu::TextureFormat,
        iterations: u32,
        lod: u32,
        open: &mut Vec<TargetId>,
    ) -> Result<()> {
        let lod_target = sizing::lod_size(source_size, lod);

        let mut last = ImageRef::Source;
        let mut last_tmp: Option<TargetId> = None;

        let mut step = |ctx: &mut C,
                        name: &ResourceName,
                        size: [u32; 2],
                        last: &mut ImageRef,
                        last_tmp: &mut Option<TargetId>,
                        open: &mut Vec<TargetId>|
         -> Result<()> {
            let tmp = ctx.acquire(&TargetDesc::storage(name.clone(), size[0], size[1], format))?;
            open.push(tmp);
            self.record_single(ctx, *last, ImageRef::Target(tmp), size)?;
            if let Some(prev) = last_tmp.take() {
                ctx.release(prev)?;
                open.retain(|id| *id != prev);
            }
            *last = ImageRef::Target(tmp);
            *last_tmp = Some(tmp);
            Ok(())
        };

        // Phase A: walk down the power-of-two chain.
        for l in 1..=lod {
            let next_size = sizing::lod_size(source_size, l);
            step(
                ctx,
                &self.lod_names[l as usize],
                next_size,
                &mut last,
                &mut last_tmp,
                open,
            )?;
        }

        // Phase B: extra fixed-size passes for the fractional remainder.
        for _ in 0..iterations {
            step(ctx, &self.iter_name, lod_target, &mut last, &mut last_tmp, open)?;
        }

        ctx.blit(last, ImageRef::Dest)?;

        if let Some(tmp) = last_tmp.take() {
            ctx.release(tmp)?;
            open.retain(|id| *id != tmp);
        }
        Ok(())
    }
}

impl Blur for CascadeDownsampler {
    fn blur(
        &self,
        ctx: &mut dyn BlurContext,
        source_size: [u32; 2],
        format: wgpu::TextureFormat,
    ) -> Result<()> {
        self.record(ctx, source_size, format, self.plan.iterations, self.plan.lod)
    }
}
