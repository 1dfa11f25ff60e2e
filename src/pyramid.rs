//! Pyramid blur: downsample mip chain, tent/box upsample chain, final blit.

use anyhow::Result;
use tracing::debug;

use crate::pass::{Blur, BlurContext, BlurPhase, ImageRef};
use crate::pool::{ResourceName, TargetDesc, TargetId};
use crate::settings::BlurSettings;
use crate::sizing::{self, MAX_PYRAMID_LEVELS};

/// Pool-slot names for one pyramid depth.
#[derive(Debug, Clone)]
struct PyramidLevel {
    down: ResourceName,
    up: ResourceName,
}

/// Large-radius blur via a mip-style pyramid of halved-resolution targets.
///
/// Persistent state is only the fixed table of level names below and the
/// settings; every texture is borrowed and returned within a single
/// [`PyramidBlurEngine::record`] call.
pub struct PyramidBlurEngine {
    // Named once at construction so per-frame recording never formats
    // label strings.
    levels: Vec<PyramidLevel>,
    settings: BlurSettings,
}

impl PyramidBlurEngine {
    pub fn new(settings: BlurSettings) -> Self {
        let levels = (0..MAX_PYRAMID_LEVELS)
            .map(|i| PyramidLevel {
                down: ResourceName::from(format!("sys.blur.pyramid.down.{i}")),
                up: ResourceName::from(format!("sys.blur.pyramid.up.{i}")),
            })
            .collect();
        Self { levels, settings }
    }

    pub fn settings(&self) -> BlurSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: BlurSettings) {
        self.settings = settings;
    }

    /// Record a full pyramid blur of the context's source into its
    /// destination.
    ///
    /// The source is assumed valid (>= 2x2); degenerate sizes are clamped
    /// to 1x1 targets rather than rejected. Every target acquired here is
    /// released before returning, on success and on error alike.
    pub fn record<C: BlurContext + ?Sized>(
        &self,
        ctx: &mut C,
        source_size: [u32; 2],
        format: wgpu::TextureFormat,
        settings: BlurSettings,
    ) -> Result<()> {
        let settings = settings.clamped();
        let plan =
            sizing::iterations_from_diffusion(source_size[0], source_size[1], settings.diffusion);
        debug!(
            iterations = plan.iterations,
            sample_scale = plan.sample_scale,
            fast_mode = settings.fast_mode,
            "recording pyramid blur"
        );

        let mut acquired: Vec<(TargetId, TargetId)> = Vec::with_capacity(plan.iterations as usize);
        let outcome = self.record_passes(ctx, source_size, format, settings, plan, &mut acquired);

        // Cleanup runs on every exit path. up[iterations-1] is never
        // written but was still acquired, and is still returned here.
        let mut cleanup: Result<()> = Ok(());
        for (down, up) in acquired {
            let released = ctx.release(down).and_then(|()| ctx.release(up));
            if cleanup.is_ok() {
                cleanup = released;
            }
        }

        outcome.and(cleanup)
    }

    fn record_passes<C: BlurContext + ?Sized>(
        &self,
        ctx: &mut C,
        source_size: [u32; 2],
        format: wgpu::TextureFormat,
        settings: BlurSettings,
        plan: sizing::IterationPlan,
        acquired: &mut Vec<(TargetId, TargetId)>,
    ) -> Result<()> {
        ctx.set_sample_scale(plan.sample_scale);

        // Blur on a half-res chain; full res does not buy much and kills
        // fillrate-limited platforms. The final blit restores the
        // destination resolution.
        let mut tw = (source_size[0] / 2).max(1);
        let mut th = (source_size[1] / 2).max(1);

        let down_phase = BlurPhase::downsample(settings.fast_mode);
        let up_phase = BlurPhase::upsample(settings.fast_mode);
        let iterations = plan.iterations as usize;

        let mut last = ImageRef::Source;
        for level in &self.levels[..iterations] {
            let down = ctx.acquire(&TargetDesc::color(level.down.clone(), tw, th, format))?;
            let up = ctx.acquire(&TargetDesc::color(level.up.clone(), tw, th, format))?;
            acquired.push((down, up));

            ctx.blur_pass(down_phase, last, None, down)?;
            last = ImageRef::Target(down);

            tw = (tw / 2).max(1);
            th = (th / 2).max(1);
        }

        // Walk back up, feeding each level's downsample in as the bloom
        // side input. With a single iteration this loop runs zero times
        // and the accumulator stays down[0].
        let mut acc = ImageRef::Target(acquired[iterations - 1].0);
        for i in (0..iterations - 1).rev() {
            let (down, up) = acquired[i];
            ctx.blur_pass(up_phase, acc, Some(ImageRef::Target(down)), up)?;
            acc = ImageRef::Target(up);
        }

        ctx.blit(acc, ImageRef::Dest)
    }
}

impl Blur for PyramidBlurEngine {
    fn blur(
        &self,
        ctx: &mut dyn BlurContext,
        source_size: [u32; 2],
        format: wgpu::TextureFormat,
    ) -> Result<()> {
        self.record(ctx, source_size, format, self.settings)
    }
}

impl Default for PyramidBlurEngine {
    fn default() -> Self {
        Self::new(BlurSettings::default())
    }
}
