//! Pure sizing math for the blur paths.
//!
//! This module handles:
//! - Iteration-count / sample-scale derivation for the pyramid path
//! - LOD + fractional-iteration planning for the Gaussian cascade path
//! - Compute dispatch group counts

/// Upper bound on pyramid depth. Just to make sure we handle 64k screens.
pub const MAX_PYRAMID_LEVELS: u32 = 16;

/// Number of group dispatches needed to cover `thread_count` threads on one axis.
///
/// A zero-sized axis still dispatches one group: the classic
/// `(n - 1) / g + 1` formula is kept, with `n` clamped to 1 first so the
/// subtraction cannot underflow. A zero `group_size` is treated as 1.
pub fn dispatch_size(thread_count: u32, group_size: u32) -> u32 {
    (thread_count.max(1) - 1) / group_size.max(1) + 1
}

/// [`dispatch_size`] applied per axis.
pub fn dispatch_size_3d(threads: [u32; 3], group: [u32; 3]) -> [u32; 3] {
    [
        dispatch_size(threads[0], group[0]),
        dispatch_size(threads[1], group[1]),
        dispatch_size(threads[2], group[2]),
    ]
}

/// Pass-count plan for one pyramid render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationPlan {
    /// Downsample pass count, in `1..=MAX_PYRAMID_LEVELS`.
    pub iterations: u32,
    /// Tent-filter footprint correction for the upsample passes,
    /// always in `[0.5, 1.5)`.
    pub sample_scale: f32,
}

/// Derive how many halvings are worth doing for a source resolution and a
/// requested diffusion.
///
/// The working resolution is half the source (the pyramid blurs at half
/// res), so the largest halved axis drives the count: `log2` of it, shifted
/// by `diffusion - 10`, floored and clamped to `1..=16`. The fractional
/// remainder becomes `sample_scale` instead of being rounded away.
pub fn iterations_from_diffusion(
    source_width: u32,
    source_height: u32,
    diffusion: f32,
) -> IterationPlan {
    let tw = source_width / 2;
    let th = source_height / 2;
    let s = tw.max(th).max(1);

    let logs = (s as f32).log2() + diffusion.min(10.0) - 10.0;
    let logs_i = logs.floor();
    let iterations = (logs_i as i32).clamp(1, MAX_PYRAMID_LEVELS as i32) as u32;
    let sample_scale = 0.5 + logs - logs_i;

    IterationPlan {
        iterations,
        sample_scale,
    }
}

/// Pass-count plan for one cascade render: `lod` power-of-two halvings plus
/// `iterations` extra fixed-kernel passes at the final size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadePlan {
    pub lod: u32,
    pub iterations: u32,
}

/// Split a fractional LOD into whole halvings plus 0..=4 extra passes.
///
/// Cascaded Gaussians: sigma^2 = sigma_0^2 + sigma_1^2, so stacking N
/// equal-variance passes approximates one blur of N times the variance.
/// The fractional remainder maps linearly onto up to 4 extra passes.
pub fn plan_from_flod(flod: f32) -> CascadePlan {
    let flod = flod.max(0.0);
    let lod = flod.floor();
    let iterations = lerp(0.0, 4.0, flod - lod).round() as u32;
    CascadePlan {
        lod: lod as u32,
        iterations,
    }
}

/// Plan a cascade that approximates blurring down to `blur_res` from
/// `source_res` (both clamped to >= 1 before the logs).
pub fn find_size(source_res: u32, blur_res: u32) -> CascadePlan {
    let flod = (source_res.max(1) as f32).log2() - (blur_res.max(1) as f32).log2();
    plan_from_flod(flod)
}

/// Size of a target after `lod` halvings, never below 1x1 per axis.
pub fn lod_size(size: [u32; 2], lod: u32) -> [u32; 2] {
    let lod = lod.min(MAX_PYRAMID_LEVELS);
    [(size[0] >> lod).max(1), (size[1] >> lod).max(1)]
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn dispatch_size_covers_all_threads() {
        assert_eq!(dispatch_size(1, 8), 1);
        assert_eq!(dispatch_size(8, 8), 1);
        assert_eq!(dispatch_size(9, 8), 2);
        assert_eq!(dispatch_size(1920, 16), 120);
        assert_eq!(dispatch_size(1921, 16), 121);
    }

    #[test]
    fn dispatch_size_zero_threads_yields_one_group() {
        assert_eq!(dispatch_size(0, 8), 1);
        assert_eq!(dispatch_size(0, 1), 1);
    }

    #[test]
    fn dispatch_size_zero_group_degrades_to_one() {
        assert_eq!(dispatch_size(7, 0), 7);
    }

    #[test]
    fn dispatch_size_3d_is_per_axis() {
        assert_eq!(dispatch_size_3d([640, 480, 1], [8, 8, 1]), [80, 60, 1]);
        assert_eq!(dispatch_size_3d([641, 481, 1], [8, 8, 1]), [81, 61, 1]);
    }

    #[test]
    fn zero_diffusion_at_2048_gives_single_iteration() {
        let plan = iterations_from_diffusion(2048, 1024, 0.0);
        assert_eq!(plan.iterations, 1);
        assert!((plan.sample_scale - 0.5).abs() < 1e-6);
    }

    #[test]
    fn full_diffusion_at_2048_gives_ten_iterations() {
        let plan = iterations_from_diffusion(2048, 1024, 10.0);
        assert_eq!(plan.iterations, 10);
        assert!((plan.sample_scale - 0.5).abs() < 1e-6);
    }

    #[test]
    fn diffusion_above_ten_saturates() {
        let capped = iterations_from_diffusion(2048, 1024, 10.0);
        let over = iterations_from_diffusion(2048, 1024, 25.0);
        assert_eq!(capped, over);
    }

    #[test]
    fn tiny_source_still_gets_one_iteration() {
        let plan = iterations_from_diffusion(2, 2, 0.0);
        assert_eq!(plan.iterations, 1);
        assert!(plan.sample_scale >= 0.5 && plan.sample_scale < 1.5);
    }

    #[test]
    fn find_size_exact_power_of_two() {
        let plan = find_size(1024, 64);
        assert_eq!(plan, CascadePlan { lod: 4, iterations: 0 });
    }

    #[test]
    fn find_size_fractional_remainder() {
        // log2(1024) - log2(45) ~= 4.51 -> lod 4, round(4 * 0.51) = 2.
        let plan = find_size(1024, 45);
        assert_eq!(plan.lod, 4);
        assert_eq!(plan.iterations, 2);
    }

    #[test]
    fn find_size_upscale_request_is_identity() {
        let plan = find_size(64, 1024);
        assert_eq!(plan, CascadePlan { lod: 0, iterations: 0 });
    }

    #[test]
    fn lod_size_halves_and_clamps() {
        assert_eq!(lod_size([1920, 1080], 0), [1920, 1080]);
        assert_eq!(lod_size([1920, 1080], 2), [480, 270]);
        assert_eq!(lod_size([4, 4], 6), [1, 1]);
    }

    proptest! {
        #[test]
        fn iterations_always_in_bounds(
            w in 2u32..=16384,
            h in 2u32..=16384,
            diffusion in 0.0f32..=10.0,
        ) {
            let plan = iterations_from_diffusion(w, h, diffusion);
            prop_assert!(plan.iterations >= 1);
            prop_assert!(plan.iterations <= MAX_PYRAMID_LEVELS);
            prop_assert!(plan.sample_scale >= 0.5);
            prop_assert!(plan.sample_scale < 1.5);
        }

        #[test]
        fn cascade_iterations_never_exceed_four(flod in 0.0f32..=32.0) {
            let plan = plan_from_flod(flod);
            prop_assert!(plan.iterations <= 4);
            prop_assert_eq!(plan.lod, flod.floor() as u32);
        }

        #[test]
        fn dispatch_groups_cover_without_excess(
            n in 0u32..=1_000_000,
            g in 1u32..=1024,
        ) {
            let groups = dispatch_size(n, g);
            prop_assert!(groups * g >= n.max(1));
            prop_assert!((groups - 1) * g < n.max(1));
        }
    }
}
