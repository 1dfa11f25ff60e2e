mod common;

use common::{Op, RecordingContext};
use pyramid_blur::{CascadeDownsampler, ImageRef, sizing};

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

#[test]
fn chain_holds_at_most_one_temp_plus_overlap() {
    let cascade = CascadeDownsampler::with_plan(sizing::CascadePlan {
        lod: 2,
        iterations: 3,
    });
    let mut ctx = RecordingContext::new();
    cascade
        .record(&mut ctx, [1024, 1024], FORMAT, 3, 2)
        .unwrap();

    // One temp per chain step, chained hand-over-hand.
    assert_eq!(ctx.acquire_count(), 5);
    assert_eq!(ctx.release_count(), 5);
    assert!(ctx.live.is_empty());
    // Allocate-before-release means two may briefly coexist, never three.
    assert!(ctx.max_live <= 2, "max_live was {}", ctx.max_live);
}

#[test]
fn dispatch_sizes_walk_the_lod_chain_then_hold() {
    let cascade = CascadeDownsampler::with_plan(sizing::CascadePlan {
        lod: 2,
        iterations: 3,
    });
    let mut ctx = RecordingContext::new();
    cascade
        .record(&mut ctx, [1024, 1024], FORMAT, 3, 2)
        .unwrap();

    let dispatches = ctx.dispatches();
    let sizes: Vec<[u32; 2]> = dispatches.iter().map(|(size, _)| *size).collect();
    assert_eq!(
        sizes,
        vec![[512, 512], [256, 256], [256, 256], [256, 256], [256, 256]]
    );

    // One thread per destination pixel with an 8x8x1 group.
    for (size, groups) in dispatches {
        assert_eq!(
            groups,
            sizing::dispatch_size_3d([size[0], size[1], 1], [8, 8, 1])
        );
    }
}

#[test]
fn chain_ends_with_blit_into_destination() {
    let cascade = CascadeDownsampler::new(1024, 64);
    let mut ctx = RecordingContext::new();
    let plan = cascade.plan();
    cascade
        .record(&mut ctx, [1024, 1024], FORMAT, plan.iterations, plan.lod)
        .unwrap();

    let blits = ctx.blits();
    assert_eq!(blits.len(), 1);
    assert_eq!(blits[0].1, ImageRef::Dest);
    // The blit reads the last temp, which is released right after.
    assert!(matches!(blits[0].0, ImageRef::Target(_)));
    assert!(matches!(ctx.ops.last(), Some(Op::Release(_))));
}

#[test]
fn source_is_read_only() {
    let cascade = CascadeDownsampler::with_plan(sizing::CascadePlan {
        lod: 3,
        iterations: 2,
    });
    let mut ctx = RecordingContext::new();
    cascade
        .record(&mut ctx, [2048, 2048], FORMAT, 2, 3)
        .unwrap();

    // The first dispatch reads the external source; no dispatch writes it.
    let first = ctx
        .ops
        .iter()
        .find_map(|op| match op {
            Op::Dispatch { src, .. } => Some(*src),
            _ => None,
        })
        .unwrap();
    assert_eq!(first, ImageRef::Source);
    assert!(ctx.ops.iter().all(|op| match op {
        Op::Dispatch { dst, .. } => *dst != ImageRef::Source,
        _ => true,
    }));
}

#[test]
fn degenerate_plan_blits_source_straight_through() {
    let cascade = CascadeDownsampler::with_plan(sizing::CascadePlan {
        lod: 0,
        iterations: 0,
    });
    let mut ctx = RecordingContext::new();
    cascade.record(&mut ctx, [640, 480], FORMAT, 0, 0).unwrap();

    assert_eq!(ctx.acquire_count(), 0);
    assert!(ctx.dispatches().is_empty());
    assert_eq!(ctx.blits(), vec![(ImageRef::Source, ImageRef::Dest)]);
}

#[test]
fn lod_saturates_at_sixteen() {
    let cascade = CascadeDownsampler::with_plan(sizing::CascadePlan {
        lod: 16,
        iterations: 0,
    });
    let mut ctx = RecordingContext::new();
    cascade
        .record(&mut ctx, [1 << 20, 1 << 20], FORMAT, 0, 40)
        .unwrap();

    assert_eq!(ctx.acquire_count(), 16);
    assert!(ctx.live.is_empty());
}

#[test]
fn temps_are_storage_targets() {
    let cascade = CascadeDownsampler::with_plan(sizing::CascadePlan {
        lod: 2,
        iterations: 1,
    });
    let mut ctx = RecordingContext::new();
    cascade
        .record(&mut ctx, [1024, 1024], FORMAT, 1, 2)
        .unwrap();

    for op in &ctx.ops {
        if let Op::Acquire { random_write, .. } = op {
            assert!(random_write, "cascade temp without storage binding");
        }
    }
}

#[test]
fn failed_dispatch_still_releases_everything() {
    let cascade = CascadeDownsampler::with_plan(sizing::CascadePlan {
        lod: 4,
        iterations: 4,
    });
    let mut ctx = RecordingContext::new();
    ctx.fail_on_dispatch = Some(3);

    let result = cascade.record(&mut ctx, [4096, 4096], FORMAT, 4, 4);
    assert!(result.is_err());
    assert!(ctx.live.is_empty(), "error path leaked targets");
    assert_eq!(ctx.acquire_count(), ctx.release_count());
}
