//! Shared op-logging mock used by the recording tests. Not every test
//! binary touches every helper.
#![allow(dead_code)]

use std::collections::BTreeSet;

use anyhow::{Result, bail};
use pyramid_blur::{BlurContext, BlurPhase, ImageRef, TargetDesc, TargetId};

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Acquire {
        id: TargetId,
        name: String,
        size: [u32; 2],
        random_write: bool,
    },
    Release(TargetId),
    SampleScale(f32),
    BlurPass {
        phase: BlurPhase,
        src: ImageRef,
        bloom: Option<ImageRef>,
        dst: TargetId,
    },
    Blit {
        src: ImageRef,
        dst: ImageRef,
    },
    Dispatch {
        src: ImageRef,
        dst: ImageRef,
        dst_size: [u32; 2],
        groups: [u32; 3],
    },
}

/// GPU-free [`BlurContext`] that records everything the engines do.
pub struct RecordingContext {
    pub ops: Vec<Op>,
    pub live: BTreeSet<TargetId>,
    pub max_live: usize,
    pub workgroup_size: [u32; 3],
    /// When set, the nth `blur_pass` call (0-based) fails.
    pub fail_on_blur_pass: Option<usize>,
    /// When set, the nth `dispatch_downsample` call (0-based) fails.
    pub fail_on_dispatch: Option<usize>,
    blur_pass_calls: usize,
    dispatch_calls: usize,
    next_id: u64,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            live: BTreeSet::new(),
            max_live: 0,
            workgroup_size: [8, 8, 1],
            fail_on_blur_pass: None,
            fail_on_dispatch: None,
            blur_pass_calls: 0,
            dispatch_calls: 0,
            next_id: 0,
        }
    }

    pub fn acquire_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, Op::Acquire { .. }))
            .count()
    }

    pub fn release_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, Op::Release(_)))
            .count()
    }

    pub fn blur_phases(&self) -> Vec<BlurPhase> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::BlurPass { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect()
    }

    pub fn dispatches(&self) -> Vec<([u32; 2], [u32; 3])> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Dispatch {
                    dst_size, groups, ..
                } => Some((*dst_size, *groups)),
                _ => None,
            })
            .collect()
    }

    pub fn blits(&self) -> Vec<(ImageRef, ImageRef)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Blit { src, dst } => Some((*src, *dst)),
                _ => None,
            })
            .collect()
    }

    pub fn sample_scales(&self) -> Vec<f32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::SampleScale(s) => Some(*s),
                _ => None,
            })
            .collect()
    }
}

impl BlurContext for RecordingContext {
    fn acquire(&mut self, desc: &TargetDesc) -> Result<TargetId> {
        let id = TargetId::new(self.next_id);
        self.next_id += 1;
        self.live.insert(id);
        self.max_live = self.max_live.max(self.live.len());
        self.ops.push(Op::Acquire {
            id,
            name: desc.name.as_str().to_string(),
            size: [desc.width, desc.height],
            random_write: desc.random_write,
        });
        Ok(id)
    }

    fn release(&mut self, id: TargetId) -> Result<()> {
        if !self.live.remove(&id) {
            bail!("release of non-live target {}", id.raw());
        }
        self.ops.push(Op::Release(id));
        Ok(())
    }

    fn set_sample_scale(&mut self, sample_scale: f32) {
        self.ops.push(Op::SampleScale(sample_scale));
    }

    fn blur_pass(
        &mut self,
        phase: BlurPhase,
        src: ImageRef,
        bloom: Option<ImageRef>,
        dst: TargetId,
    ) -> Result<()> {
        let call = self.blur_pass_calls;
        self.blur_pass_calls += 1;
        if self.fail_on_blur_pass == Some(call) {
            bail!("injected blur_pass failure at call {call}");
        }
        if !self.live.contains(&dst) {
            bail!("blur_pass writes to non-live target {}", dst.raw());
        }
        self.ops.push(Op::BlurPass {
            phase,
            src,
            bloom,
            dst,
        });
        Ok(())
    }

    fn blit(&mut self, src: ImageRef, dst: ImageRef) -> Result<()> {
        self.ops.push(Op::Blit { src, dst });
        Ok(())
    }

    fn workgroup_size(&self) -> [u32; 3] {
        self.workgroup_size
    }

    fn dispatch_downsample(
        &mut self,
        src: ImageRef,
        dst: ImageRef,
        dst_size: [u32; 2],
        groups: [u32; 3],
    ) -> Result<()> {
        let call = self.dispatch_calls;
        self.dispatch_calls += 1;
        if self.fail_on_dispatch == Some(call) {
            bail!("injected dispatch failure at call {call}");
        }
        if let ImageRef::Target(id) = dst {
            if !self.live.contains(&id) {
                bail!("dispatch writes to non-live target {}", id.raw());
            }
        }
        self.ops.push(Op::Dispatch {
            src,
            dst,
            dst_size,
            groups,
        });
        Ok(())
    }
}
