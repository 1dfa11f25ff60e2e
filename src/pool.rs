//! Scratch render-target pooling.
//!
//! Every blur invocation borrows its intermediate targets from a pool and
//! returns them before the recording call exits. The pool keeps released
//! textures on a free list keyed by size/format/usage so steady-state
//! frames allocate nothing.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, bail};

/// Interned label for a GPU resource. Cheap to clone, used both as a
/// pool-slot identity and as the wgpu debug label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceName(Arc<str>);

impl ResourceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ResourceName {
    fn from(s: String) -> Self {
        ResourceName(Arc::from(s.as_str()))
    }
}

impl From<&str> for ResourceName {
    fn from(s: &str) -> Self {
        ResourceName(Arc::from(s))
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Description of a scratch target. Filtering is always bilinear and wrap
/// is always clamp-to-edge (fixed by the sampler the pipelines own), so
/// neither is part of the descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDesc {
    pub name: ResourceName,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    /// Needed only by the compute-kernel cascade path (storage binding).
    pub random_write: bool,
}

impl TargetDesc {
    /// Sampled + renderable color target.
    pub fn color(name: ResourceName, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            name,
            width,
            height,
            format,
            random_write: false,
        }
    }

    /// Target the compute kernel can write to directly.
    pub fn storage(
        name: ResourceName,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        Self {
            name,
            width,
            height,
            format,
            random_write: true,
        }
    }

    fn key(&self) -> PoolKey {
        PoolKey {
            width: self.width.max(1),
            height: self.height.max(1),
            format: self.format,
            random_write: self.random_write,
        }
    }

    fn usage(&self) -> wgpu::TextureUsages {
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        if self.random_write {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        usage
    }
}

/// Handle to a live pooled target, valid until released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    pub fn new(raw: u64) -> Self {
        TargetId(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Borrow/return surface of a target pool. Release of an id that is not
/// live is an error so double-release bugs surface in tests instead of
/// silently corrupting the free list.
pub trait TargetPool {
    fn acquire(&mut self, desc: &TargetDesc) -> Result<TargetId>;
    fn release(&mut self, id: TargetId) -> Result<()>;
    /// Number of currently borrowed targets.
    fn live_count(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    random_write: bool,
}

struct PooledTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct LiveEntry {
    key: PoolKey,
    pooled: PooledTexture,
}

/// wgpu-backed target pool.
///
/// Not thread-safe by design: acquisition and release happen from the
/// single recording context (see the crate-level concurrency notes).
pub struct TexturePool {
    device: Arc<wgpu::Device>,
    free: HashMap<PoolKey, Vec<PooledTexture>>,
    live: HashMap<TargetId, LiveEntry>,
    next_id: u64,
}

impl TexturePool {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self {
            device,
            free: HashMap::new(),
            live: HashMap::new(),
            next_id: 0,
        }
    }

    /// View of a live target.
    pub fn view(&self, id: TargetId) -> Result<&wgpu::TextureView> {
        match self.live.get(&id) {
            Some(entry) => Ok(&entry.pooled.view),
            None => bail!("target {} is not live in the pool", id.raw()),
        }
    }

    /// Underlying texture of a live target.
    pub fn texture(&self, id: TargetId) -> Result<&wgpu::Texture> {
        match self.live.get(&id) {
            Some(entry) => Ok(&entry.pooled.texture),
            None => bail!("target {} is not live in the pool", id.raw()),
        }
    }

    /// Pixel size of a live target.
    pub fn size(&self, id: TargetId) -> Result<[u32; 2]> {
        match self.live.get(&id) {
            Some(entry) => Ok([entry.key.width, entry.key.height]),
            None => bail!("target {} is not live in the pool", id.raw()),
        }
    }

    /// Drop all cached free textures (e.g. after a resolution change).
    pub fn purge(&mut self) {
        self.free.clear();
    }

    fn create(&self, desc: &TargetDesc) -> PooledTexture {
        let key = desc.key();
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.name.as_str()),
            size: wgpu::Extent3d {
                width: key.width,
                height: key.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: key.format,
            usage: desc.usage(),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        PooledTexture { texture, view }
    }
}

impl TargetPool for TexturePool {
    fn acquire(&mut self, desc: &TargetDesc) -> Result<TargetId> {
        let key = desc.key();
        let pooled = match self.free.get_mut(&key).and_then(Vec::pop) {
            Some(pooled) => pooled,
            None => self.create(desc),
        };

        let id = TargetId::new(self.next_id);
        self.next_id += 1;
        self.live.insert(id, LiveEntry { key, pooled });
        tracing::trace!(name = %desc.name, id = id.raw(), "acquired blur target");
        Ok(id)
    }

    fn release(&mut self, id: TargetId) -> Result<()> {
        let Some(entry) = self.live.remove(&id) else {
            bail!("release of unknown or already released target {}", id.raw());
        };
        self.free.entry(entry.key).or_default().push(entry.pooled);
        tracing::trace!(id = id.raw(), "released blur target");
        Ok(())
    }

    fn live_count(&self) -> usize {
        self.live.len()
    }
}

impl std::fmt::Debug for TexturePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TexturePool")
            .field("live", &self.live.len())
            .field("free_buckets", &self.free.len())
            .finish()
    }
}
