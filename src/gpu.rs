//! wgpu backend: pipeline construction and the real [`BlurContext`].

use anyhow::{Result, bail};
use wgpu::util::DeviceExt;

use crate::pass::{BlurContext, BlurPhase, ImageRef};
use crate::pool::{TargetDesc, TargetId, TargetPool, TexturePool};
use crate::validation::{entry_workgroup_size, validate_wgsl_with_context};
use crate::wgsl;

/// Per-pass uniforms. Layout must match the WGSL `Params` struct.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct PassParams {
    texel_size: [f32; 2],
    sample_scale: f32,
    _pad0: f32,
}

/// Cascade kernel uniforms: `(width, height, 1/width, 1/height)` of the
/// destination. Layout must match the WGSL `SizeParams` struct.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SizeParams {
    size: [f32; 4],
}

/// All pipelines and layouts for both blur paths, built once and kept for
/// the host's lifetime. Dropping this releases every GPU handle; dropping
/// twice cannot happen and a never-initialized engine simply has none.
pub struct BlurPipelines {
    params_layout: wgpu::BindGroupLayout,
    single_input_layout: wgpu::BindGroupLayout,
    dual_input_layout: wgpu::BindGroupLayout,
    cascade_layout: wgpu::BindGroupLayout,

    downsample13: wgpu::RenderPipeline,
    downsample4: wgpu::RenderPipeline,
    upsample_tent: wgpu::RenderPipeline,
    upsample_box: wgpu::RenderPipeline,
    blit: wgpu::RenderPipeline,

    cascade: wgpu::ComputePipeline,
    cascade_workgroup_size: [u32; 3],

    sampler: wgpu::Sampler,
    format: wgpu::TextureFormat,
}

impl BlurPipelines {
    /// Build every pipeline against `format` (the format of the source,
    /// destination and all scratch targets).
    ///
    /// The cascade compute kernel stores through an `rgba16float` storage
    /// texture, so the cascade path additionally requires
    /// `format == TextureFormat::Rgba16Float`; the fragment pyramid path
    /// works with any renderable color format.
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<Self> {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sys.blur.sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sys.blur.params.bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let single_input_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("sys.blur.input.bgl"),
                entries: &input_entries(2),
            });

        let dual_input_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sys.blur.input.bloom.bgl"),
            entries: &input_entries(4),
        });

        let single_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("sys.blur.single.layout"),
                bind_group_layouts: &[&params_layout, &single_input_layout],
                push_constant_ranges: &[],
            });
        let dual_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sys.blur.dual.layout"),
            bind_group_layouts: &[&params_layout, &dual_input_layout],
            push_constant_ranges: &[],
        });

        let build_fragment = |phase: BlurPhase| -> Result<wgpu::RenderPipeline> {
            let source = wgsl::build_blur_phase_module(phase);
            validate_wgsl_with_context(&source, phase.label())?;
            let layout = if phase.is_upsample() {
                &dual_pipeline_layout
            } else {
                &single_pipeline_layout
            };
            Ok(create_fullscreen_pipeline(
                device,
                phase.label(),
                layout,
                &source,
                format,
            ))
        };

        let downsample13 = build_fragment(BlurPhase::Downsample13)?;
        let downsample4 = build_fragment(BlurPhase::Downsample4)?;
        let upsample_tent = build_fragment(BlurPhase::UpsampleTent)?;
        let upsample_box = build_fragment(BlurPhase::UpsampleBox)?;

        let blit_source = wgsl::build_blit_module();
        validate_wgsl_with_context(&blit_source, "blit")?;
        let blit = create_fullscreen_pipeline(
            device,
            "blit",
            &single_pipeline_layout,
            &blit_source,
            format,
        );

        let cascade_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sys.blur.cascade.bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::Rgba16Float,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let cascade_source = wgsl::build_cascade_downsample_module();
        let cascade_module = validate_wgsl_with_context(&cascade_source, "cascade downsample")?;
        // The group size is read back from the parsed kernel rather than
        // assumed, so a retuned kernel cannot desync the dispatch math.
        let cascade_workgroup_size = entry_workgroup_size(&cascade_module, "main")?;

        let cascade_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sys.blur.cascade.shader"),
            source: wgpu::ShaderSource::Wgsl(cascade_source.into()),
        });
        let cascade_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("sys.blur.cascade.layout"),
                bind_group_layouts: &[&cascade_layout],
                push_constant_ranges: &[],
            });
        let cascade = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("sys.blur.cascade.pipeline"),
            layout: Some(&cascade_pipeline_layout),
            module: &cascade_shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            params_layout,
            single_input_layout,
            dual_input_layout,
            cascade_layout,
            downsample13,
            downsample4,
            upsample_tent,
            upsample_box,
            blit,
            cascade,
            cascade_workgroup_size,
            sampler,
            format,
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn cascade_workgroup_size(&self) -> [u32; 3] {
        self.cascade_workgroup_size
    }

    fn render_pipeline(&self, phase: BlurPhase) -> &wgpu::RenderPipeline {
        match phase {
            BlurPhase::Downsample13 => &self.downsample13,
            BlurPhase::Downsample4 => &self.downsample4,
            BlurPhase::UpsampleTent => &self.upsample_tent,
            BlurPhase::UpsampleBox => &self.upsample_box,
        }
    }
}

fn input_entries(count: u32) -> Vec<wgpu::BindGroupLayoutEntry> {
    (0..count)
        .map(|binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: if binding % 2 == 0 {
                wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                }
            } else {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
            },
            count: None,
        })
        .collect()
}

fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    name: &str,
    layout: &wgpu::PipelineLayout,
    source: &str,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("sys.blur.{name}.shader")),
        source: wgpu::ShaderSource::Wgsl(source.to_string().into()),
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("sys.blur.{name}.pipeline")),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// The caller-supplied source or destination image of one render call.
#[derive(Clone, Copy)]
pub struct ExternalImage<'a> {
    pub view: &'a wgpu::TextureView,
    pub size: [u32; 2],
}

/// Records blur work into a caller-owned command encoder.
///
/// Recording never blocks: the GPU executes the encoded work later in
/// recorded order, so the destination is not populated when a record call
/// returns. One context borrows the encoder mutably for the duration of a
/// render call, which keeps interleaved recordings apart by construction.
pub struct WgpuBlurContext<'a> {
    device: &'a wgpu::Device,
    encoder: &'a mut wgpu::CommandEncoder,
    pipelines: &'a BlurPipelines,
    pool: &'a mut TexturePool,
    source: ExternalImage<'a>,
    dest: ExternalImage<'a>,
    sample_scale: f32,
}

impl<'a> WgpuBlurContext<'a> {
    pub fn new(
        device: &'a wgpu::Device,
        encoder: &'a mut wgpu::CommandEncoder,
        pipelines: &'a BlurPipelines,
        pool: &'a mut TexturePool,
        source: ExternalImage<'a>,
        dest: ExternalImage<'a>,
    ) -> Self {
        Self {
            device,
            encoder,
            pipelines,
            pool,
            source,
            dest,
            sample_scale: 1.0,
        }
    }
}

fn image_view<'t>(
    pool: &'t TexturePool,
    source: &ExternalImage<'t>,
    dest: &ExternalImage<'t>,
    image: ImageRef,
) -> Result<&'t wgpu::TextureView> {
    match image {
        ImageRef::Source => Ok(source.view),
        ImageRef::Dest => Ok(dest.view),
        ImageRef::Target(id) => pool.view(id),
    }
}

fn image_size(
    pool: &TexturePool,
    source: &ExternalImage<'_>,
    dest: &ExternalImage<'_>,
    image: ImageRef,
) -> Result<[u32; 2]> {
    match image {
        ImageRef::Source => Ok(source.size),
        ImageRef::Dest => Ok(dest.size),
        ImageRef::Target(id) => pool.size(id),
    }
}

fn texel_size(size: [u32; 2]) -> [f32; 2] {
    [1.0 / size[0].max(1) as f32, 1.0 / size[1].max(1) as f32]
}

impl BlurContext for WgpuBlurContext<'_> {
    fn acquire(&mut self, desc: &TargetDesc) -> Result<TargetId> {
        self.pool.acquire(desc)
    }

    fn release(&mut self, id: TargetId) -> Result<()> {
        self.pool.release(id)
    }

    fn set_sample_scale(&mut self, sample_scale: f32) {
        self.sample_scale = sample_scale;
    }

    fn blur_pass(
        &mut self,
        phase: BlurPhase,
        src: ImageRef,
        bloom: Option<ImageRef>,
        dst: TargetId,
    ) -> Result<()> {
        if phase.is_upsample() != bloom.is_some() {
            bail!(
                "pass {} {} a bloom side input",
                phase.label(),
                if phase.is_upsample() { "requires" } else { "does not take" }
            );
        }

        let pool = &*self.pool;
        let src_size = image_size(pool, &self.source, &self.dest, src)?;
        let src_view = image_view(pool, &self.source, &self.dest, src)?;
        let dst_view = pool.view(dst)?;

        let params = PassParams {
            texel_size: texel_size(src_size),
            sample_scale: self.sample_scale,
            _pad0: 0.0,
        };
        let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sys.blur.pass.params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let params_bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sys.blur.pass.params.bg"),
            layout: &self.pipelines.params_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        let input_bg = match bloom {
            None => self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("sys.blur.pass.input.bg"),
                layout: &self.pipelines.single_input_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(src_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.pipelines.sampler),
                    },
                ],
            }),
            Some(bloom) => {
                let bloom_view = image_view(pool, &self.source, &self.dest, bloom)?;
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("sys.blur.pass.input.bloom.bg"),
                    layout: &self.pipelines.dual_input_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(src_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.pipelines.sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(bloom_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::Sampler(&self.pipelines.sampler),
                        },
                    ],
                })
            }
        };

        let label = format!("sys.blur.pass.{}", phase.label());
        let mut rpass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: dst_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        rpass.set_pipeline(self.pipelines.render_pipeline(phase));
        rpass.set_bind_group(0, &params_bg, &[]);
        rpass.set_bind_group(1, &input_bg, &[]);
        rpass.draw(0..3, 0..1);

        Ok(())
    }

    fn blit(&mut self, src: ImageRef, dst: ImageRef) -> Result<()> {
        let pool = &*self.pool;
        let src_size = image_size(pool, &self.source, &self.dest, src)?;
        let src_view = image_view(pool, &self.source, &self.dest, src)?;
        let dst_view = image_view(pool, &self.source, &self.dest, dst)?;

        let params = PassParams {
            texel_size: texel_size(src_size),
            sample_scale: self.sample_scale,
            _pad0: 0.0,
        };
        let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sys.blur.blit.params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let params_bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sys.blur.blit.params.bg"),
            layout: &self.pipelines.params_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });
        let input_bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sys.blur.blit.input.bg"),
            layout: &self.pipelines.single_input_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(src_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.pipelines.sampler),
                },
            ],
        });

        let mut rpass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("sys.blur.blit"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: dst_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        rpass.set_pipeline(&self.pipelines.blit);
        rpass.set_bind_group(0, &params_bg, &[]);
        rpass.set_bind_group(1, &input_bg, &[]);
        rpass.draw(0..3, 0..1);

        Ok(())
    }

    fn workgroup_size(&self) -> [u32; 3] {
        self.pipelines.cascade_workgroup_size
    }

    fn dispatch_downsample(
        &mut self,
        src: ImageRef,
        dst: ImageRef,
        dst_size: [u32; 2],
        groups: [u32; 3],
    ) -> Result<()> {
        let pool = &*self.pool;
        let src_view = image_view(pool, &self.source, &self.dest, src)?;
        let dst_view = image_view(pool, &self.source, &self.dest, dst)?;

        let w = dst_size[0].max(1) as f32;
        let h = dst_size[1].max(1) as f32;
        let params = SizeParams {
            size: [w, h, 1.0 / w, 1.0 / h],
        };
        let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sys.blur.cascade.params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sys.blur.cascade.bg"),
            layout: &self.pipelines.cascade_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(src_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.pipelines.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(dst_view),
                },
            ],
        });

        let mut cpass = self.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("sys.blur.cascade.pass"),
            timestamp_writes: None,
        });
        cpass.set_pipeline(&self.pipelines.cascade);
        cpass.set_bind_group(0, &bind_group, &[]);
        cpass.dispatch_workgroups(groups[0], groups[1], groups[2]);

        Ok(())
    }
}
