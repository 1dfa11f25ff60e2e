//! WGSL source builders for the blur pipelines.
//!
//! This module handles:
//! - The shared fullscreen-triangle vertex stage and `Params` uniform
//! - The four blur fragment kernels and the resampling blit
//! - The cascade downsample compute kernel
//!
//! All sources are assembled as strings so tests can validate every
//! variant with naga without a GPU.

use crate::pass::BlurPhase;

/// Thread-group edge the compute kernel is compiled with. The dispatch
/// side re-reads it from the parsed module rather than trusting this
/// constant (see `gpu::BlurPipelines`).
pub const CASCADE_WORKGROUP_EDGE: u32 = 8;

/// Shared header: per-pass uniforms at group 0, input textures at group 1.
/// Upsample passes append the bloom side input at bindings 2/3.
fn fragment_common(with_bloom: bool) -> String {
    let mut common = r#"
struct Params {
    texel_size: vec2f,
    sample_scale: f32,
    _pad0: f32,
};

@group(0) @binding(0)
var<uniform> params: Params;

struct VSOut {
    @builtin(position) position: vec4f,
    @location(0) uv: vec2f,
};

@group(1) @binding(0)
var src_tex: texture_2d<f32>;
@group(1) @binding(1)
var src_samp: sampler;
"#
    .to_string();

    if with_bloom {
        common.push_str(
            r#"
@group(1) @binding(2)
var bloom_tex: texture_2d<f32>;
@group(1) @binding(3)
var bloom_samp: sampler;
"#,
        );
    }

    common
}

/// Fullscreen triangle driven by the vertex index; uv (0,0) is the top
/// left of the target.
fn fullscreen_vertex_entry() -> String {
    r#"
@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VSOut {
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);
    var out: VSOut;
    out.position = vec4f(x * 2.0 - 1.0, 1.0 - y * 2.0, 0.0, 1.0);
    out.uv = vec2f(x, y);
    return out;
}
"#
    .to_string()
}

fn fullscreen_module(with_bloom: bool, fragment_body: &str) -> String {
    let common = fragment_common(with_bloom);
    let vertex = fullscreen_vertex_entry();
    let fragment = format!(
        r#"
@fragment
fn fs_main(in: VSOut) -> @location(0) vec4f {{
    {fragment_body}
}}
"#
    );
    format!("{common}{vertex}{fragment}")
}

/// Build the complete module (vertex + fragment) for one blur phase.
pub fn build_blur_phase_module(phase: BlurPhase) -> String {
    let body = match phase {
        BlurPhase::Downsample13 => DOWNSAMPLE_13_BODY,
        BlurPhase::Downsample4 => DOWNSAMPLE_4_BODY,
        BlurPhase::UpsampleTent => UPSAMPLE_TENT_BODY,
        BlurPhase::UpsampleBox => UPSAMPLE_BOX_BODY,
    };
    fullscreen_module(phase.is_upsample(), body)
}

/// Build the plain resampling blit module (bilinear, implicit resize).
pub fn build_blit_module() -> String {
    fullscreen_module(
        false,
        r#"return textureSampleLevel(src_tex, src_samp, in.uv, 0.0);"#,
    )
}

// 13-tap box: a 4-tap inner box at half-texel offsets weighted 0.5 plus
// four overlapping 4-tap outer boxes weighted 0.125 each, all normalized
// by 0.25.
const DOWNSAMPLE_13_BODY: &str = r#"
let ts = params.texel_size;
let uv = in.uv;

let a = textureSampleLevel(src_tex, src_samp, uv + ts * vec2f(-1.0, -1.0), 0.0);
let b = textureSampleLevel(src_tex, src_samp, uv + ts * vec2f(0.0, -1.0), 0.0);
let c = textureSampleLevel(src_tex, src_samp, uv + ts * vec2f(1.0, -1.0), 0.0);
let d = textureSampleLevel(src_tex, src_samp, uv + ts * vec2f(-0.5, -0.5), 0.0);
let e = textureSampleLevel(src_tex, src_samp, uv + ts * vec2f(0.5, -0.5), 0.0);
let f = textureSampleLevel(src_tex, src_samp, uv + ts * vec2f(-1.0, 0.0), 0.0);
let g = textureSampleLevel(src_tex, src_samp, uv, 0.0);
let h = textureSampleLevel(src_tex, src_samp, uv + ts * vec2f(1.0, 0.0), 0.0);
let i = textureSampleLevel(src_tex, src_samp, uv + ts * vec2f(-0.5, 0.5), 0.0);
let j = textureSampleLevel(src_tex, src_samp, uv + ts * vec2f(0.5, 0.5), 0.0);
let k = textureSampleLevel(src_tex, src_samp, uv + ts * vec2f(-1.0, 1.0), 0.0);
let l = textureSampleLevel(src_tex, src_samp, uv + ts * vec2f(0.0, 1.0), 0.0);
let m = textureSampleLevel(src_tex, src_samp, uv + ts * vec2f(1.0, 1.0), 0.0);

var acc = (d + e + i + j) * 0.125;
acc = acc + (a + b + f + g) * 0.03125;
acc = acc + (b + c + g + h) * 0.03125;
acc = acc + (f + g + k + l) * 0.03125;
acc = acc + (g + h + l + m) * 0.03125;
return acc;
"#;

const DOWNSAMPLE_4_BODY: &str = r#"
let d = params.texel_size.xyxy * vec4f(-1.0, -1.0, 1.0, 1.0);

var acc = textureSampleLevel(src_tex, src_samp, in.uv + d.xy, 0.0);
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv + d.zy, 0.0);
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv + d.xw, 0.0);
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv + d.zw, 0.0);
return acc * 0.25;
"#;

// 9-tap tent over the low-res accumulator, widened by sample_scale, plus
// the same-resolution bloom side input.
const UPSAMPLE_TENT_BODY: &str = r#"
let d = params.texel_size.xyxy * vec4f(1.0, 1.0, -1.0, 0.0) * params.sample_scale;

var acc = textureSampleLevel(src_tex, src_samp, in.uv - d.xy, 0.0);
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv - d.wy, 0.0) * 2.0;
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv - d.zy, 0.0);
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv + d.zw, 0.0) * 2.0;
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv, 0.0) * 4.0;
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv + d.xw, 0.0) * 2.0;
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv + d.zy, 0.0);
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv + d.wy, 0.0) * 2.0;
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv + d.xy, 0.0);

let lowres = acc * (1.0 / 16.0);
return lowres + textureSampleLevel(bloom_tex, bloom_samp, in.uv, 0.0);
"#;

const UPSAMPLE_BOX_BODY: &str = r#"
let d = params.texel_size.xyxy * vec4f(-1.0, -1.0, 1.0, 1.0) * (params.sample_scale * 0.5);

var acc = textureSampleLevel(src_tex, src_samp, in.uv + d.xy, 0.0);
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv + d.zy, 0.0);
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv + d.xw, 0.0);
acc = acc + textureSampleLevel(src_tex, src_samp, in.uv + d.zw, 0.0);

let lowres = acc * 0.25;
return lowres + textureSampleLevel(bloom_tex, bloom_samp, in.uv, 0.0);
"#;

/// Build the cascade downsample compute kernel.
///
/// One thread per destination pixel; `size` carries
/// `(width, height, 1/width, 1/height)` of the destination. Four bilinear
/// taps at quarter-texel offsets approximate a small Gaussian footprint.
pub fn build_cascade_downsample_module() -> String {
    format!(
        r#"
struct SizeParams {{
    size: vec4f,
}};

@group(0) @binding(0)
var<uniform> params: SizeParams;
@group(0) @binding(1)
var src_tex: texture_2d<f32>;
@group(0) @binding(2)
var src_samp: sampler;
@group(0) @binding(3)
var dst_tex: texture_storage_2d<rgba16float, write>;

@compute @workgroup_size({edge}, {edge}, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {{
    if (f32(gid.x) >= params.size.x || f32(gid.y) >= params.size.y) {{
        return;
    }}

    let uv = (vec2f(gid.xy) + vec2f(0.5)) * params.size.zw;
    let d = params.size.zwzw * vec4f(-0.25, -0.25, 0.25, 0.25);

    var acc = textureSampleLevel(src_tex, src_samp, uv + d.xy, 0.0);
    acc = acc + textureSampleLevel(src_tex, src_samp, uv + d.zy, 0.0);
    acc = acc + textureSampleLevel(src_tex, src_samp, uv + d.xw, 0.0);
    acc = acc + textureSampleLevel(src_tex, src_samp, uv + d.zw, 0.0);

    textureStore(dst_tex, vec2<i32>(gid.xy), acc * 0.25);
}}
"#,
        edge = CASCADE_WORKGROUP_EDGE
    )
}
