/// YUV 到 RGB 转换的 Shader
///
/// 不需要顶点缓冲：用 vertex_index 生成覆盖整个视口的三角形。
pub const YUV_TO_RGB_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    // (0,0) (2,0) (0,2) 三个顶点，超出部分被视口裁掉
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOutput;
    out.clip_position = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.tex_coords = uv;
    return out;
}

@group(0) @binding(0) var y_texture: texture_2d<f32>;
@group(0) @binding(1) var u_texture: texture_2d<f32>;
@group(0) @binding(2) var v_texture: texture_2d<f32>;
@group(0) @binding(3) var texture_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    // 有限范围：Y 为 16..235，UV 为 16..240
    let y = (textureSample(y_texture, texture_sampler, in.tex_coords).r - 16.0 / 255.0) * 1.164383;
    let u = textureSample(u_texture, texture_sampler, in.tex_coords).r - 128.0 / 255.0;
    let v = textureSample(v_texture, texture_sampler, in.tex_coords).r - 128.0 / 255.0;

    // BT.601 YUV to RGB conversion
    let r = y + 1.596027 * v;
    let g = y - 0.391762 * u - 0.812968 * v;
    let b = y + 2.017232 * u;

    return vec4<f32>(clamp(vec3<f32>(r, g, b), vec3<f32>(0.0), vec3<f32>(1.0)), 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    /// 与着色器相同的换算，用来检查系数
    fn to_rgb(y: f32, u: f32, v: f32) -> [f32; 3] {
        let y = (y - 16.0 / 255.0) * 1.164383;
        let (u, v) = (u - 128.0 / 255.0, v - 128.0 / 255.0);
        [
            y + 1.596027 * v,
            y - 0.391762 * u - 0.812968 * v,
            y + 2.017232 * u,
        ]
    }

    #[test]
    fn test_limited_range_black_and_white() {
        let black = to_rgb(16.0 / 255.0, 128.0 / 255.0, 128.0 / 255.0);
        let white = to_rgb(235.0 / 255.0, 128.0 / 255.0, 128.0 / 255.0);
        assert!(black.iter().all(|c| c.abs() < 1e-4));
        assert!(white.iter().all(|c| (c - 1.0).abs() < 1e-3));
    }

    #[test]
    fn test_shader_uses_the_same_coefficients() {
        for constant in ["16.0 / 255.0", "1.164383", "1.596027", "0.391762", "0.812968", "2.017232"] {
            assert!(YUV_TO_RGB_SHADER.contains(constant), "缺少系数 {}", constant);
        }
        assert!(YUV_TO_RGB_SHADER.contains("fn vs_main"));
        assert!(YUV_TO_RGB_SHADER.contains("fn fs_main"));
    }
}
