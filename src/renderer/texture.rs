use super::{PlaneUpload, TextureTarget};
use crate::core::{PlayerError, Result};
use eframe::egui_wgpu::{self, wgpu};
use log::info;
use std::sync::Arc;

/// Y/U/V 三个 R8 平面组成的视频纹理
///
/// 管线和绑定组放在 egui_wgpu 的 `callback_resources` 里，由 `YuvPaintCallback` 绘制。
pub struct YuvTexture {
    queue: Arc<wgpu::Queue>,
    renderer: Arc<egui::mutex::RwLock<egui_wgpu::Renderer>>,
    planes: [wgpu::Texture; 3],
    width: u32,
    height: u32,
}

/// 绘制时用到的 GPU 资源
struct YuvResources {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
}

impl YuvTexture {
    pub fn new(render_state: &egui_wgpu::RenderState, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PlayerError::RenderError(format!(
                "无效的纹理尺寸: {}x{}",
                width, height
            )));
        }

        info!("🆕 创建 YUV 纹理: {}x{}", width, height);
        let device = &render_state.device;
        let (chroma_width, chroma_height) = (width.div_ceil(2), height.div_ceil(2));

        let plane = |label: &str, w: u32, h: u32| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: w,
                    height: h,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::R8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        };
        let planes = [
            plane("Video Y Plane", width, height),
            plane("Video U Plane", chroma_width, chroma_height),
            plane("Video V Plane", chroma_width, chroma_height),
        ];

        let resources = create_resources(device, render_state.target_format, &planes);
        render_state
            .renderer
            .write()
            .callback_resources
            .insert(resources);

        Ok(Self {
            queue: render_state.queue.clone(),
            renderer: render_state.renderer.clone(),
            planes,
            width,
            height,
        })
    }

    fn write_plane(&self, index: usize, data: &[u8], pitch: usize) -> Result<()> {
        let texture = &self.planes[index];
        let (w, h) = (texture.width(), texture.height());
        let needed = pitch * (h as usize - 1) + w as usize;
        if pitch < w as usize || data.len() < needed {
            return Err(PlayerError::RenderError(format!(
                "平面 {} 数据不足: pitch {} 长度 {} (需要 {}x{})",
                index,
                pitch,
                data.len(),
                w,
                h
            )));
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(pitch as u32),
                rows_per_image: Some(h),
            },
            wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }
}

impl TextureTarget for YuvTexture {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn update_planes(&mut self, planes: [PlaneUpload<'_>; 3]) -> Result<()> {
        for (index, plane) in planes.iter().enumerate() {
            self.write_plane(index, plane.data, plane.pitch)?;
        }
        Ok(())
    }

    /// 连续 I420：Y 平面之后紧跟 U、V，色度 pitch 为亮度的一半
    fn update_packed(&mut self, data: &[u8], pitch: usize) -> Result<()> {
        let luma = pitch * self.height as usize;
        let chroma_pitch = pitch / 2;
        let chroma = chroma_pitch * self.height.div_ceil(2) as usize;

        if data.len() < luma + chroma * 2 {
            return Err(PlayerError::RenderError(format!(
                "非平面缓冲长度不足: {} < {}",
                data.len(),
                luma + chroma * 2
            )));
        }

        self.write_plane(0, &data[..luma], pitch)?;
        self.write_plane(1, &data[luma..luma + chroma], chroma_pitch)?;
        self.write_plane(2, &data[luma + chroma..luma + chroma * 2], chroma_pitch)
    }
}

impl Drop for YuvTexture {
    fn drop(&mut self) {
        self.renderer
            .write()
            .callback_resources
            .remove::<YuvResources>();
        for plane in &self.planes {
            plane.destroy();
        }
        info!("🧹 YUV 纹理已销毁");
    }
}

fn create_resources(
    device: &wgpu::Device,
    target_format: wgpu::TextureFormat,
    planes: &[wgpu::Texture; 3],
) -> YuvResources {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("YUV Shader"),
        source: wgpu::ShaderSource::Wgsl(super::shader::YUV_TO_RGB_SHADER.into()),
    });

    let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("YUV Bind Group Layout"),
        entries: &[
            texture_entry(0),
            texture_entry(1),
            texture_entry(2),
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("YUV Pipeline Layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("YUV Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: "vs_main",
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    });

    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    let views = [&planes[0], &planes[1], &planes[2]]
        .map(|plane| plane.create_view(&wgpu::TextureViewDescriptor::default()));

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("YUV Bind Group"),
        layout: &bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&views[0]),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&views[1]),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&views[2]),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(&sampler),
            },
        ],
    });

    YuvResources {
        pipeline,
        bind_group,
    }
}

/// egui 绘制回调：把 YUV 纹理画到回调矩形里
pub struct YuvPaintCallback;

impl YuvPaintCallback {
    pub fn shape(rect: egui::Rect) -> egui::PaintCallback {
        egui_wgpu::Callback::new_paint_callback(rect, YuvPaintCallback)
    }
}

impl egui_wgpu::CallbackTrait for YuvPaintCallback {
    fn paint<'a>(
        &'a self,
        _info: egui::PaintCallbackInfo,
        render_pass: &mut wgpu::RenderPass<'a>,
        callback_resources: &'a egui_wgpu::CallbackResources,
    ) {
        // 纹理尚未创建（或已销毁）时什么都不画
        let Some(resources) = callback_resources.get::<YuvResources>() else {
            return;
        };
        render_pass.set_pipeline(&resources.pipeline);
        render_pass.set_bind_group(0, &resources.bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}
