// src/gpu.rs
use std::sync::Arc;

use anyhow::Context;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::models::{CircleInstance, LineVertex, Vertex2D};
use crate::renderer::DrawSurface;
use crate::scene::FrameGeometry;
use crate::theme::Palette;
use crate::viewport::{Viewport, ViewportUniform};

const LINES_WGSL: &str = include_str!("./shaders/lines.wgsl");
const CIRCLES_WGSL: &str = include_str!("./shaders/circles.wgsl");

// Initial capacities; buffers grow on demand.
const INITIAL_CIRCLE_CAPACITY: usize = 256;
const INITIAL_LINE_VERTEX_CAPACITY: usize = 512;

/// The wgpu drawing surface behind the page (a window natively, the canvas on the web).
pub struct GpuSurface {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub is_surface_configured: bool,

    pub viewport: Viewport,
    pub viewport_buffer: wgpu::Buffer,
    pub viewport_bind_group: wgpu::BindGroup,
    pub needs_srgb_output_conversion: bool,

    pub line_render_pipeline: wgpu::RenderPipeline,
    pub circle_render_pipeline: wgpu::RenderPipeline,

    pub circle_instance_buffer: wgpu::Buffer,
    pub quad_vertex_buffer: wgpu::Buffer,
    pub quad_index_buffer: wgpu::Buffer,
    pub line_vertex_buffer: wgpu::Buffer,
}

impl GpuSurface {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<GpuSurface> {
        let size = window.inner_size();
        let scale_factor = window.scale_factor();

        let gpu = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::BROWSER_WEBGPU,
            ..Default::default()
        });

        // Surface itself is !Send on WASM due to HtmlCanvasElement
        let surface = gpu.create_surface(window).context("Failed to create drawing surface")?;

        let adapter = gpu
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No compatible GPU adapter")?;
        let adapter_info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Particle Field Device"),
                required_features: wgpu::Features::empty(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("Failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let texture_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("Surface reports no texture formats")?;
        if !texture_format.is_srgb() {
            log::warn!("No sRGB surface format found, falling back to {:?}", texture_format);
        }

        let needs_srgb_output_conversion = !texture_format.is_srgb();

        log::info!(
            "Using {} ({:?}, Target Format: {:?}), Needs Shader sRGB Output Conversion: {}",
            adapter_info.name,
            adapter_info.backend,
            texture_format,
            needs_srgb_output_conversion
        );

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: texture_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        let is_surface_configured = size.width > 0 && size.height > 0;
        if is_surface_configured {
            surface.configure(&device, &config);
        }

        let viewport = Viewport::new(config.width, config.height, scale_factor);
        let viewport_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Viewport Buffer"),
            contents: bytemuck::cast_slice(&[viewport.uniform(needs_srgb_output_conversion)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let viewport_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<ViewportUniform>() as u64),
                },
                count: None,
            }],
            label: Some("Viewport Bind Group Layout"),
        });

        let viewport_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &viewport_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: viewport_buffer.as_entire_binding(),
            }],
            label: Some("Viewport Bind Group"),
        });

        let lines_shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Lines Shader"),
            source: wgpu::ShaderSource::Wgsl(LINES_WGSL.into()),
        });

        let circles_shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Circles Shader"),
            source: wgpu::ShaderSource::Wgsl(CIRCLES_WGSL.into()),
        });

        let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[&viewport_bind_group_layout],
            push_constant_ranges: &[],
        });

        let line_render_pipeline = create_pipeline(
            &device,
            &render_pipeline_layout,
            &lines_shader_module,
            "Line Render Pipeline",
            &[LineVertex::layout()],
            wgpu::PrimitiveTopology::LineList,
            texture_format,
        );

        let circle_render_pipeline = create_pipeline(
            &device,
            &render_pipeline_layout,
            &circles_shader_module,
            "Circle Render Pipeline",
            &[Vertex2D::layout(), CircleInstance::layout()],
            wgpu::PrimitiveTopology::TriangleList,
            texture_format,
        );

        let circle_instance_buffer = create_vertex_buffer::<CircleInstance>(
            &device,
            "Circle Instance Buffer",
            INITIAL_CIRCLE_CAPACITY,
        );
        let line_vertex_buffer = create_vertex_buffer::<LineVertex>(
            &device,
            "Line Vertex Buffer",
            INITIAL_LINE_VERTEX_CAPACITY,
        );

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(Vertex2D::QUAD_VERTICES.as_slice()),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let quad_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Index Buffer"),
            contents: bytemuck::cast_slice(Vertex2D::QUAD_INDICES.as_slice()),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Self {
            surface, device, queue, config, is_surface_configured,
            viewport, viewport_buffer, viewport_bind_group, needs_srgb_output_conversion,
            line_render_pipeline, circle_render_pipeline,
            circle_instance_buffer, quad_vertex_buffer, quad_index_buffer,
            line_vertex_buffer,
        })
    }

    fn write_viewport_uniform(&self) {
        self.queue.write_buffer(
            &self.viewport_buffer,
            0,
            bytemuck::cast_slice(&[self.viewport.uniform(self.needs_srgb_output_conversion)]),
        );
    }

    fn upload_geometry(&mut self, geometry: &FrameGeometry) {
        let circle_data: &[u8] = bytemuck::cast_slice(&geometry.circles);
        if self.circle_instance_buffer.size() < circle_data.len() as u64 {
            self.circle_instance_buffer = create_vertex_buffer::<CircleInstance>(
                &self.device,
                "Circle Instance Buffer (Resized)",
                geometry.circles.len().next_power_of_two(),
            );
        }
        if !circle_data.is_empty() {
            self.queue.write_buffer(&self.circle_instance_buffer, 0, circle_data);
        }

        let line_data: &[u8] = bytemuck::cast_slice(&geometry.lines);
        if self.line_vertex_buffer.size() < line_data.len() as u64 {
            self.line_vertex_buffer = create_vertex_buffer::<LineVertex>(
                &self.device,
                "Line Vertex Buffer (Resized)",
                geometry.lines.len().next_power_of_two(),
            );
        }
        if !line_data.is_empty() {
            self.queue.write_buffer(&self.line_vertex_buffer, 0, line_data);
        }
    }
}

impl DrawSurface for GpuSurface {
    fn resize(&mut self, width: u32, height: u32, scale_factor: f64) {
        if width > 0 && height > 0 {
            log::info!("Resize {}, {} at scale {}", width, height, scale_factor);
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            self.viewport.resize(width, height, scale_factor);
            self.write_viewport_uniform();
            self.is_surface_configured = true;
        }
    }

    fn reconfigure(&mut self) {
        self.resize(self.config.width, self.config.height, self.viewport.scale_factor);
    }

    fn present(&mut self, geometry: &FrameGeometry, palette: &Palette) -> Result<(), wgpu::SurfaceError> {
        if !self.is_surface_configured {
            return Ok(());
        }

        self.upload_geometry(geometry);

        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Particle Frame Encoder"),
        });

        {
            // Full repaint every frame: no trails.
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Particle Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(palette.background.into_linear_wgpu_color()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, &self.viewport_bind_group, &[]);

            if !geometry.circles.is_empty() {
                render_pass.set_pipeline(&self.circle_render_pipeline);
                render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
                render_pass.set_vertex_buffer(1, self.circle_instance_buffer.slice(..));
                render_pass.set_index_buffer(self.quad_index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                render_pass.draw_indexed(
                    0..Vertex2D::QUAD_INDICES.len() as u32,
                    0,
                    0..geometry.circles.len() as u32,
                );
            }

            if !geometry.lines.is_empty() {
                render_pass.set_pipeline(&self.line_render_pipeline);
                render_pass.set_vertex_buffer(0, self.line_vertex_buffer.slice(..));
                render_pass.draw(0..geometry.lines.len() as u32, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

fn create_vertex_buffer<T>(device: &wgpu::Device, label: &str, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: (capacity.max(1) * std::mem::size_of::<T>()) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    label: &str,
    buffers: &[wgpu::VertexBufferLayout<'_>],
    topology: wgpu::PrimitiveTopology,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // The pixel projection flips y, which flips quad winding.
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}
