//! The wgpu implementation of [`Gpu`].
//!
//! Resources are created immediately and stored in slotmaps keyed by their
//! handles. Per-frame calls only record state: every draw snapshots the current
//! program, matrices and texture binding into a draw list, and
//! [`Context::present`] encodes the whole list into one render pass.

use std::{collections::HashMap, sync::Arc};

use anyhow::Context as _;
use cgmath::{Matrix4, SquareMatrix};
use image::RgbaImage;
use slotmap::SlotMap;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    data_structures::texture::{self, Texture},
    gpu::{
        Gpu, IndexData, IndexFormat, Program, SamplerDesc, SamplerHandle, TextureHandle,
        Topology, Uniform, VertexArrayHandle, VertexStreams,
    },
    pipelines::{PipelineKey, Pipelines},
};

/// Matrices of one draw, laid out as `DrawUniforms` in the shaders.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawUniforms {
    view_model: [[f32; 4]; 4],
    projection: [[f32; 4]; 4],
    model_view_projection: [[f32; 4]; 4],
}

impl Default for DrawUniforms {
    fn default() -> Self {
        let identity = Matrix4::<f32>::identity().into();
        Self {
            view_model: identity,
            projection: identity,
            model_view_projection: identity,
        }
    }
}

const DRAW_UNIFORMS_SIZE: u64 = std::mem::size_of::<DrawUniforms>() as u64;

#[derive(Debug)]
struct VertexArray {
    positions: wgpu::Buffer,
    texcoords: wgpu::Buffer,
    normals: wgpu::Buffer,
    indices: Option<wgpu::Buffer>,
}

type TextureBinding = (TextureHandle, Option<SamplerHandle>);

#[derive(Clone, Copy, Debug)]
enum DrawCommand {
    Elements { count: u32, format: IndexFormat },
    Arrays { count: u32 },
}

#[derive(Clone, Copy, Debug)]
struct RecordedDraw {
    program: Program,
    topology: Topology,
    vertex_array: VertexArrayHandle,
    uniforms: DrawUniforms,
    texture: Option<TextureBinding>,
    command: DrawCommand,
}

impl RecordedDraw {
    fn pipeline_key(&self) -> PipelineKey {
        let strip = matches!(self.topology, Topology::LineStrip | Topology::TriangleStrip);
        let strip_index_format = match self.command {
            DrawCommand::Elements { format, .. } if strip => Some(index_format(format)),
            _ => None,
        };
        PipelineKey {
            program: self.program,
            topology: self.topology,
            strip_index_format,
        }
    }
}

/// Binding state and draws of the frame being recorded.
#[derive(Debug, Default)]
struct FrameRecorder {
    clear: bool,
    program: Program,
    vertex_array: Option<VertexArrayHandle>,
    uniforms: DrawUniforms,
    texture: Option<TextureBinding>,
    draws: Vec<RecordedDraw>,
}

impl FrameRecorder {
    fn record(&mut self, topology: Topology, command: DrawCommand) {
        let Some(vertex_array) = self.vertex_array else {
            log::warn!("draw call without a bound vertex array ignored");
            return;
        };
        self.draws.push(RecordedDraw {
            program: self.program,
            topology,
            vertex_array,
            uniforms: self.uniforms,
            texture: self.texture,
            command,
        });
    }
}

#[derive(Debug)]
pub struct Context {
    pub(crate) window: Arc<Window>,
    depth_texture: Texture,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pipelines: Pipelines,
    uniform_stride: u64,
    vertex_arrays: SlotMap<VertexArrayHandle, VertexArray>,
    textures: SlotMap<TextureHandle, Texture>,
    samplers: SlotMap<SamplerHandle, wgpu::Sampler>,
    bind_groups: HashMap<TextureBinding, wgpu::BindGroup>,
    white: wgpu::BindGroup,
    frame: FrameRecorder,
    clear_colour: wgpu::Color,
}

impl Context {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        log::info!("WGPU setup");
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone())?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                ..Default::default()
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let mut config = surface
            .get_default_config(&adapter, size.width.max(1), size.height.max(1))
            .context("surface is not supported by the adapter")?;
        // Shaders assume an sRGB surface; anything else comes out too dark.
        if let Some(format) = surface_caps.formats.iter().copied().find(|f| f.is_srgb()) {
            config.format = format;
        }
        surface.configure(&device, &config);

        let depth_texture = Texture::create_depth_texture(
            &device,
            [config.width, config.height],
            "depth_texture",
        );

        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment.max(1));
        let uniform_stride = DRAW_UNIFORMS_SIZE.div_ceil(alignment) * alignment;
        let pipelines = Pipelines::new(&device, config.format, DRAW_UNIFORMS_SIZE);

        let white_texture = Texture::create_white(&device, &queue);
        let white = texture_bind_group(
            &device,
            &pipelines.texture_layout,
            &white_texture.view,
            &white_texture.sampler,
            "white texture",
        );

        Ok(Self {
            window,
            depth_texture,
            surface,
            device,
            queue,
            config,
            pipelines,
            uniform_stride,
            vertex_arrays: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            bind_groups: HashMap::new(),
            white,
            frame: FrameRecorder::default(),
            clear_colour: wgpu::Color::WHITE,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn set_clear_colour(&mut self, [r, g, b, a]: [f64; 4]) {
        self.clear_colour = wgpu::Color { r, g, b, a };
    }

    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height.max(1) as f32
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth_texture =
            Texture::create_depth_texture(&self.device, [width, height], "depth_texture");
    }

    /// Reconfigures the surface after it was lost or outdated.
    pub fn reconfigure(&mut self) {
        self.resize(self.config.width, self.config.height);
    }

    /// Encodes and submits every draw recorded since the last present.
    pub fn present(&mut self) -> Result<(), wgpu::SurfaceError> {
        let frame = std::mem::take(&mut self.frame);
        for draw in &frame.draws {
            self.pipelines.prepare(&self.device, draw.pipeline_key());
        }

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let stride = self.uniform_stride as usize;
        let mut contents = vec![0u8; stride * frame.draws.len().max(1)];
        for (i, draw) in frame.draws.iter().enumerate() {
            contents[i * stride..i * stride + DRAW_UNIFORMS_SIZE as usize]
                .copy_from_slice(bytemuck::bytes_of(&draw.uniforms));
        }
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Draw Uniform Buffer"),
                contents: &contents,
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let uniform_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.pipelines.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(DRAW_UNIFORMS_SIZE),
                }),
            }],
            label: Some("draw_uniforms_bind_group"),
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let (colour_load, depth_load) = if frame.clear {
                (wgpu::LoadOp::Clear(self.clear_colour), wgpu::LoadOp::Clear(1.0))
            } else {
                (wgpu::LoadOp::Load, wgpu::LoadOp::Load)
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: colour_load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for (i, draw) in frame.draws.iter().enumerate() {
                let (Some(pipeline), Some(vertex_array)) = (
                    self.pipelines.get(&draw.pipeline_key()),
                    self.vertex_arrays.get(draw.vertex_array),
                ) else {
                    continue;
                };
                let textures = draw
                    .texture
                    .and_then(|binding| self.bind_groups.get(&binding))
                    .unwrap_or(&self.white);

                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, &uniform_bind_group, &[(i * stride) as u32]);
                render_pass.set_bind_group(1, textures, &[]);
                render_pass.set_vertex_buffer(0, vertex_array.positions.slice(..));
                render_pass.set_vertex_buffer(1, vertex_array.texcoords.slice(..));
                render_pass.set_vertex_buffer(2, vertex_array.normals.slice(..));
                match (draw.command, &vertex_array.indices) {
                    (DrawCommand::Elements { count, format }, Some(indices)) => {
                        render_pass.set_index_buffer(indices.slice(..), index_format(format));
                        render_pass.draw_indexed(0..count, 0, 0..1);
                    }
                    (DrawCommand::Elements { .. }, None) => {
                        log::warn!("indexed draw on {:?} without indices", draw.vertex_array)
                    }
                    (DrawCommand::Arrays { count }, _) => render_pass.draw(0..count, 0..1),
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

impl Gpu for Context {
    fn create_vertex_array(
        &mut self,
        label: &str,
        streams: VertexStreams<'_>,
        indices: Option<IndexData<'_>>,
    ) -> VertexArrayHandle {
        let vertex_count = streams.vertex_count().max(1);
        let buffer = |name: &str, data: &[f32], width: usize| {
            // Missing or short streams are padded with zeros.
            let mut padded = data.to_vec();
            padded.resize(vertex_count * width, 0.0);
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{label} {name} Buffer")),
                    contents: bytemuck::cast_slice(&padded),
                    usage: wgpu::BufferUsages::VERTEX,
                })
        };
        let positions = buffer("Position", streams.positions, 3);
        let texcoords = buffer("Texcoord", streams.texcoords, 2);
        let normals = buffer("Normal", streams.normals, 3);

        let indices = indices.filter(|indices| !indices.is_empty()).map(|indices| {
            // Index buffers must be a multiple of four bytes long.
            let contents: Vec<u8> = match indices {
                IndexData::U16(data) => {
                    let mut data = data.to_vec();
                    if data.len() % 2 == 1 {
                        data.push(0);
                    }
                    bytemuck::cast_slice(&data).to_vec()
                }
                IndexData::U32(data) => bytemuck::cast_slice(data).to_vec(),
            };
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{label} Index Buffer")),
                    contents: &contents,
                    usage: wgpu::BufferUsages::INDEX,
                })
        });

        self.vertex_arrays.insert(VertexArray {
            positions,
            texcoords,
            normals,
            indices,
        })
    }

    fn create_texture(
        &mut self,
        label: &str,
        image: &RgbaImage,
        sampler: SamplerDesc,
    ) -> TextureHandle {
        let texture = Texture::from_image(&self.device, &self.queue, image, Some(label), &sampler);
        let bind_group = texture_bind_group(
            &self.device,
            &self.pipelines.texture_layout,
            &texture.view,
            &texture.sampler,
            label,
        );
        let handle = self.textures.insert(texture);
        self.bind_groups.insert((handle, None), bind_group);
        handle
    }

    fn create_sampler(&mut self, desc: SamplerDesc) -> SamplerHandle {
        self.samplers
            .insert(texture::create_sampler(&self.device, &desc))
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        let Some(buffers) = self.vertex_arrays.remove(vertex_array) else {
            log::warn!("{vertex_array:?} was already destroyed");
            return;
        };
        buffers.positions.destroy();
        buffers.texcoords.destroy();
        buffers.normals.destroy();
        if let Some(indices) = buffers.indices {
            indices.destroy();
        }
        if self.frame.vertex_array == Some(vertex_array) {
            self.frame.vertex_array = None;
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        let Some(image) = self.textures.remove(texture) else {
            log::warn!("{texture:?} was already destroyed");
            return;
        };
        image.texture.destroy();
        self.bind_groups.retain(|(bound, _), _| *bound != texture);
        if self.frame.texture.is_some_and(|(bound, _)| bound == texture) {
            self.frame.texture = None;
        }
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        if self.samplers.remove(sampler).is_none() {
            log::warn!("{sampler:?} was already destroyed");
            return;
        }
        self.bind_groups.retain(|(_, bound), _| *bound != Some(sampler));
        if self.frame.texture.is_some_and(|(_, bound)| bound == Some(sampler)) {
            self.frame.texture = None;
        }
    }

    fn use_program(&mut self, program: Program) {
        self.frame.program = program;
    }

    fn clear(&mut self) {
        self.frame.clear = true;
        self.frame.draws.clear();
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.frame.vertex_array = Some(vertex_array);
    }

    fn set_matrix(&mut self, uniform: Uniform, matrix: &Matrix4<f32>) {
        let slot = match uniform {
            Uniform::ViewModel => &mut self.frame.uniforms.view_model,
            Uniform::Projection => &mut self.frame.uniforms.projection,
            Uniform::ModelViewProjection => &mut self.frame.uniforms.model_view_projection,
            Uniform::Texture | Uniform::BaseColorTexture => {
                log::warn!("{} is not a matrix uniform", uniform.name());
                return;
            }
        };
        *slot = (*matrix).into();
    }

    fn bind_texture(
        &mut self,
        uniform: Uniform,
        texture: TextureHandle,
        sampler: Option<SamplerHandle>,
    ) {
        if !matches!(uniform, Uniform::Texture | Uniform::BaseColorTexture) {
            log::warn!("{} is not a texture uniform", uniform.name());
            return;
        }
        let binding = (texture, sampler);
        if !self.bind_groups.contains_key(&binding) {
            let (Some(image), Some(sampler)) = (
                self.textures.get(texture),
                sampler.and_then(|s| self.samplers.get(s)),
            ) else {
                log::warn!("cannot bind {texture:?} with {sampler:?}");
                return;
            };
            let bind_group = texture_bind_group(
                &self.device,
                &self.pipelines.texture_layout,
                &image.view,
                sampler,
                "sampled texture",
            );
            self.bind_groups.insert(binding, bind_group);
        }
        self.frame.texture = Some(binding);
    }

    fn draw_elements(&mut self, topology: Topology, count: u32, format: IndexFormat) {
        self.frame
            .record(topology, DrawCommand::Elements { count, format });
    }

    fn draw_arrays(&mut self, topology: Topology, count: u32) {
        self.frame.record(topology, DrawCommand::Arrays { count });
    }
}

fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::U16 => wgpu::IndexFormat::Uint16,
        IndexFormat::U32 => wgpu::IndexFormat::Uint32,
    }
}

fn texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
        label: Some(label),
    })
}
