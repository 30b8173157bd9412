//! Render pipelines of the two programs.
//!
//! Both programs share one pipeline layout: group 0 holds the per-draw matrices
//! behind a dynamic offset, group 1 the texture and its sampler. Pipelines are
//! created on first use for every program and topology combination.

use std::collections::HashMap;

use crate::gpu::{Program, Topology};

pub mod basic;
pub mod imported;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub program: Program,
    pub topology: Topology,
    /// Only set for indexed strip draws.
    pub strip_index_format: Option<wgpu::IndexFormat>,
}

#[derive(Debug)]
pub struct Pipelines {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
    layout: wgpu::PipelineLayout,
    simple: wgpu::ShaderModule,
    imported: wgpu::ShaderModule,
    color_format: wgpu::TextureFormat,
    cache: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat, uniform_size: u64) -> Self {
        let uniform_layout = uniform_layout(device, uniform_size);
        let texture_layout = texture_layout(device);
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            immediate_size: 0,
        });

        Self {
            simple: device.create_shader_module(basic::shader()),
            imported: device.create_shader_module(imported::shader()),
            uniform_layout,
            texture_layout,
            layout,
            color_format,
            cache: HashMap::new(),
        }
    }

    /// Creates the pipeline for `key` unless it exists already.
    pub fn prepare(&mut self, device: &wgpu::Device, key: PipelineKey) {
        if self.cache.contains_key(&key) {
            return;
        }
        let shader = match key.program {
            Program::Simple => &self.simple,
            Program::Imported => &self.imported,
        };
        let pipeline = basic::mk_render_pipeline(
            device,
            &self.layout,
            self.color_format,
            shader,
            key.topology,
            key.strip_index_format,
        );
        log::debug!("created pipeline {key:?}");
        self.cache.insert(key, pipeline);
    }

    pub fn get(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.cache.get(key)
    }
}

pub fn uniform_layout(device: &wgpu::Device, uniform_size: u64) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(uniform_size),
            },
            count: None,
        }],
        label: Some("draw_uniforms_bind_group_layout"),
    })
}

pub fn texture_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: Some("texture_bind_group_layout"),
    })
}
