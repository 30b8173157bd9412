//! Program for imported fragments: the projection arrives folded into
//! `uModelViewProjection`. Shares vertex layout and bind groups with the
//! simple program.

pub fn shader() -> wgpu::ShaderModuleDescriptor<'static> {
    wgpu::ShaderModuleDescriptor {
        label: Some("Imported Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("imported.wgsl").into()),
    }
}
