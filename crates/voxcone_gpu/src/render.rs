//! Render pipelines.

use crate::shader::Shader;
use anyhow::{Result, anyhow};

pub const STANDARD_FRONT_FACE: wgpu::FrontFace = wgpu::FrontFace::Ccw;

pub fn create_render_pipeline_layout(
    device: &wgpu::Device,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    push_constant_ranges: &[wgpu::PushConstantRange],
    label: &str,
) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        bind_group_layouts,
        push_constant_ranges,
        label: Some(label),
    })
}

/// Creates a triangle list render pipeline for the vertex and fragment entry
/// points of the given shader.
///
/// # Errors
/// Returns an error if the shader has no vertex entry point.
pub fn create_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &Shader,
    vertex_buffer_layouts: &[wgpu::VertexBufferLayout<'_>],
    color_target_states: &[Option<wgpu::ColorTargetState>],
    cull_mode: Option<wgpu::Face>,
    conservative: bool,
    depth_stencil_state: Option<wgpu::DepthStencilState>,
    label: &str,
) -> Result<wgpu::RenderPipeline> {
    let vertex_entry_point = shader
        .vertex_entry_point_name()
        .ok_or_else(|| anyhow!("Shader for render pipeline {label} has no vertex entry point"))?;

    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader.module(),
            entry_point: Some(vertex_entry_point),
            buffers: vertex_buffer_layouts,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: shader
            .fragment_entry_point_name()
            .map(|entry_point| wgpu::FragmentState {
                module: shader.module(),
                entry_point: Some(entry_point),
                targets: color_target_states,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: STANDARD_FRONT_FACE,
            cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative,
        },
        depth_stencil: depth_stencil_state,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
        label: Some(label),
    }))
}

pub fn depth_stencil_state_for_depth_test_and_write(
    format: wgpu::TextureFormat,
) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format,
        depth_write_enabled: true,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}
