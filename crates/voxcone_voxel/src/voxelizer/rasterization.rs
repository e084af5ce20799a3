//! Voxelization by rasterizing triangles along their dominant axis.

use crate::{
    mesh::{MeshMaterial, MeshPushConstants, VoxelizableMesh},
    resolution::VoxelResolution,
    shader_templates::rasterization_voxelization::RasterizationVoxelizationShaderTemplate,
    uniform::VoxelFrameUniforms,
    volume::VoxelVolume,
};
use anyhow::{Context, Result};
use voxcone_gpu::{
    bind_group_layout::BindGroupLayoutRegistry,
    device::GraphicsDevice,
    push_constant::create_push_constant_range,
    render::{create_render_pipeline, create_render_pipeline_layout},
    shader::template::SpecificShaderTemplate,
    wgpu,
};

/// Format of the attachment the voxelization pass renders into. Nothing is
/// ever written to it, but a render pass needs at least one attachment to
/// define the viewport.
const DUMMY_ATTACHMENT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;

/// Voxelizer drawing every triangle with an orthographic projection along
/// the grid axis in which the triangle has the largest area, into an
/// `N x N` viewport. Each fragment corresponds to one voxel, which the
/// fragment stage writes to the volume.
///
/// Conservative rasterization is used when the device supports it, so that
/// thin triangles do not leave gaps.
#[derive(Debug)]
pub struct RasterizationVoxelizer {
    pipeline: wgpu::RenderPipeline,
    _dummy_attachment_texture: wgpu::Texture,
    dummy_attachment_view: wgpu::TextureView,
    conservative: bool,
}

impl RasterizationVoxelizer {
    /// Creates the voxelization pipeline for the given resolution.
    ///
    /// # Errors
    /// Returns an error if the shader fails to compile.
    pub fn new(
        graphics_device: &GraphicsDevice,
        bind_group_layout_registry: &BindGroupLayoutRegistry,
        resolution: VoxelResolution,
        uniforms: &VoxelFrameUniforms,
        volume: &VoxelVolume,
    ) -> Result<Self> {
        let device = graphics_device.device();
        let voxels_per_side = resolution.voxels_per_side();

        let conservative =
            graphics_device.supports_features(wgpu::Features::CONSERVATIVE_RASTERIZATION);
        if !conservative {
            log::warn!(
                "Conservative rasterization is not supported, thin triangles may leave gaps in the voxelization"
            );
        }

        let dummy_attachment_texture = device.create_texture(&wgpu::TextureDescriptor {
            size: wgpu::Extent3d {
                width: voxels_per_side,
                height: voxels_per_side,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DUMMY_ATTACHMENT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
            label: Some("Voxelization dummy attachment texture"),
        });
        let dummy_attachment_view =
            dummy_attachment_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let geometry_layout = VoxelizableMesh::get_or_create_geometry_bind_group_layout(
            graphics_device,
            bind_group_layout_registry,
        );
        let material_layout =
            MeshMaterial::get_or_create_bind_group_layout(graphics_device, bind_group_layout_registry);

        let pipeline_layout = create_render_pipeline_layout(
            device,
            &[
                uniforms.grid_bind_group_layout(),
                volume.base_level_bind_group_layout(),
                &geometry_layout,
                &material_layout,
            ],
            &[create_push_constant_range::<MeshPushConstants>(
                wgpu::ShaderStages::VERTEX,
            )],
            "Rasterization voxelization pipeline layout",
        );

        let shader = RasterizationVoxelizationShaderTemplate::new(resolution)
            .compile(graphics_device)
            .context("Failed to compile rasterization voxelization shader")?;

        let pipeline = create_render_pipeline(
            device,
            &pipeline_layout,
            &shader,
            &[],
            &[Some(wgpu::ColorTargetState {
                format: DUMMY_ATTACHMENT_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::empty(),
            })],
            None,
            conservative,
            None,
            "Rasterization voxelization pipeline",
        )?;

        Ok(Self {
            pipeline,
            _dummy_attachment_texture: dummy_attachment_texture,
            dummy_attachment_view,
            conservative,
        })
    }

    /// Whether the pipeline uses conservative rasterization.
    pub fn is_conservative(&self) -> bool {
        self.conservative
    }

    /// Begins the voxelization render pass and binds the pipeline, the grid
    /// uniforms and the base level of the volume.
    pub fn begin_render_pass<'a>(
        &self,
        command_encoder: &'a mut wgpu::CommandEncoder,
        grid_bind_group: &wgpu::BindGroup,
        volume: &VoxelVolume,
    ) -> wgpu::RenderPass<'a> {
        let mut render_pass = command_encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.dummy_attachment_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Discard,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            label: Some("Rasterization voxelization pass"),
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, grid_bind_group, &[]);
        render_pass.set_bind_group(1, volume.base_level_bind_group(), &[]);

        render_pass
    }

    /// Records the draw call voxelizing the given mesh. The vertex stage
    /// fetches the vertices itself, so three vertices are drawn per triangle
    /// without any vertex buffers.
    pub fn record_mesh(&self, render_pass: &mut wgpu::RenderPass<'_>, mesh: &VoxelizableMesh) {
        render_pass.set_push_constants(
            wgpu::ShaderStages::VERTEX,
            0,
            bytemuck::bytes_of(&mesh.push_constants()),
        );
        render_pass.set_bind_group(2, mesh.geometry_bind_group(), &[]);
        render_pass.set_bind_group(3, mesh.material().bind_group(), &[]);
        render_pass.draw(0..3 * mesh.triangle_count(), 0..1);
    }
}
