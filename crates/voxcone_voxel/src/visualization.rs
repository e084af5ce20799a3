//! Drawing of the occupied voxels as instanced cubes.

use crate::{
    config::{VisualizationConfig, VisualizationTargetConfig},
    shader_templates::visualization::{
        VisualizationCompactionShaderTemplate, VisualizationDrawShaderTemplate,
        VisualizationResetShaderTemplate,
    },
    uniform::VoxelFrameUniforms,
    volume::{VOLUME_WORKGROUP_SIZE, VoxelVolume},
};
use anyhow::{Context, Result, bail};
use bytemuck::{Pod, Zeroable};
use std::{borrow::Cow, mem};
use voxcone_gpu::{
    buffer::{GPUBuffer, GPUBufferType, read_buffer_bytes},
    compute::{create_compute_pipeline, create_compute_pipeline_layout, workgroup_count},
    device::GraphicsDevice,
    indirect::DrawIndexedIndirectArgs,
    render::{
        create_render_pipeline, create_render_pipeline_layout,
        depth_stencil_state_for_depth_test_and_write,
    },
    shader::template::SpecificShaderTemplate,
    storage::create_storage_buffer_bind_group_layout_entry,
    texture::create_texture_bind_group_layout_entry,
    wgpu,
};

/// Vertex attribute locations in the visualization draw shader.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CubeVertexAttributeLocation {
    CubePosition = 0,
    InstancePosition = 1,
    InstanceColor = 2,
}

/// World-space center and color of one drawn voxel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelInstance {
    pub position: [f32; 3],
    pub color: [u8; 4],
}

/// Corner of the unit cube drawn for each voxel, centered on the origin.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
struct CubeVertex {
    position: [f32; 3],
}

/// Draws one cube per occupied voxel without any host involvement.
///
/// A reset kernel zeroes the instance count of the indirect draw arguments,
/// after which a compaction kernel scans the base level of the volume and
/// appends the center and color of every occupied voxel to the instance
/// buffers, bumping the instance count. The draw call then reads the count
/// from the same arguments. Voxels beyond the instance capacity are skipped.
#[derive(Debug)]
pub struct SparseVoxelVisualizer {
    instance_capacity: u32,
    voxels_per_side: u32,
    cube_vertex_buffer: GPUBuffer,
    cube_index_buffer: GPUBuffer,
    instance_positions: GPUBuffer,
    instance_colors: GPUBuffer,
    draw_args: GPUBuffer,
    instance_bind_group: wgpu::BindGroup,
    reset_pipeline: wgpu::ComputePipeline,
    compaction_pipeline: wgpu::ComputePipeline,
    draw_pipeline: wgpu::RenderPipeline,
}

#[rustfmt::skip]
const CUBE_INDICES: [u16; 36] = [
    0, 2, 1,  1, 2, 3, // -z
    4, 5, 6,  5, 7, 6, // +z
    0, 4, 2,  2, 4, 6, // -x
    1, 3, 5,  3, 7, 5, // +x
    0, 1, 4,  1, 5, 4, // -y
    2, 6, 3,  3, 6, 7, // +y
];

impl CubeVertexAttributeLocation {
    const fn location(self) -> u32 {
        self as u32
    }
}

impl SparseVoxelVisualizer {
    pub const fn volume_binding() -> u32 {
        0
    }

    pub const fn draw_args_binding() -> u32 {
        1
    }

    pub const fn positions_binding() -> u32 {
        2
    }

    pub const fn colors_binding() -> u32 {
        3
    }

    /// Creates the instance buffers and the reset, compaction and draw
    /// pipelines. The draw pipeline renders into targets with the given
    /// formats.
    ///
    /// # Errors
    /// Returns an error if the instance capacity is zero or a shader fails to
    /// compile.
    pub fn new(
        graphics_device: &GraphicsDevice,
        config: &VisualizationConfig,
        target: &VisualizationTargetConfig,
        uniforms: &VoxelFrameUniforms,
        volume: &VoxelVolume,
    ) -> Result<Self> {
        let device = graphics_device.device();

        let instance_capacity = config.instance_capacity;
        if instance_capacity == 0 {
            bail!("Voxel visualization instance capacity must be positive");
        }

        log::info!("Creating sparse voxel visualizer with room for {instance_capacity} instances");

        let cube_vertices = cube_vertices();
        let cube_vertex_bytes = bytemuck::cast_slice(&cube_vertices);
        let cube_vertex_buffer = GPUBuffer::new(
            graphics_device,
            cube_vertex_bytes,
            GPUBufferType::Vertex.usage(),
            Cow::Borrowed("Voxel cube vertex"),
        );

        let cube_index_bytes = bytemuck::cast_slice(&CUBE_INDICES);
        let cube_index_buffer = GPUBuffer::new(
            graphics_device,
            cube_index_bytes,
            GPUBufferType::Index.usage(),
            Cow::Borrowed("Voxel cube index"),
        );

        let instance_positions = GPUBuffer::new_storage_buffer_with_capacity::<[f32; 4]>(
            graphics_device,
            instance_capacity as usize,
            wgpu::BufferUsages::VERTEX,
            Cow::Borrowed("Voxel instance positions"),
        );

        let instance_colors = GPUBuffer::new_storage_buffer_with_capacity::<u32>(
            graphics_device,
            instance_capacity as usize,
            wgpu::BufferUsages::VERTEX,
            Cow::Borrowed("Voxel instance colors"),
        );

        let draw_args = GPUBuffer::new_draw_indexed_indirect_buffer(
            graphics_device,
            &[DrawIndexedIndirectArgs {
                index_count: CUBE_INDICES.len() as u32,
                ..Default::default()
            }],
            Cow::Borrowed("Voxel visualization draw arguments"),
        );

        let instance_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[
                    create_texture_bind_group_layout_entry(
                        Self::volume_binding(),
                        wgpu::ShaderStages::COMPUTE,
                        wgpu::TextureSampleType::Float { filterable: false },
                        wgpu::TextureViewDimension::D3,
                    ),
                    create_storage_buffer_bind_group_layout_entry(
                        Self::draw_args_binding(),
                        wgpu::ShaderStages::COMPUTE,
                        false,
                    ),
                    create_storage_buffer_bind_group_layout_entry(
                        Self::positions_binding(),
                        wgpu::ShaderStages::COMPUTE,
                        false,
                    ),
                    create_storage_buffer_bind_group_layout_entry(
                        Self::colors_binding(),
                        wgpu::ShaderStages::COMPUTE,
                        false,
                    ),
                ],
                label: Some("Voxel visualization instance bind group layout"),
            });

        let instance_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &instance_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: Self::volume_binding(),
                    resource: wgpu::BindingResource::TextureView(volume.sampled_view(0)),
                },
                draw_args.create_bind_group_entry(Self::draw_args_binding()),
                instance_positions.create_bind_group_entry(Self::positions_binding()),
                instance_colors.create_bind_group_entry(Self::colors_binding()),
            ],
            label: Some("Voxel visualization instance bind group"),
        });

        let reset_shader = VisualizationResetShaderTemplate
            .compile(graphics_device)
            .context("Failed to compile voxel visualization reset shader")?;

        let reset_pipeline = create_compute_pipeline(
            device,
            &create_compute_pipeline_layout(
                device,
                &[&instance_bind_group_layout],
                &[],
                "Voxel visualization reset pipeline layout",
            ),
            &reset_shader,
            "main",
            "Voxel visualization reset pipeline",
        );

        let compaction_shader = VisualizationCompactionShaderTemplate::new(instance_capacity)
            .compile(graphics_device)
            .context("Failed to compile voxel visualization compaction shader")?;

        let compaction_pipeline = create_compute_pipeline(
            device,
            &create_compute_pipeline_layout(
                device,
                &[uniforms.grid_bind_group_layout(), &instance_bind_group_layout],
                &[],
                "Voxel visualization compaction pipeline layout",
            ),
            &compaction_shader,
            "main",
            "Voxel visualization compaction pipeline",
        );

        let draw_shader = VisualizationDrawShaderTemplate
            .compile(graphics_device)
            .context("Failed to compile voxel visualization draw shader")?;

        let draw_pipeline = create_render_pipeline(
            device,
            &create_render_pipeline_layout(
                device,
                &[uniforms.camera_bind_group_layout()],
                &[],
                "Voxel visualization draw pipeline layout",
            ),
            &draw_shader,
            &[
                wgpu::VertexBufferLayout {
                    array_stride: mem::size_of::<CubeVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: CubeVertexAttributeLocation::CubePosition.location(),
                    }],
                },
                wgpu::VertexBufferLayout {
                    array_stride: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &[wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x4,
                        offset: 0,
                        shader_location: CubeVertexAttributeLocation::InstancePosition.location(),
                    }],
                },
                wgpu::VertexBufferLayout {
                    array_stride: mem::size_of::<u32>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &[wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Unorm8x4,
                        offset: 0,
                        shader_location: CubeVertexAttributeLocation::InstanceColor.location(),
                    }],
                },
            ],
            &[Some(wgpu::ColorTargetState {
                format: target.color_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            Some(wgpu::Face::Back),
            false,
            target
                .depth_format
                .map(depth_stencil_state_for_depth_test_and_write),
            "Voxel visualization draw pipeline",
        )?;

        Ok(Self {
            instance_capacity,
            voxels_per_side: volume.resolution().voxels_per_side(),
            cube_vertex_buffer,
            cube_index_buffer,
            instance_positions,
            instance_colors,
            draw_args,
            instance_bind_group,
            reset_pipeline,
            compaction_pipeline,
            draw_pipeline,
        })
    }

    pub fn instance_capacity(&self) -> u32 {
        self.instance_capacity
    }

    /// Records a compute pass zeroing the instance count.
    pub fn record_reset(&self, command_encoder: &mut wgpu::CommandEncoder) {
        let mut compute_pass = command_encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Voxel visualization reset pass"),
            timestamp_writes: None,
        });

        compute_pass.set_pipeline(&self.reset_pipeline);
        compute_pass.set_bind_group(0, &self.instance_bind_group, &[]);

        log::trace!("Dispatching voxel visualization reset");
        compute_pass.dispatch_workgroups(1, 1, 1);
    }

    /// Records a compute pass appending every occupied voxel of the base
    /// level to the instance buffers, using the grid uniform of the given
    /// frame.
    pub fn record_compaction(
        &self,
        command_encoder: &mut wgpu::CommandEncoder,
        uniforms: &VoxelFrameUniforms,
        frame_index: usize,
    ) {
        let groups = workgroup_count(self.voxels_per_side, VOLUME_WORKGROUP_SIZE);

        let mut compute_pass = command_encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Voxel visualization compaction pass"),
            timestamp_writes: None,
        });

        compute_pass.set_pipeline(&self.compaction_pipeline);
        compute_pass.set_bind_group(0, uniforms.grid_bind_group(frame_index), &[]);
        compute_pass.set_bind_group(1, &self.instance_bind_group, &[]);

        log::trace!("Dispatching voxel visualization compaction with {groups}^3 workgroups");
        compute_pass.dispatch_workgroups(groups, groups, groups);
    }

    /// Records the indirect instanced draw of the compacted voxels into the
    /// given render pass, using the camera uniform of the given frame.
    pub fn record_draw(
        &self,
        render_pass: &mut wgpu::RenderPass<'_>,
        uniforms: &VoxelFrameUniforms,
        frame_index: usize,
    ) {
        render_pass.set_pipeline(&self.draw_pipeline);
        render_pass.set_bind_group(0, uniforms.camera_bind_group(frame_index), &[]);
        render_pass.set_vertex_buffer(0, self.cube_vertex_buffer.slice());
        render_pass.set_vertex_buffer(1, self.instance_positions.buffer().slice(..));
        render_pass.set_vertex_buffer(2, self.instance_colors.buffer().slice(..));
        render_pass.set_index_buffer(
            self.cube_index_buffer.slice(),
            wgpu::IndexFormat::Uint16,
        );
        render_pass.draw_indexed_indirect(self.draw_args.buffer(), 0);
    }

    /// Reads back the instance count of the draw arguments, waiting for all
    /// previously submitted work to finish.
    ///
    /// # Errors
    /// Returns an error if the readback fails.
    pub fn read_instance_count(&self, graphics_device: &GraphicsDevice) -> Result<u32> {
        let bytes = read_buffer_bytes(
            graphics_device,
            self.draw_args.buffer(),
            DrawIndexedIndirectArgs::INSTANCE_COUNT_OFFSET,
            mem::size_of::<u32>(),
            Cow::Borrowed("Voxel visualization instance count"),
        )?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    /// Reads back the compacted instances, in slot order.
    ///
    /// # Errors
    /// Returns an error if a readback fails.
    pub fn read_instances(&self, graphics_device: &GraphicsDevice) -> Result<Vec<VoxelInstance>> {
        let count = self.read_instance_count(graphics_device)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let count = count as usize;

        let position_bytes = read_buffer_bytes(
            graphics_device,
            self.instance_positions.buffer(),
            0,
            count * mem::size_of::<[f32; 4]>(),
            Cow::Borrowed("Voxel instance positions"),
        )?;
        let color_bytes = read_buffer_bytes(
            graphics_device,
            self.instance_colors.buffer(),
            0,
            count * mem::size_of::<u32>(),
            Cow::Borrowed("Voxel instance colors"),
        )?;

        let positions: Vec<[f32; 4]> = bytemuck::pod_collect_to_vec(&position_bytes);
        let colors: Vec<[u8; 4]> = bytemuck::pod_collect_to_vec(&color_bytes);

        Ok(positions
            .into_iter()
            .zip(colors)
            .map(|([x, y, z, _], color)| VoxelInstance {
                position: [x, y, z],
                color,
            })
            .collect())
    }
}

fn cube_vertices() -> [CubeVertex; 8] {
    std::array::from_fn(|corner| {
        let offset = |bit: usize| if corner & (1 << bit) == 0 { -0.5 } else { 0.5 };
        CubeVertex {
            position: [offset(0), offset(1), offset(2)],
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn should_wind_every_cube_face_outward() {
        let vertices = cube_vertices().map(|vertex| Vector3::from(vertex.position));

        for triangle in CUBE_INDICES.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| vertices[triangle[i] as usize]);
            let normal = (b - a).cross(&(c - a));
            let centroid = (a + b + c) / 3.0;
            assert!(
                normal.dot(&centroid) > 0.0,
                "Triangle {triangle:?} faces inward"
            );
        }
    }

    #[test]
    fn should_use_every_cube_corner() {
        for corner in 0..8 {
            assert!(CUBE_INDICES.contains(&corner));
        }
    }

    #[test]
    fn should_place_cube_corners_at_half_unit_offsets() {
        let vertices = cube_vertices();
        assert_eq!(vertices[0].position, [-0.5, -0.5, -0.5]);
        assert_eq!(vertices[7].position, [0.5, 0.5, 0.5]);
        assert_eq!(vertices[2].position, [-0.5, 0.5, -0.5]);
    }
}
