//! Voxelization with compute kernels, splitting the work between one
//! invocation per small triangle and one workgroup per part of each large
//! triangle.

use crate::{
    mesh::{MeshMaterial, MeshPushConstants, VoxelizableMesh},
    resolution::VoxelResolution,
    shader_templates::compute_voxelization::{
        LargeTriangleVoxelizationShaderTemplate, SMALL_TRIANGLE_WORKGROUP_SIZE,
        SmallTriangleVoxelizationShaderTemplate,
    },
    triangle::LARGE_TRIANGLE_CAPACITY,
    uniform::VoxelFrameUniforms,
    volume::VoxelVolume,
};
use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use std::borrow::Cow;
use voxcone_gpu::{
    bind_group_layout::BindGroupLayoutRegistry,
    buffer::{GPUBuffer, encode_buffer_to_buffer_copy_command, read_buffer_bytes},
    compute::{create_compute_pipeline, create_compute_pipeline_layout, workgroup_count},
    device::GraphicsDevice,
    indirect::DispatchIndirectArgs,
    push_constant::create_push_constant_range,
    shader::template::SpecificShaderTemplate,
    storage::create_storage_buffer_bind_group_layout_entry,
    wgpu,
};

/// The largest workgroup count wgpu accepts along one dispatch dimension by
/// default.
pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65535;

/// A range of inner triangles of one large triangle, voxelized by one
/// workgroup of the large-triangle pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct LargeTriangleRecord {
    pub triangle_index: u32,
    pub first_inner_triangle: u32,
}

/// The fixed-capacity buffer of [`LargeTriangleRecord`]s appended by the
/// small-triangle pass, together with the indirect dispatch arguments whose
/// workgroup count doubles as the record counter.
#[derive(Debug)]
pub struct LargeTriangleBuffers {
    records: GPUBuffer,
    dispatch_args: GPUBuffer,
    initial_dispatch_args: GPUBuffer,
    append_bind_group_layout: wgpu::BindGroupLayout,
    append_bind_group: wgpu::BindGroup,
    read_bind_group_layout: wgpu::BindGroupLayout,
    read_bind_group: wgpu::BindGroup,
}

/// Voxelizer running the two compute passes for every mesh.
///
/// The small-triangle pass runs one invocation per triangle. Triangles whose
/// clamped footprint spans at most a few voxels along every axis are
/// voxelized directly. Larger triangles are subdivided into smaller inner
/// triangles, and records covering them are appended to the
/// [`LargeTriangleBuffers`]. The large-triangle pass is then dispatched
/// indirectly with one workgroup per record, so the host never needs to know
/// how many large triangles there were.
#[derive(Debug)]
pub struct ComputeVoxelizer {
    large_triangle_buffers: LargeTriangleBuffers,
    small_triangle_pipeline: wgpu::ComputePipeline,
    large_triangle_pipeline: wgpu::ComputePipeline,
}

impl LargeTriangleBuffers {
    pub const fn records_binding() -> u32 {
        0
    }

    pub const fn dispatch_args_binding() -> u32 {
        1
    }

    pub fn new(graphics_device: &GraphicsDevice) -> Self {
        let device = graphics_device.device();

        let records = GPUBuffer::new_storage_buffer_with_capacity::<LargeTriangleRecord>(
            graphics_device,
            LARGE_TRIANGLE_CAPACITY as usize,
            wgpu::BufferUsages::empty(),
            Cow::Borrowed("Large triangle records"),
        );

        let dispatch_args = GPUBuffer::new_dispatch_indirect_buffer(
            graphics_device,
            &[DispatchIndirectArgs::EMPTY_ROW],
            Cow::Borrowed("Large triangle dispatch arguments"),
        );

        let initial_dispatch_args = GPUBuffer::new_dispatch_indirect_buffer(
            graphics_device,
            &[DispatchIndirectArgs::EMPTY_ROW],
            Cow::Borrowed("Initial large triangle dispatch arguments"),
        );

        let append_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[
                    create_storage_buffer_bind_group_layout_entry(
                        Self::records_binding(),
                        wgpu::ShaderStages::COMPUTE,
                        false,
                    ),
                    create_storage_buffer_bind_group_layout_entry(
                        Self::dispatch_args_binding(),
                        wgpu::ShaderStages::COMPUTE,
                        false,
                    ),
                ],
                label: Some("Large triangle append bind group layout"),
            });

        let append_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &append_bind_group_layout,
            entries: &[
                records.create_bind_group_entry(Self::records_binding()),
                dispatch_args.create_bind_group_entry(Self::dispatch_args_binding()),
            ],
            label: Some("Large triangle append bind group"),
        });

        let read_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[create_storage_buffer_bind_group_layout_entry(
                    Self::records_binding(),
                    wgpu::ShaderStages::COMPUTE,
                    true,
                )],
                label: Some("Large triangle read bind group layout"),
            });

        let read_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &read_bind_group_layout,
            entries: &[records.create_bind_group_entry(Self::records_binding())],
            label: Some("Large triangle read bind group"),
        });

        Self {
            records,
            dispatch_args,
            initial_dispatch_args,
            append_bind_group_layout,
            append_bind_group,
            read_bind_group_layout,
            read_bind_group,
        }
    }

    /// Records a copy resetting the record count (the workgroup count of the
    /// large-triangle pass) to zero.
    pub fn record_reset(&self, command_encoder: &mut wgpu::CommandEncoder) {
        encode_buffer_to_buffer_copy_command(
            command_encoder,
            &self.initial_dispatch_args,
            &self.dispatch_args,
        );
    }

    /// Reads back the number of records appended since the last reset,
    /// waiting for all previously submitted work to finish.
    ///
    /// # Errors
    /// Returns an error if the readback fails.
    pub fn read_record_count(&self, graphics_device: &GraphicsDevice) -> Result<u32> {
        let bytes = read_buffer_bytes(
            graphics_device,
            self.dispatch_args.buffer(),
            0,
            size_of::<u32>(),
            Cow::Borrowed("Large triangle record count"),
        )?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    pub fn records(&self) -> &GPUBuffer {
        &self.records
    }

    pub fn dispatch_args(&self) -> &GPUBuffer {
        &self.dispatch_args
    }
}

impl ComputeVoxelizer {
    /// Creates the buffers and pipelines of both passes for the given
    /// resolution.
    ///
    /// # Errors
    /// Returns an error if a shader fails to compile.
    pub fn new(
        graphics_device: &GraphicsDevice,
        bind_group_layout_registry: &BindGroupLayoutRegistry,
        resolution: VoxelResolution,
        uniforms: &VoxelFrameUniforms,
        volume: &VoxelVolume,
    ) -> Result<Self> {
        let device = graphics_device.device();

        let large_triangle_buffers = LargeTriangleBuffers::new(graphics_device);

        let geometry_layout = VoxelizableMesh::get_or_create_geometry_bind_group_layout(
            graphics_device,
            bind_group_layout_registry,
        );
        let material_layout =
            MeshMaterial::get_or_create_bind_group_layout(graphics_device, bind_group_layout_registry);

        let push_constant_range =
            create_push_constant_range::<MeshPushConstants>(wgpu::ShaderStages::COMPUTE);

        let small_triangle_shader = SmallTriangleVoxelizationShaderTemplate::new(resolution)
            .compile(graphics_device)
            .context("Failed to compile small triangle voxelization shader")?;

        let small_triangle_pipeline_layout = create_compute_pipeline_layout(
            device,
            &[
                uniforms.grid_bind_group_layout(),
                volume.base_level_bind_group_layout(),
                &geometry_layout,
                &material_layout,
                &large_triangle_buffers.append_bind_group_layout,
            ],
            &[push_constant_range.clone()],
            "Small triangle voxelization pipeline layout",
        );

        let small_triangle_pipeline = create_compute_pipeline(
            device,
            &small_triangle_pipeline_layout,
            &small_triangle_shader,
            "main",
            "Small triangle voxelization pipeline",
        );

        let large_triangle_shader = LargeTriangleVoxelizationShaderTemplate::new(resolution)
            .compile(graphics_device)
            .context("Failed to compile large triangle voxelization shader")?;

        let large_triangle_pipeline_layout = create_compute_pipeline_layout(
            device,
            &[
                uniforms.grid_bind_group_layout(),
                volume.base_level_bind_group_layout(),
                &geometry_layout,
                &material_layout,
                &large_triangle_buffers.read_bind_group_layout,
            ],
            &[push_constant_range],
            "Large triangle voxelization pipeline layout",
        );

        let large_triangle_pipeline = create_compute_pipeline(
            device,
            &large_triangle_pipeline_layout,
            &large_triangle_shader,
            "main",
            "Large triangle voxelization pipeline",
        );

        Ok(Self {
            large_triangle_buffers,
            small_triangle_pipeline,
            large_triangle_pipeline,
        })
    }

    pub fn large_triangle_buffers(&self) -> &LargeTriangleBuffers {
        &self.large_triangle_buffers
    }

    /// Records both voxelization passes for the given mesh, preceded by a
    /// reset of the large-triangle record count.
    pub fn record_mesh(
        &self,
        command_encoder: &mut wgpu::CommandEncoder,
        grid_bind_group: &wgpu::BindGroup,
        volume: &VoxelVolume,
        mesh: &VoxelizableMesh,
    ) {
        self.large_triangle_buffers.record_reset(command_encoder);

        let [groups_x, groups_y] = small_triangle_dispatch_size(mesh.triangle_count());
        let push_constants = mesh.push_constants();

        let mut compute_pass = command_encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(&format!("Compute voxelization pass for {}", mesh.label())),
            timestamp_writes: None,
        });

        compute_pass.set_pipeline(&self.small_triangle_pipeline);
        compute_pass.set_bind_group(0, grid_bind_group, &[]);
        compute_pass.set_bind_group(1, volume.base_level_bind_group(), &[]);
        compute_pass.set_bind_group(2, mesh.geometry_bind_group(), &[]);
        compute_pass.set_bind_group(3, mesh.material().bind_group(), &[]);
        compute_pass.set_bind_group(4, &self.large_triangle_buffers.append_bind_group, &[]);
        compute_pass.set_push_constants(0, bytemuck::bytes_of(&push_constants));

        log::trace!("Dispatching small triangle pass with {groups_x}x{groups_y} workgroups");
        compute_pass.dispatch_workgroups(groups_x, groups_y, 1);

        compute_pass.set_pipeline(&self.large_triangle_pipeline);
        compute_pass.set_bind_group(4, &self.large_triangle_buffers.read_bind_group, &[]);
        compute_pass.set_push_constants(0, bytemuck::bytes_of(&push_constants));

        log::trace!("Dispatching large triangle pass indirectly");
        compute_pass.dispatch_workgroups_indirect(self.large_triangle_buffers.dispatch_args.buffer(), 0);
    }
}

/// Returns the workgroup counts along X and Y for running one invocation per
/// triangle in the small-triangle pass. Counts that exceed the per-dimension
/// limit are spread over a second dimension, and the kernel skips the
/// surplus invocations.
pub fn small_triangle_dispatch_size(triangle_count: u32) -> [u32; 2] {
    let groups = workgroup_count(triangle_count, SMALL_TRIANGLE_WORKGROUP_SIZE);
    if groups <= MAX_WORKGROUPS_PER_DIMENSION {
        [groups, 1]
    } else {
        let groups_y = groups.div_ceil(MAX_WORKGROUPS_PER_DIMENSION);
        [groups.div_ceil(groups_y), groups_y]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn should_use_single_row_for_moderate_triangle_counts() {
        assert_eq!(small_triangle_dispatch_size(1), [1, 1]);
        assert_eq!(small_triangle_dispatch_size(64), [1, 1]);
        assert_eq!(small_triangle_dispatch_size(65), [2, 1]);
        assert_eq!(
            small_triangle_dispatch_size(MAX_WORKGROUPS_PER_DIMENSION * 64),
            [MAX_WORKGROUPS_PER_DIMENSION, 1]
        );
    }

    #[test]
    fn should_match_record_layout_in_kernels() {
        assert_eq!(size_of::<LargeTriangleRecord>(), 8);
    }

    proptest! {
        #[test]
        fn should_cover_every_triangle_within_dimension_limits(triangle_count in 1_u32..u32::MAX / 2) {
            let [groups_x, groups_y] = small_triangle_dispatch_size(triangle_count);
            prop_assert!(groups_x <= MAX_WORKGROUPS_PER_DIMENSION);
            prop_assert!(groups_y <= MAX_WORKGROUPS_PER_DIMENSION);
            let invocations = u64::from(groups_x) * u64::from(groups_y) * u64::from(SMALL_TRIANGLE_WORKGROUP_SIZE);
            prop_assert!(invocations >= u64::from(triangle_count));
        }
    }
}
