//! Generation of the mip chain of the voxel volume.

use crate::{
    shader_templates::mip_reduction::MipReductionShaderTemplate,
    volume::{VOLUME_FORMAT, VOLUME_WORKGROUP_SIZE, VoxelVolume},
};
use anyhow::{Context, Result};
use voxcone_gpu::{
    compute::{create_compute_pipeline, create_compute_pipeline_layout, workgroup_count},
    device::GraphicsDevice,
    shader::template::SpecificShaderTemplate,
    storage::create_write_only_storage_texture_bind_group_layout_entry,
    texture::{create_texture_bind_group_layout_entry, mip_level_extent},
    wgpu,
};

/// Reduces every mip level of a [`VoxelVolume`] into the next coarser one.
///
/// Each reduction is a separate dispatch within one compute pass. wgpu
/// inserts a barrier between the dispatches, so a level is completely
/// written before it is read to produce the next one.
#[derive(Debug)]
pub struct MipGenerator {
    pipeline: wgpu::ComputePipeline,
    /// Bind group for producing level `i + 1` from level `i` at index `i`.
    level_bind_groups: Vec<wgpu::BindGroup>,
    /// Workgroup count along each axis for the dispatch producing level
    /// `i + 1`, at index `i`.
    level_workgroup_counts: Vec<u32>,
}

impl MipGenerator {
    pub const fn source_binding() -> u32 {
        0
    }

    pub const fn destination_binding() -> u32 {
        1
    }

    /// Creates the reduction pipeline and the bind groups linking each pair
    /// of consecutive levels of the given volume.
    ///
    /// # Errors
    /// Returns an error if the reduction shader fails to compile.
    pub fn new(graphics_device: &GraphicsDevice, volume: &VoxelVolume) -> Result<Self> {
        let device = graphics_device.device();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                create_texture_bind_group_layout_entry(
                    Self::source_binding(),
                    wgpu::ShaderStages::COMPUTE,
                    wgpu::TextureSampleType::Float { filterable: false },
                    wgpu::TextureViewDimension::D3,
                ),
                create_write_only_storage_texture_bind_group_layout_entry(
                    Self::destination_binding(),
                    wgpu::ShaderStages::COMPUTE,
                    VOLUME_FORMAT,
                    wgpu::TextureViewDimension::D3,
                ),
            ],
            label: Some("Voxel mip reduction bind group layout"),
        });

        let mip_level_count = volume.mip_level_count();

        let (level_bind_groups, level_workgroup_counts): (Vec<_>, Vec<_>) = (1..mip_level_count)
            .map(|destination_level| {
                let source_level = destination_level - 1;

                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    layout: &bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: Self::source_binding(),
                            resource: wgpu::BindingResource::TextureView(
                                volume.sampled_view(source_level),
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: Self::destination_binding(),
                            resource: wgpu::BindingResource::TextureView(
                                volume.storage_view(destination_level),
                            ),
                        },
                    ],
                    label: Some(&format!(
                        "Voxel mip reduction bind group (level {source_level} -> {destination_level})"
                    )),
                });

                let extent = mip_level_extent(volume.texture(), destination_level).width;

                (bind_group, workgroup_count(extent, VOLUME_WORKGROUP_SIZE))
            })
            .unzip();

        let shader = MipReductionShaderTemplate
            .compile(graphics_device)
            .context("Failed to compile voxel mip reduction shader")?;

        let pipeline_layout = create_compute_pipeline_layout(
            device,
            &[&bind_group_layout],
            &[],
            "Voxel mip reduction pipeline layout",
        );

        let pipeline = create_compute_pipeline(
            device,
            &pipeline_layout,
            &shader,
            "main",
            "Voxel mip reduction pipeline",
        );

        Ok(Self {
            pipeline,
            level_bind_groups,
            level_workgroup_counts,
        })
    }

    /// Records a compute pass regenerating every level above the base level
    /// from the base level.
    pub fn record(&self, command_encoder: &mut wgpu::CommandEncoder) {
        log::debug!(
            "Recording voxel mip generation for {} levels",
            self.level_bind_groups.len()
        );

        let mut compute_pass = command_encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Voxel mip generation pass"),
            timestamp_writes: None,
        });

        compute_pass.set_pipeline(&self.pipeline);

        for (source_level, (bind_group, &groups)) in self
            .level_bind_groups
            .iter()
            .zip(&self.level_workgroup_counts)
            .enumerate()
        {
            compute_pass.set_bind_group(0, bind_group, &[]);

            log::trace!(
                "Dispatching mip reduction from level {source_level} with {groups}^3 workgroups"
            );
            compute_pass.dispatch_workgroups(groups, groups, groups);
        }
    }

    /// The number of reductions recorded by [`Self::record`].
    pub fn reduction_count(&self) -> usize {
        self.level_bind_groups.len()
    }
}
