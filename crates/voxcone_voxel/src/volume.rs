//! The mipmapped 3D texture holding the voxelized scene.

use crate::{
    reference::Texel,
    resolution::VoxelResolution,
    shader_templates::clear_volume::ClearVolumeShaderTemplate,
};
use anyhow::{Context, Result};
use voxcone_gpu::{
    compute::{create_compute_pipeline, create_compute_pipeline_layout, workgroup_count},
    device::GraphicsDevice,
    shader::template::SpecificShaderTemplate,
    storage::create_write_only_storage_texture_bind_group_layout_entry,
    texture::{read_rgba8_texture_3d_mip_level, write_rgba8_texture_3d_mip_level},
    wgpu,
};

/// Number of invocations along each axis of a workgroup in the kernels that
/// run one invocation per voxel.
pub const VOLUME_WORKGROUP_SIZE: u32 = 4;

/// Texel format of every level of the volume. A voxel is occupied when its
/// alpha is non-zero.
pub const VOLUME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// A cubic 3D texture with a full mip chain. Level 0 holds the voxel colors
/// written by the voxelizers, and each coarser level holds the average of the
/// eight children at the next finer level.
///
/// Every level has a write-only storage view and a sampled view. The base
/// level storage view is exposed through a bind group shared by the clear
/// kernel and both voxelizers.
#[derive(Debug)]
pub struct VoxelVolume {
    resolution: VoxelResolution,
    texture: wgpu::Texture,
    storage_views: Vec<wgpu::TextureView>,
    sampled_views: Vec<wgpu::TextureView>,
    full_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    base_level_bind_group_layout: wgpu::BindGroupLayout,
    base_level_bind_group: wgpu::BindGroup,
    clear_pipeline: wgpu::ComputePipeline,
}

impl VoxelVolume {
    /// Binding of the base level storage view in the base level bind group.
    pub const fn storage_binding() -> u32 {
        0
    }

    /// Allocates the volume with its full mip chain and builds the clear
    /// kernel.
    ///
    /// # Errors
    /// Returns an error if the clear shader fails to compile.
    pub fn new(graphics_device: &GraphicsDevice, resolution: VoxelResolution) -> Result<Self> {
        let device = graphics_device.device();

        let voxels_per_side = resolution.voxels_per_side();
        let mip_level_count = resolution.mip_level_count();

        log::info!("Creating {resolution} voxel volume with {mip_level_count} mip levels");

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            size: wgpu::Extent3d {
                width: voxels_per_side,
                height: voxels_per_side,
                depth_or_array_layers: voxels_per_side,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: VOLUME_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
            label: Some("Voxel volume texture"),
        });

        let create_level_view = |level: u32, label: String| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::D3),
                base_mip_level: level,
                mip_level_count: Some(1),
                label: Some(&label),
                ..Default::default()
            })
        };

        let storage_views: Vec<_> = (0..mip_level_count)
            .map(|level| {
                create_level_view(level, format!("Voxel volume storage view (level {level})"))
            })
            .collect();

        let sampled_views = (0..mip_level_count)
            .map(|level| {
                create_level_view(level, format!("Voxel volume sampled view (level {level})"))
            })
            .collect();

        let full_view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D3),
            label: Some("Voxel volume full view"),
            ..Default::default()
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            label: Some("Voxel volume sampler"),
            ..Default::default()
        });

        let base_level_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[create_write_only_storage_texture_bind_group_layout_entry(
                    Self::storage_binding(),
                    wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
                    VOLUME_FORMAT,
                    wgpu::TextureViewDimension::D3,
                )],
                label: Some("Voxel volume base level bind group layout"),
            });

        let base_level_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &base_level_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: Self::storage_binding(),
                resource: wgpu::BindingResource::TextureView(&storage_views[0]),
            }],
            label: Some("Voxel volume base level bind group"),
        });

        let clear_shader = ClearVolumeShaderTemplate::new(resolution)
            .compile(graphics_device)
            .context("Failed to compile voxel volume clear shader")?;

        let clear_pipeline_layout = create_compute_pipeline_layout(
            device,
            &[&base_level_bind_group_layout],
            &[],
            "Voxel volume clear pipeline layout",
        );

        let clear_pipeline = create_compute_pipeline(
            device,
            &clear_pipeline_layout,
            &clear_shader,
            "main",
            "Voxel volume clear pipeline",
        );

        Ok(Self {
            resolution,
            texture,
            storage_views,
            sampled_views,
            full_view,
            sampler,
            base_level_bind_group_layout,
            base_level_bind_group,
            clear_pipeline,
        })
    }

    pub fn resolution(&self) -> VoxelResolution {
        self.resolution
    }

    pub fn mip_level_count(&self) -> u32 {
        self.texture.mip_level_count()
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Returns the write-only storage view of the given mip level.
    ///
    /// # Panics
    /// If the mip level does not exist.
    pub fn storage_view(&self, mip_level: u32) -> &wgpu::TextureView {
        &self.storage_views[mip_level as usize]
    }

    /// Returns the sampled view of the given mip level.
    ///
    /// # Panics
    /// If the mip level does not exist.
    pub fn sampled_view(&self, mip_level: u32) -> &wgpu::TextureView {
        &self.sampled_views[mip_level as usize]
    }

    /// Returns the sampled view covering every mip level.
    pub fn full_view(&self) -> &wgpu::TextureView {
        &self.full_view
    }

    /// Returns the trilinear mipmapped sampler for the full view.
    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn base_level_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.base_level_bind_group_layout
    }

    pub fn base_level_bind_group(&self) -> &wgpu::BindGroup {
        &self.base_level_bind_group
    }

    /// Records a compute pass that zeroes every voxel of the base level.
    pub fn record_clear(&self, command_encoder: &mut wgpu::CommandEncoder) {
        let groups = workgroup_count(self.resolution.voxels_per_side(), VOLUME_WORKGROUP_SIZE);

        let mut compute_pass = command_encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Voxel volume clear pass"),
            timestamp_writes: None,
        });

        compute_pass.set_pipeline(&self.clear_pipeline);
        compute_pass.set_bind_group(0, &self.base_level_bind_group, &[]);

        log::trace!("Dispatching volume clear with {groups}^3 workgroups");
        compute_pass.dispatch_workgroups(groups, groups, groups);
    }

    /// Queues an upload of the given texels (x fastest, then y, then z) to the
    /// base level.
    ///
    /// # Errors
    /// Returns an error if the number of texels does not match the voxel
    /// count of the resolution.
    pub fn write_base_level(&self, graphics_device: &GraphicsDevice, texels: &[Texel]) -> Result<()> {
        write_rgba8_texture_3d_mip_level(graphics_device, &self.texture, 0, texels)
    }

    /// Reads back the texels of the given mip level, waiting for all
    /// previously submitted work to finish.
    ///
    /// # Errors
    /// Returns an error if the mip level does not exist or the readback
    /// fails.
    pub fn read_mip_level(
        &self,
        graphics_device: &GraphicsDevice,
        mip_level: u32,
    ) -> Result<Vec<Texel>> {
        read_rgba8_texture_3d_mip_level(graphics_device, &self.texture, mip_level)
            .with_context(|| format!("Failed to read back voxel volume mip level {mip_level}"))
    }
}
