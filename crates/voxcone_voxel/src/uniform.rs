//! Uniform data shared by the voxel kernels, the visualization and the
//! external cone tracing pass.

use crate::{
    bounds::{VoxelGridBounds, VoxelizationAxis},
    config::ConeTracingParameters,
    resolution::VoxelResolution,
};
use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use nalgebra::Matrix4;
use std::{array, borrow::Cow};
use voxcone_gpu::{
    assert_uniform_valid,
    buffer::{GPUBuffer, read_buffer_bytes},
    device::GraphicsDevice,
    uniform::create_uniform_buffer_bind_group_layout_entry, wgpu,
};

/// The number of frames that may be recorded while earlier ones are still
/// executing. Each frame in flight gets its own uniform buffers.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Geometry of the voxel grid and the cone tracing parameters.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct VoxelGridUniform {
    pub aabb_min: [f32; 4],
    pub aabb_max: [f32; 4],
    pub voxels_per_side: u32,
    pub mip_level_count: u32,
    pub ambient_occlusion_enabled: u32,
    pub occlusion_visualization_enabled: u32,
    pub occlusion_decay_factor: f32,
    pub surface_offset: f32,
    pub cone_cutoff: f32,
    pub voxel_width: f32,
}

/// View transforms looking along each grid axis and the orthographic
/// projection of the grid cube, used by the rasterization voxelizer.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct VoxelizationTransformsUniform {
    pub views: [[[f32; 4]; 4]; 3],
    pub projection: [[f32; 4]; 4],
}

/// Camera transform and cube size for drawing the voxel visualization.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct VisualizationCameraUniform {
    pub view_projection: [[f32; 4]; 4],
    pub cube_scale: f32,
    _pad: [f32; 3],
}

assert_uniform_valid!(VoxelGridUniform);
assert_uniform_valid!(VoxelizationTransformsUniform);
assert_uniform_valid!(VisualizationCameraUniform);

/// Per-frame uniform buffers with the bind groups exposing them.
///
/// The grid bind group holds the [`VoxelGridUniform`] at binding 0 and the
/// [`VoxelizationTransformsUniform`] at binding 1. The camera bind group holds
/// the [`VisualizationCameraUniform`] at binding 0.
#[derive(Debug)]
pub struct VoxelFrameUniforms {
    grid_buffers: [GPUBuffer; FRAMES_IN_FLIGHT],
    transforms_buffers: [GPUBuffer; FRAMES_IN_FLIGHT],
    camera_buffers: [GPUBuffer; FRAMES_IN_FLIGHT],
    grid_bind_group_layout: wgpu::BindGroupLayout,
    grid_bind_groups: [wgpu::BindGroup; FRAMES_IN_FLIGHT],
    camera_bind_group_layout: wgpu::BindGroupLayout,
    camera_bind_groups: [wgpu::BindGroup; FRAMES_IN_FLIGHT],
}

impl VoxelGridUniform {
    pub const fn binding() -> u32 {
        0
    }

    pub fn new(
        bounds: &VoxelGridBounds,
        resolution: VoxelResolution,
        parameters: &ConeTracingParameters,
    ) -> Self {
        let min = bounds.min();
        let max = bounds.max();
        Self {
            aabb_min: [min.x, min.y, min.z, 1.0],
            aabb_max: [max.x, max.y, max.z, 1.0],
            voxels_per_side: resolution.voxels_per_side(),
            mip_level_count: resolution.mip_level_count(),
            ambient_occlusion_enabled: u32::from(parameters.ambient_occlusion_enabled),
            occlusion_visualization_enabled: u32::from(
                parameters.occlusion_visualization_enabled,
            ),
            occlusion_decay_factor: parameters.occlusion_decay_factor,
            surface_offset: parameters.surface_offset,
            cone_cutoff: parameters.cone_cutoff,
            voxel_width: bounds.voxel_width(resolution),
        }
    }

    /// WGSL declaration of the struct matching this uniform.
    pub const fn wgsl_struct() -> &'static str {
        "struct VoxelGrid {
    aabbMin: vec4f,
    aabbMax: vec4f,
    voxelsPerSide: u32,
    mipLevelCount: u32,
    ambientOcclusionEnabled: u32,
    occlusionVisualizationEnabled: u32,
    occlusionDecayFactor: f32,
    surfaceOffset: f32,
    coneCutoff: f32,
    voxelWidth: f32,
}"
    }
}

impl VoxelizationTransformsUniform {
    pub const fn binding() -> u32 {
        1
    }

    pub fn new(bounds: &VoxelGridBounds) -> Self {
        Self {
            views: VoxelizationAxis::ALL.map(|axis| bounds.axis_view_transform(axis).into()),
            projection: bounds.orthographic_projection().into(),
        }
    }
}

impl VisualizationCameraUniform {
    pub const fn binding() -> u32 {
        0
    }

    pub fn new(view_projection: &Matrix4<f32>, cube_scale: f32) -> Self {
        Self {
            view_projection: (*view_projection).into(),
            cube_scale,
            _pad: [0.0; 3],
        }
    }
}

impl VoxelFrameUniforms {
    /// Creates uniform buffers for every frame in flight, all initialized
    /// with the given data.
    pub fn new(
        graphics_device: &GraphicsDevice,
        grid: &VoxelGridUniform,
        transforms: &VoxelizationTransformsUniform,
        camera: &VisualizationCameraUniform,
    ) -> Self {
        let device = graphics_device.device();

        let grid_buffers = array::from_fn(|frame| {
            GPUBuffer::new_uniform_buffer(
                graphics_device,
                grid,
                Cow::Owned(format!("Voxel grid uniform (frame {frame})")),
            )
        });
        let transforms_buffers = array::from_fn(|frame| {
            GPUBuffer::new_uniform_buffer(
                graphics_device,
                transforms,
                Cow::Owned(format!("Voxelization transforms uniform (frame {frame})")),
            )
        });
        let camera_buffers = array::from_fn(|frame| {
            GPUBuffer::new_uniform_buffer(
                graphics_device,
                camera,
                Cow::Owned(format!("Voxel visualization camera uniform (frame {frame})")),
            )
        });

        let grid_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[
                    create_uniform_buffer_bind_group_layout_entry(
                        VoxelGridUniform::binding(),
                        wgpu::ShaderStages::VERTEX_FRAGMENT | wgpu::ShaderStages::COMPUTE,
                    ),
                    create_uniform_buffer_bind_group_layout_entry(
                        VoxelizationTransformsUniform::binding(),
                        wgpu::ShaderStages::VERTEX_FRAGMENT | wgpu::ShaderStages::COMPUTE,
                    ),
                ],
                label: Some("Voxel grid bind group layout"),
            });

        let grid_bind_groups = array::from_fn(|frame| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &grid_bind_group_layout,
                entries: &[
                    grid_buffers[frame].create_bind_group_entry(VoxelGridUniform::binding()),
                    transforms_buffers[frame]
                        .create_bind_group_entry(VoxelizationTransformsUniform::binding()),
                ],
                label: Some(&format!("Voxel grid bind group (frame {frame})")),
            })
        });

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[create_uniform_buffer_bind_group_layout_entry(
                    VisualizationCameraUniform::binding(),
                    wgpu::ShaderStages::VERTEX,
                )],
                label: Some("Voxel visualization camera bind group layout"),
            });

        let camera_bind_groups = array::from_fn(|frame| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &camera_bind_group_layout,
                entries: &[camera_buffers[frame]
                    .create_bind_group_entry(VisualizationCameraUniform::binding())],
                label: Some(&format!("Voxel visualization camera bind group (frame {frame})")),
            })
        });

        Self {
            grid_buffers,
            transforms_buffers,
            camera_buffers,
            grid_bind_group_layout,
            grid_bind_groups,
            camera_bind_group_layout,
            camera_bind_groups,
        }
    }

    /// Queues writes of the given data to the buffers of the given frame.
    pub fn write(
        &self,
        graphics_device: &GraphicsDevice,
        frame_index: usize,
        grid: &VoxelGridUniform,
        transforms: &VoxelizationTransformsUniform,
        camera: &VisualizationCameraUniform,
    ) {
        let slot = frame_slot(frame_index);
        self.grid_buffers[slot].update_uniform(graphics_device, grid);
        self.transforms_buffers[slot].update_uniform(graphics_device, transforms);
        self.camera_buffers[slot].update_uniform(graphics_device, camera);
    }

    pub fn grid_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.grid_bind_group_layout
    }

    pub fn grid_bind_group(&self, frame_index: usize) -> &wgpu::BindGroup {
        &self.grid_bind_groups[frame_slot(frame_index)]
    }

    /// Returns the buffer holding the [`VoxelGridUniform`] for the given frame.
    pub fn grid_buffer(&self, frame_index: usize) -> &GPUBuffer {
        &self.grid_buffers[frame_slot(frame_index)]
    }

    /// Reads back the [`VoxelGridUniform`] of the given frame, waiting for
    /// all queued work to finish.
    ///
    /// # Errors
    /// Returns an error if the readback fails.
    pub fn read_grid_uniform(
        &self,
        graphics_device: &GraphicsDevice,
        frame_index: usize,
    ) -> Result<VoxelGridUniform> {
        let buffer = self.grid_buffer(frame_index);
        let bytes = read_buffer_bytes(
            graphics_device,
            buffer.buffer(),
            0,
            buffer.size(),
            Cow::Borrowed("Voxel grid uniform readback"),
        )?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    pub fn camera_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.camera_bind_group_layout
    }

    pub fn camera_bind_group(&self, frame_index: usize) -> &wgpu::BindGroup {
        &self.camera_bind_groups[frame_slot(frame_index)]
    }
}

/// Maps a running frame counter to the slot of its per-frame resources.
pub const fn frame_slot(frame_index: usize) -> usize {
    frame_index % FRAMES_IN_FLIGHT
}
