#![allow(dead_code)]

use nalgebra::Matrix4;
use std::{borrow::Cow, env};
use voxcone_gpu::{
    bind_group_layout::BindGroupLayoutRegistry,
    device::{GraphicsDevice, create_wgpu_instance},
    wgpu,
};
use voxcone_voxel::{
    VisualizationTargetConfig, VoxelEngine, VoxelEngineConfig, VoxelResolution,
    VoxelizationStrategy,
    config::VisualizationConfig,
    mesh::{MeshMaterial, Vertex, VoxelizableMesh},
};

/// Set to make GPU tests fail instead of being skipped when no suitable
/// adapter is available.
pub const REQUIRE_GPU_VAR: &str = "VOXCONE_REQUIRE_GPU";

/// Connects to a graphics device able to run the voxel engine, or returns
/// [`None`] if the machine has no suitable adapter and [`REQUIRE_GPU_VAR`] is
/// not set.
pub fn connect() -> Option<GraphicsDevice> {
    let instance = create_wgpu_instance();

    let result = pollster::block_on(GraphicsDevice::connect(
        &instance,
        wgpu::Features::PUSH_CONSTANTS,
        wgpu::Features::CONSERVATIVE_RASTERIZATION,
        wgpu::Limits {
            max_bind_groups: 5,
            max_push_constant_size: 128,
            ..wgpu::Limits::default()
        },
        wgpu::MemoryHints::Performance,
        None,
    ));

    skip_unless_gpu_required(result, env::var_os(REQUIRE_GPU_VAR).is_some())
}

/// Unwraps the connection result. A failure is reported as a skipped test,
/// or panics if a GPU is required.
pub fn skip_unless_gpu_required<T>(result: anyhow::Result<T>, gpu_required: bool) -> Option<T> {
    match result {
        Ok(device) => Some(device),
        Err(error) if gpu_required => {
            panic!("No usable GPU although {REQUIRE_GPU_VAR} is set: {error}")
        }
        Err(error) => {
            eprintln!("SKIPPED GPU test (set {REQUIRE_GPU_VAR} to fail instead): {error}");
            None
        }
    }
}

/// A configuration for a grid spanning `[0, 64]^3`, so that each voxel of a
/// 64^3 grid is one unit wide.
pub fn unit_voxel_config(strategy: VoxelizationStrategy) -> VoxelEngineConfig {
    VoxelEngineConfig {
        resolution: VoxelResolution::R64,
        first_corner: [0.0; 3],
        second_corner: [64.0; 3],
        strategy,
        visualization: VisualizationConfig {
            enabled: true,
            instance_capacity: 64 * 64 * 64,
            ..VisualizationConfig::default()
        },
        ..VoxelEngineConfig::default()
    }
}

pub fn create_engine(
    graphics_device: &GraphicsDevice,
    registry: &BindGroupLayoutRegistry,
    config: VoxelEngineConfig,
) -> VoxelEngine {
    VoxelEngine::new(
        graphics_device,
        registry,
        config,
        VisualizationTargetConfig::default(),
    )
    .unwrap()
}

pub fn submit<F>(graphics_device: &GraphicsDevice, record: F)
where
    F: FnOnce(&mut wgpu::CommandEncoder),
{
    let mut encoder =
        graphics_device
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Test encoder"),
            });
    record(&mut encoder);
    graphics_device.queue().submit(std::iter::once(encoder.finish()));
    graphics_device.wait_until_idle();
}

/// Creates a mesh of `triangle_count` copies of the triangle with the given
/// vertices, colored with the given color.
pub fn repeated_triangle_mesh(
    graphics_device: &GraphicsDevice,
    registry: &BindGroupLayoutRegistry,
    positions: [[f32; 3]; 3],
    triangle_count: u32,
    color: [u8; 4],
) -> VoxelizableMesh {
    let vertices = positions.map(|position| Vertex::new(position, [0.0, 0.0, 1.0], [0.0, 0.0]));
    let indices: Vec<u32> = (0..triangle_count).flat_map(|_| [0, 1, 2]).collect();
    let material = MeshMaterial::solid_color(graphics_device, registry, color, "Test").unwrap();

    VoxelizableMesh::new(
        graphics_device,
        registry,
        &vertices,
        &indices,
        Matrix4::identity(),
        material,
        Cow::Borrowed("Test triangles"),
    )
    .unwrap()
}
