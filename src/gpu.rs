//! Graphics device bootstrap.

use anyhow::Result;
use voxcone_gpu::{
    device::{GraphicsDevice, create_wgpu_instance},
    wgpu,
};

/// Features the voxel engine can not run without.
pub const REQUIRED_FEATURES: wgpu::Features = wgpu::Features::PUSH_CONSTANTS;

/// Features used when the adapter offers them.
pub const OPTIONAL_FEATURES: wgpu::Features = wgpu::Features::CONSERVATIVE_RASTERIZATION;

/// Returns the device limits needed by the voxel engine.
pub fn required_limits() -> wgpu::Limits {
    wgpu::Limits {
        // Compute voxelizer: grid, volume, geometry, material, records
        max_bind_groups: 5,
        max_push_constant_size: 128,
        ..wgpu::Limits::default()
    }
}

/// Connects to a graphics device for use without any window surface.
///
/// # Errors
/// See [`GraphicsDevice::connect`].
pub fn connect_headless() -> Result<GraphicsDevice> {
    let wgpu_instance = create_wgpu_instance();

    pollster::block_on(GraphicsDevice::connect(
        &wgpu_instance,
        REQUIRED_FEATURES,
        OPTIONAL_FEATURES,
        required_limits(),
        wgpu::MemoryHints::Performance,
        None,
    ))
}
