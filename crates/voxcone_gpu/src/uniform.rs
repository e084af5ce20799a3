//! Uniform buffers.

use crate::{
    buffer::{GPUBuffer, GPUBufferType},
    device::GraphicsDevice,
};
use bytemuck::Pod;
use std::borrow::Cow;

impl GPUBuffer {
    /// Creates a uniform buffer holding the given uniform.
    pub fn new_uniform_buffer<U: Pod>(
        graphics_device: &GraphicsDevice,
        uniform: &U,
        label: Cow<'static, str>,
    ) -> Self {
        let bytes = bytemuck::bytes_of(uniform);
        Self::new(
            graphics_device,
            bytes,
            GPUBufferType::Uniform.usage(),
            label,
        )
    }

    /// Queues a write of the given uniform to the buffer.
    ///
    /// # Panics
    /// If the size of the uniform differs from the size of the buffer.
    pub fn update_uniform<U: Pod>(&self, graphics_device: &GraphicsDevice, uniform: &U) {
        self.write(graphics_device, bytemuck::bytes_of(uniform));
    }
}

/// Creates a [`BindGroupLayoutEntry`](wgpu::BindGroupLayoutEntry) for a
/// uniform buffer with the given binding.
pub const fn create_uniform_buffer_bind_group_layout_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
