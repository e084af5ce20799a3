//! Storage buffers and storage textures.

use crate::{
    buffer::{GPUBuffer, GPUBufferType},
    device::GraphicsDevice,
};
use bytemuck::Pod;
use std::{borrow::Cow, mem};

impl GPUBuffer {
    /// Creates a storage buffer initialized with the given values.
    ///
    /// # Panics
    /// If the given slice is empty.
    pub fn new_storage_buffer<T: Pod>(
        graphics_device: &GraphicsDevice,
        values: &[T],
        label: Cow<'static, str>,
    ) -> Self {
        let bytes = bytemuck::cast_slice(values);
        Self::new(
            graphics_device,
            bytes,
            GPUBufferType::Storage.usage(),
            label,
        )
    }

    /// Creates an uninitialized storage buffer with room for `capacity` values
    /// of type `T`, with the given usages in addition to the storage usages.
    ///
    /// # Panics
    /// - If `capacity` is zero.
    /// - If `T` is a zero-sized type.
    pub fn new_storage_buffer_with_capacity<T: Pod>(
        graphics_device: &GraphicsDevice,
        capacity: usize,
        additional_usage: wgpu::BufferUsages,
        label: Cow<'static, str>,
    ) -> Self {
        assert_ne!(mem::size_of::<T>(), 0, "Tried to store zero-sized type");
        let buffer_size = mem::size_of::<T>()
            .checked_mul(capacity)
            .expect("Storage buffer size overflows `usize`");
        Self::new_uninitialized(
            graphics_device,
            buffer_size,
            GPUBufferType::Storage.usage() | additional_usage,
            label,
        )
    }
}

/// Creates a [`BindGroupLayoutEntry`](wgpu::BindGroupLayoutEntry) for a
/// storage buffer with the given binding.
pub const fn create_storage_buffer_bind_group_layout_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    read_only: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Creates a [`BindGroupLayoutEntry`](wgpu::BindGroupLayoutEntry) for a
/// write-only storage texture with the given binding, format and view
/// dimension.
pub const fn create_write_only_storage_texture_bind_group_layout_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    format: wgpu::TextureFormat,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension,
        },
        count: None,
    }
}
