//! Textures and samplers.

use crate::{
    buffer::GPUBuffer,
    device::GraphicsDevice,
};
use anyhow::{Result, bail};
use std::borrow::Cow;

/// Number of bytes in one RGBA8 texel.
pub const RGBA8_TEXEL_SIZE: u32 = 4;

/// Creates a [`BindGroupLayoutEntry`](wgpu::BindGroupLayoutEntry) for a
/// sampled texture with the given binding.
pub const fn create_texture_bind_group_layout_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    sample_type: wgpu::TextureSampleType,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

/// Creates a [`BindGroupLayoutEntry`](wgpu::BindGroupLayoutEntry) for a
/// sampler with the given binding.
pub const fn create_sampler_bind_group_layout_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    binding_type: wgpu::SamplerBindingType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Sampler(binding_type),
        count: None,
    }
}

/// Creates a 2D RGBA8 texture with a single mip level and uploads the given
/// texel data to it.
///
/// # Errors
/// Returns an error if the texture dimensions are zero or if the length of
/// the texel data does not match the dimensions.
pub fn create_rgba8_texture_2d(
    graphics_device: &GraphicsDevice,
    width: u32,
    height: u32,
    texels: &[[u8; 4]],
    format: wgpu::TextureFormat,
    label: &str,
) -> Result<wgpu::Texture> {
    if width == 0 || height == 0 {
        bail!("Texture {label} has zero extent ({width}x{height})");
    }
    if texels.len() != (width as usize) * (height as usize) {
        bail!(
            "Texture {label} has {} texels, expected {}",
            texels.len(),
            width * height
        );
    }

    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let texture = graphics_device
        .device()
        .create_texture(&wgpu::TextureDescriptor {
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
            label: Some(label),
        });

    graphics_device.queue().write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(texels),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(RGBA8_TEXEL_SIZE * width),
            rows_per_image: Some(height),
        },
        size,
    );

    Ok(texture)
}

/// Returns the extent of the given mip level of the given 3D texture.
pub fn mip_level_extent(texture: &wgpu::Texture, mip_level: u32) -> wgpu::Extent3d {
    let size = texture.size();
    wgpu::Extent3d {
        width: (size.width >> mip_level).max(1),
        height: (size.height >> mip_level).max(1),
        depth_or_array_layers: (size.depth_or_array_layers >> mip_level).max(1),
    }
}

/// Queues a write of the given RGBA8 texels (in x-fastest, then y, then z
/// order) to the given mip level of a 3D texture.
///
/// # Errors
/// Returns an error if the mip level does not exist or the number of texels
/// does not match the extent of the mip level.
pub fn write_rgba8_texture_3d_mip_level(
    graphics_device: &GraphicsDevice,
    texture: &wgpu::Texture,
    mip_level: u32,
    texels: &[[u8; 4]],
) -> Result<()> {
    if mip_level >= texture.mip_level_count() {
        bail!(
            "Mip level {mip_level} out of range for texture with {} levels",
            texture.mip_level_count()
        );
    }

    let extent = mip_level_extent(texture, mip_level);
    let n_texels = (extent.width as usize)
        * (extent.height as usize)
        * (extent.depth_or_array_layers as usize);

    if texels.len() != n_texels {
        bail!(
            "Got {} texels for mip level {mip_level}, expected {n_texels}",
            texels.len()
        );
    }

    graphics_device.queue().write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(texels),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(RGBA8_TEXEL_SIZE * extent.width),
            rows_per_image: Some(extent.height),
        },
        extent,
    );

    Ok(())
}

/// Copies the given mip level of a 3D RGBA8 texture into a result buffer,
/// waits for the copy and returns the texels in x-fastest, then y, then z
/// order. The texture must have the `COPY_SRC` usage.
///
/// # Errors
/// Returns an error if the mip level does not exist or the readback fails.
pub fn read_rgba8_texture_3d_mip_level(
    graphics_device: &GraphicsDevice,
    texture: &wgpu::Texture,
    mip_level: u32,
) -> Result<Vec<[u8; 4]>> {
    if mip_level >= texture.mip_level_count() {
        bail!(
            "Mip level {mip_level} out of range for texture with {} levels",
            texture.mip_level_count()
        );
    }

    let extent = mip_level_extent(texture, mip_level);

    let unpadded_bytes_per_row = RGBA8_TEXEL_SIZE * extent.width;
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    let n_rows = extent.height * extent.depth_or_array_layers;
    let buffer_size = (padded_bytes_per_row as usize) * (n_rows as usize);

    let result_buffer = GPUBuffer::new_readback(
        graphics_device,
        buffer_size,
        Cow::Owned(format!("Texture mip level {mip_level} readback")),
    );

    let mut command_encoder =
        graphics_device
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Texture readback command encoder"),
            });

    command_encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: result_buffer.buffer(),
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(extent.height),
            },
        },
        extent,
    );

    graphics_device
        .queue()
        .submit(std::iter::once(command_encoder.finish()));

    let padded_bytes = result_buffer.map_and_read(graphics_device)?;

    let mut texels = Vec::with_capacity((extent.width * n_rows) as usize);
    for row in padded_bytes.chunks_exact(padded_bytes_per_row as usize) {
        texels.extend(
            row[..unpadded_bytes_per_row as usize]
                .chunks_exact(RGBA8_TEXEL_SIZE as usize)
                .map(|texel| [texel[0], texel[1], texel[2], texel[3]]),
        );
    }

    Ok(texels)
}
