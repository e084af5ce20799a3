//! Resources for the external shading pass that cone traces the voxel
//! volume.

use crate::{
    reference::Texel,
    uniform::{FRAMES_IN_FLIGHT, VoxelFrameUniforms, VoxelGridUniform, frame_slot},
    volume::VoxelVolume,
};
use anyhow::Result;
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::{array, f32::consts::TAU};
use voxcone_gpu::{
    device::GraphicsDevice,
    texture::{
        create_rgba8_texture_2d, create_sampler_bind_group_layout_entry,
        create_texture_bind_group_layout_entry,
    },
    uniform::create_uniform_buffer_bind_group_layout_entry,
    wgpu,
};

/// Width and height of the rotation noise texture.
pub const NOISE_TEXTURE_SIZE: u32 = 64;

/// The bind group layout and per-frame bind groups giving a shading pass
/// access to the voxel grid.
///
/// | Binding | Resource                                             |
/// |---------|------------------------------------------------------|
/// | 0       | [`VoxelGridUniform`]                                 |
/// | 1       | Sampled view of the whole mip chain of the volume    |
/// | 2       | Trilinear mipmapped sampler for the volume           |
/// | 3       | Random rotation noise texture                        |
/// | 4       | Repeating nearest sampler for the noise texture      |
///
/// Each noise texel encodes a random unit vector `(cos θ, sin θ)` in its red
/// and green channels, mapped from `[-1, 1]` to `[0, 1]`, for rotating cone
/// directions per pixel.
#[derive(Debug)]
pub struct ConeTracingResources {
    _noise_texture: wgpu::Texture,
    _noise_sampler: wgpu::Sampler,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_groups: [wgpu::BindGroup; FRAMES_IN_FLIGHT],
}

impl ConeTracingResources {
    pub const fn grid_binding() -> u32 {
        VoxelGridUniform::binding()
    }

    pub const fn volume_binding() -> u32 {
        1
    }

    pub const fn volume_sampler_binding() -> u32 {
        2
    }

    pub const fn noise_texture_binding() -> u32 {
        3
    }

    pub const fn noise_sampler_binding() -> u32 {
        4
    }

    /// Creates the noise texture from the given seed and the bind groups for
    /// every frame in flight.
    ///
    /// # Errors
    /// Returns an error if the noise texture can not be created.
    pub fn new(
        graphics_device: &GraphicsDevice,
        uniforms: &VoxelFrameUniforms,
        volume: &VoxelVolume,
        noise_seed: u64,
    ) -> Result<Self> {
        let device = graphics_device.device();

        let noise_texture = create_rgba8_texture_2d(
            graphics_device,
            NOISE_TEXTURE_SIZE,
            NOISE_TEXTURE_SIZE,
            &random_rotation_texels(NOISE_TEXTURE_SIZE, noise_seed),
            wgpu::TextureFormat::Rgba8Unorm,
            "Cone tracing rotation noise texture",
        )?;
        let noise_view = noise_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let noise_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            label: Some("Cone tracing noise sampler"),
            ..Default::default()
        });

        let visibility = wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                create_uniform_buffer_bind_group_layout_entry(Self::grid_binding(), visibility),
                create_texture_bind_group_layout_entry(
                    Self::volume_binding(),
                    visibility,
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::D3,
                ),
                create_sampler_bind_group_layout_entry(
                    Self::volume_sampler_binding(),
                    visibility,
                    wgpu::SamplerBindingType::Filtering,
                ),
                create_texture_bind_group_layout_entry(
                    Self::noise_texture_binding(),
                    visibility,
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::D2,
                ),
                create_sampler_bind_group_layout_entry(
                    Self::noise_sampler_binding(),
                    visibility,
                    wgpu::SamplerBindingType::NonFiltering,
                ),
            ],
            label: Some("Cone tracing bind group layout"),
        });

        let bind_groups = array::from_fn(|frame| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &bind_group_layout,
                entries: &[
                    uniforms
                        .grid_buffer(frame)
                        .create_bind_group_entry(Self::grid_binding()),
                    wgpu::BindGroupEntry {
                        binding: Self::volume_binding(),
                        resource: wgpu::BindingResource::TextureView(volume.full_view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: Self::volume_sampler_binding(),
                        resource: wgpu::BindingResource::Sampler(volume.sampler()),
                    },
                    wgpu::BindGroupEntry {
                        binding: Self::noise_texture_binding(),
                        resource: wgpu::BindingResource::TextureView(&noise_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: Self::noise_sampler_binding(),
                        resource: wgpu::BindingResource::Sampler(&noise_sampler),
                    },
                ],
                label: Some(&format!("Cone tracing bind group (frame {frame})")),
            })
        });

        Ok(Self {
            _noise_texture: noise_texture,
            _noise_sampler: noise_sampler,
            bind_group_layout,
            bind_groups,
        })
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self, frame_index: usize) -> &wgpu::BindGroup {
        &self.bind_groups[frame_slot(frame_index)]
    }
}

/// Generates `size * size` texels, each encoding a random unit vector in the
/// plane in its red and green channels.
pub fn random_rotation_texels(size: u32, seed: u64) -> Vec<Texel> {
    let mut rng = StdRng::seed_from_u64(seed);
    let encode = |component: f32| (255.0 * (0.5 * component + 0.5)).round() as u8;

    (0..size * size)
        .map(|_| {
            let angle = TAU * rng.random::<f32>();
            [encode(angle.cos()), encode(angle.sin()), 0, 255]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(texel: Texel) -> (f32, f32) {
        let decode = |value: u8| 2.0 * f32::from(value) / 255.0 - 1.0;
        (decode(texel[0]), decode(texel[1]))
    }

    #[test]
    fn should_generate_same_noise_for_same_seed() {
        assert_eq!(random_rotation_texels(8, 42), random_rotation_texels(8, 42));
        assert_ne!(random_rotation_texels(8, 42), random_rotation_texels(8, 43));
    }

    #[test]
    fn should_encode_unit_vectors() {
        for texel in random_rotation_texels(16, 0) {
            let (x, y) = decode(texel);
            let length = (x * x + y * y).sqrt();
            assert!((length - 1.0).abs() < 0.02, "Length {length} is not unit");
            assert_eq!(texel[2], 0);
            assert_eq!(texel[3], 255);
        }
    }

    #[test]
    fn should_generate_one_texel_per_pixel() {
        assert_eq!(
            random_rotation_texels(NOISE_TEXTURE_SIZE, 1).len(),
            (NOISE_TEXTURE_SIZE * NOISE_TEXTURE_SIZE) as usize
        );
    }
}
