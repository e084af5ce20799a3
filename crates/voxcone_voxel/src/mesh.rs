//! Triangle meshes that can be voxelized.

use anyhow::{Result, bail};
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Point3};
use std::borrow::Cow;
use voxcone_gpu::{
    bind_group_layout::{BindGroupLayoutID, BindGroupLayoutRegistry},
    buffer::GPUBuffer,
    device::GraphicsDevice,
    storage::create_storage_buffer_bind_group_layout_entry,
    texture::{
        create_rgba8_texture_2d, create_sampler_bind_group_layout_entry,
        create_texture_bind_group_layout_entry,
    },
    wgpu,
};

/// A mesh vertex. The voxelization kernels read vertices from a storage
/// buffer as tightly packed `f32`s, so the layout must not change without
/// updating [`Vertex::FLOATS_PER_VERTEX`] and the kernels.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Zeroable, Pod)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

/// Per-mesh data passed to the voxelization kernels as push constants.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct MeshPushConstants {
    pub model_transform: [[f32; 4]; 4],
    pub triangle_count: u32,
    _pad: [u32; 3],
}

/// A texture and sampler that the voxelizers sample to color voxels.
#[derive(Debug)]
pub struct MeshMaterial {
    _texture: wgpu::Texture,
    _sampler: wgpu::Sampler,
    bind_group: wgpu::BindGroup,
}

/// A triangle mesh in GPU buffers usable both as vertex input and as
/// read-only storage, together with its model transform and material.
#[derive(Debug)]
pub struct VoxelizableMesh {
    vertex_buffer: GPUBuffer,
    index_buffer: GPUBuffer,
    positions: Vec<Point3<f32>>,
    indices: Vec<u32>,
    model_transform: Matrix4<f32>,
    triangle_count: u32,
    geometry_bind_group: wgpu::BindGroup,
    material: MeshMaterial,
    label: Cow<'static, str>,
}

const GEOMETRY_BIND_GROUP_LAYOUT_ID: BindGroupLayoutID =
    BindGroupLayoutID::from_name("VoxelizableMeshGeometry");

const MATERIAL_BIND_GROUP_LAYOUT_ID: BindGroupLayoutID =
    BindGroupLayoutID::from_name("VoxelizableMeshMaterial");

impl Vertex {
    pub const FLOATS_PER_VERTEX: u32 = 8;
    pub const TEX_COORD_FLOAT_OFFSET: u32 = 6;

    pub const fn new(position: [f32; 3], normal: [f32; 3], tex_coords: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coords,
        }
    }
}

impl MeshPushConstants {
    pub fn new(model_transform: &Matrix4<f32>, triangle_count: u32) -> Self {
        Self {
            model_transform: (*model_transform).into(),
            triangle_count,
            _pad: [0; 3],
        }
    }
}

impl MeshMaterial {
    pub const fn texture_binding() -> u32 {
        0
    }

    pub const fn sampler_binding() -> u32 {
        1
    }

    /// Creates a material from the given RGBA8 texels.
    ///
    /// # Errors
    /// See [`create_rgba8_texture_2d`].
    pub fn from_rgba8(
        graphics_device: &GraphicsDevice,
        bind_group_layout_registry: &BindGroupLayoutRegistry,
        width: u32,
        height: u32,
        texels: &[[u8; 4]],
        label: &str,
    ) -> Result<Self> {
        let device = graphics_device.device();

        let texture = create_rgba8_texture_2d(
            graphics_device,
            width,
            height,
            texels,
            wgpu::TextureFormat::Rgba8Unorm,
            &format!("{label} material texture"),
        )?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            label: Some(&format!("{label} material sampler")),
            ..Default::default()
        });

        let layout = Self::get_or_create_bind_group_layout(graphics_device, bind_group_layout_registry);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: Self::texture_binding(),
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: Self::sampler_binding(),
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
            label: Some(&format!("{label} material bind group")),
        });

        Ok(Self {
            _texture: texture,
            _sampler: sampler,
            bind_group,
        })
    }

    /// Creates a material with a single color.
    ///
    /// # Errors
    /// See [`Self::from_rgba8`].
    pub fn solid_color(
        graphics_device: &GraphicsDevice,
        bind_group_layout_registry: &BindGroupLayoutRegistry,
        color: [u8; 4],
        label: &str,
    ) -> Result<Self> {
        Self::from_rgba8(
            graphics_device,
            bind_group_layout_registry,
            1,
            1,
            &[color],
            label,
        )
    }

    /// Returns the layout shared by the bind groups of all mesh materials,
    /// creating it in the registry if it does not exist yet.
    pub fn get_or_create_bind_group_layout(
        graphics_device: &GraphicsDevice,
        bind_group_layout_registry: &BindGroupLayoutRegistry,
    ) -> wgpu::BindGroupLayout {
        bind_group_layout_registry.get_or_create_layout(MATERIAL_BIND_GROUP_LAYOUT_ID, || {
            let visibility = wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE;
            graphics_device
                .device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    entries: &[
                        create_texture_bind_group_layout_entry(
                            Self::texture_binding(),
                            visibility,
                            wgpu::TextureSampleType::Float { filterable: true },
                            wgpu::TextureViewDimension::D2,
                        ),
                        create_sampler_bind_group_layout_entry(
                            Self::sampler_binding(),
                            visibility,
                            wgpu::SamplerBindingType::Filtering,
                        ),
                    ],
                    label: Some("Voxelizable mesh material bind group layout"),
                })
        })
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

impl VoxelizableMesh {
    pub const fn vertex_binding() -> u32 {
        0
    }

    pub const fn index_binding() -> u32 {
        1
    }

    /// Uploads the given vertices and triangle indices to the GPU.
    ///
    /// # Errors
    /// Returns an error if:
    /// - There are no vertices or no triangles.
    /// - The number of indices is not a multiple of three.
    /// - An index refers to a vertex that does not exist.
    pub fn new(
        graphics_device: &GraphicsDevice,
        bind_group_layout_registry: &BindGroupLayoutRegistry,
        vertices: &[Vertex],
        indices: &[u32],
        model_transform: Matrix4<f32>,
        material: MeshMaterial,
        label: Cow<'static, str>,
    ) -> Result<Self> {
        if vertices.is_empty() || indices.is_empty() {
            bail!("Mesh {label} has no triangles");
        }
        if indices.len() % 3 != 0 {
            bail!(
                "Mesh {label} has {} indices, which is not a multiple of three",
                indices.len()
            );
        }
        if let Some(index) = indices.iter().find(|&&index| index as usize >= vertices.len()) {
            bail!(
                "Mesh {label} has index {index} but only {} vertices",
                vertices.len()
            );
        }
        let triangle_count = u32::try_from(indices.len() / 3)?;

        let vertex_bytes = bytemuck::cast_slice(vertices);
        let vertex_buffer = GPUBuffer::new(
            graphics_device,
            vertex_bytes,
            wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::STORAGE,
            Cow::Owned(format!("{label} vertex")),
        );

        let index_bytes = bytemuck::cast_slice(indices);
        let index_buffer = GPUBuffer::new(
            graphics_device,
            index_bytes,
            wgpu::BufferUsages::INDEX | wgpu::BufferUsages::STORAGE,
            Cow::Owned(format!("{label} index")),
        );

        let layout =
            Self::get_or_create_geometry_bind_group_layout(graphics_device, bind_group_layout_registry);

        let geometry_bind_group =
            graphics_device
                .device()
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    layout: &layout,
                    entries: &[
                        vertex_buffer.create_bind_group_entry(Self::vertex_binding()),
                        index_buffer.create_bind_group_entry(Self::index_binding()),
                    ],
                    label: Some(&format!("{label} geometry bind group")),
                });

        log::debug!(
            "Created voxelizable mesh {label} with {} vertices and {triangle_count} triangles",
            vertices.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            positions: vertices
                .iter()
                .map(|vertex| Point3::from(vertex.position))
                .collect(),
            indices: indices.to_vec(),
            model_transform,
            triangle_count,
            geometry_bind_group,
            material,
            label,
        })
    }

    /// Returns the layout of the bind group exposing the vertex and index
    /// buffers of every mesh as read-only storage, creating it in the registry
    /// if it does not exist yet.
    pub fn get_or_create_geometry_bind_group_layout(
        graphics_device: &GraphicsDevice,
        bind_group_layout_registry: &BindGroupLayoutRegistry,
    ) -> wgpu::BindGroupLayout {
        bind_group_layout_registry.get_or_create_layout(GEOMETRY_BIND_GROUP_LAYOUT_ID, || {
            let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::COMPUTE;
            graphics_device
                .device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    entries: &[
                        create_storage_buffer_bind_group_layout_entry(
                            Self::vertex_binding(),
                            visibility,
                            true,
                        ),
                        create_storage_buffer_bind_group_layout_entry(
                            Self::index_binding(),
                            visibility,
                            true,
                        ),
                    ],
                    label: Some("Voxelizable mesh geometry bind group layout"),
                })
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertex_buffer(&self) -> &GPUBuffer {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &GPUBuffer {
        &self.index_buffer
    }

    /// Object-space vertex positions.
    pub fn positions(&self) -> &[Point3<f32>] {
        &self.positions
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn triangle_count(&self) -> u32 {
        self.triangle_count
    }

    pub fn model_transform(&self) -> &Matrix4<f32> {
        &self.model_transform
    }

    pub fn set_model_transform(&mut self, model_transform: Matrix4<f32>) {
        self.model_transform = model_transform;
    }

    pub fn geometry_bind_group(&self) -> &wgpu::BindGroup {
        &self.geometry_bind_group
    }

    pub fn material(&self) -> &MeshMaterial {
        &self.material
    }

    pub fn push_constants(&self) -> MeshPushConstants {
        MeshPushConstants::new(&self.model_transform, self.triangle_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn should_pack_vertex_as_eight_floats() {
        assert_eq!(
            mem::size_of::<Vertex>(),
            Vertex::FLOATS_PER_VERTEX as usize * mem::size_of::<f32>()
        );
        assert_eq!(mem::offset_of!(Vertex, normal), 12);
        assert_eq!(
            mem::offset_of!(Vertex, tex_coords),
            Vertex::TEX_COORD_FLOAT_OFFSET as usize * mem::size_of::<f32>()
        );
    }

    #[test]
    fn should_match_wgsl_push_constant_size() {
        // mat4x4f followed by a u32, rounded up to 16-byte alignment
        assert_eq!(mem::size_of::<MeshPushConstants>(), 80);
    }

    #[test]
    fn should_store_model_transform_column_major() {
        let transform = Matrix4::new_translation(&nalgebra::Vector3::new(1.0, 2.0, 3.0));
        let push_constants = MeshPushConstants::new(&transform, 7);
        assert_eq!(push_constants.model_transform[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(push_constants.triangle_count, 7);
    }
}
