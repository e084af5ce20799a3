//! Shader template for voxelizing meshes with the rasterization pipeline.

use crate::{
    mesh::{MeshMaterial, Vertex, VoxelizableMesh},
    rendering_template_source,
    resolution::VoxelResolution,
    uniform::VoxelizationTransformsUniform,
    volume::VoxelVolume,
};
use anyhow::Result;
use std::sync::LazyLock;
use voxcone_gpu::{
    shader::template::{ShaderTemplate, SpecificShaderTemplate},
    shader_template_replacements,
};

/// Shader template for the rasterization voxelizer.
///
/// The vertex stage pulls the three vertices of each triangle from the mesh
/// storage buffers, picks the axis along which the triangle has the largest
/// projected area and projects the triangle orthographically along it. The
/// fragment stage turns the window position and depth of each fragment into
/// the coordinates of the voxel it covers and stores the sampled material
/// color there.
#[derive(Clone, Copy, Debug)]
pub struct RasterizationVoxelizationShaderTemplate {
    resolution: VoxelResolution,
}

static TEMPLATE: LazyLock<ShaderTemplate<'static>> = LazyLock::new(|| {
    ShaderTemplate::new(rendering_template_source!("rasterization_voxelization"))
});

impl RasterizationVoxelizationShaderTemplate {
    pub fn new(resolution: VoxelResolution) -> Self {
        Self { resolution }
    }
}

impl SpecificShaderTemplate for RasterizationVoxelizationShaderTemplate {
    fn resolve(&self) -> Result<String> {
        TEMPLATE.resolve(shader_template_replacements!(
            "voxels_per_side" => self.resolution.voxels_per_side(),
            "floats_per_vertex" => Vertex::FLOATS_PER_VERTEX,
            "tex_coord_offset" => Vertex::TEX_COORD_FLOAT_OFFSET,
            "grid_group" => 0,
            "transforms_binding" => VoxelizationTransformsUniform::binding(),
            "volume_group" => 1,
            "volume_binding" => VoxelVolume::storage_binding(),
            "geometry_group" => 2,
            "vertex_binding" => VoxelizableMesh::vertex_binding(),
            "index_binding" => VoxelizableMesh::index_binding(),
            "material_group" => 3,
            "texture_binding" => MeshMaterial::texture_binding(),
            "sampler_binding" => MeshMaterial::sampler_binding(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxcone_gpu::shader::template::validate_template;

    #[test]
    fn should_resolve_to_valid_wgsl() {
        validate_template(&RasterizationVoxelizationShaderTemplate::new(
            VoxelResolution::R64,
        ));
    }
}
