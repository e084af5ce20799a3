//! Shader templates for the two passes of the compute voxelizer.

use crate::{
    compute_template_source,
    mesh::{MeshMaterial, Vertex, VoxelizableMesh},
    resolution::VoxelResolution,
    triangle::{INNER_TRIANGLES_PER_RECORD, LARGE_TRIANGLE_CAPACITY, SMALL_TRIANGLE_MAX_SPAN},
    uniform::VoxelGridUniform,
    volume::VoxelVolume,
    voxelizer::compute::LargeTriangleBuffers,
};
use anyhow::Result;
use std::sync::LazyLock;
use voxcone_gpu::{
    shader::template::{ShaderTemplate, SpecificShaderTemplate},
    shader_template_replacements,
};

/// Shader template for the first compute voxelization pass. Each invocation
/// classifies one triangle, voxelizes it directly if it is small and
/// otherwise appends records for it to the large-triangle buffer, growing the
/// workgroup count of the second pass.
#[derive(Clone, Copy, Debug)]
pub struct SmallTriangleVoxelizationShaderTemplate {
    resolution: VoxelResolution,
}

/// Shader template for the second compute voxelization pass, dispatched
/// indirectly with one workgroup per large-triangle record. Each invocation
/// voxelizes one inner triangle of the subdivided large triangle.
#[derive(Clone, Copy, Debug)]
pub struct LargeTriangleVoxelizationShaderTemplate {
    resolution: VoxelResolution,
}

/// Number of invocations in a workgroup of the small-triangle pass.
pub const SMALL_TRIANGLE_WORKGROUP_SIZE: u32 = 64;

static COMMON_TEMPLATE: LazyLock<ShaderTemplate<'static>> = LazyLock::new(|| {
    ShaderTemplate::new(compute_template_source!(
        "compute_voxelization_common"
    ))
});

static SMALL_TRIANGLE_TEMPLATE: LazyLock<ShaderTemplate<'static>> = LazyLock::new(|| {
    ShaderTemplate::new(compute_template_source!("compute_voxelization_small"))
});

static LARGE_TRIANGLE_TEMPLATE: LazyLock<ShaderTemplate<'static>> = LazyLock::new(|| {
    ShaderTemplate::new(compute_template_source!("compute_voxelization_large"))
});

fn resolve_triangle_voxelization(resolution: VoxelResolution) -> Result<String> {
    COMMON_TEMPLATE.resolve(shader_template_replacements!(
        "voxel_grid_struct" => VoxelGridUniform::wgsl_struct(),
        "voxels_per_side" => resolution.voxels_per_side(),
        "floats_per_vertex" => Vertex::FLOATS_PER_VERTEX,
        "tex_coord_offset" => Vertex::TEX_COORD_FLOAT_OFFSET,
        "small_triangle_max_span" => SMALL_TRIANGLE_MAX_SPAN,
        "grid_group" => 0,
        "grid_binding" => VoxelGridUniform::binding(),
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

impl SmallTriangleVoxelizationShaderTemplate {
    pub fn new(resolution: VoxelResolution) -> Self {
        Self { resolution }
    }
}

impl LargeTriangleVoxelizationShaderTemplate {
    pub fn new(resolution: VoxelResolution) -> Self {
        Self { resolution }
    }
}

impl SpecificShaderTemplate for SmallTriangleVoxelizationShaderTemplate {
    fn resolve(&self) -> Result<String> {
        SMALL_TRIANGLE_TEMPLATE.resolve(shader_template_replacements!(
            "triangle_voxelization" => resolve_triangle_voxelization(self.resolution)?,
            "workgroup_size" => SMALL_TRIANGLE_WORKGROUP_SIZE,
            "inner_triangles_per_record" => INNER_TRIANGLES_PER_RECORD,
            "large_triangle_capacity" => LARGE_TRIANGLE_CAPACITY,
            "records_group" => 4,
            "records_binding" => LargeTriangleBuffers::records_binding(),
            "dispatch_args_binding" => LargeTriangleBuffers::dispatch_args_binding(),
        ))
    }
}

impl SpecificShaderTemplate for LargeTriangleVoxelizationShaderTemplate {
    fn resolve(&self) -> Result<String> {
        LARGE_TRIANGLE_TEMPLATE.resolve(shader_template_replacements!(
            "triangle_voxelization" => resolve_triangle_voxelization(self.resolution)?,
            "inner_triangles_per_record" => INNER_TRIANGLES_PER_RECORD,
            "records_group" => 4,
            "records_binding" => LargeTriangleBuffers::records_binding(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxcone_gpu::shader::template::validate_template;

    #[test]
    fn should_resolve_small_triangle_pass_to_valid_wgsl() {
        validate_template(&SmallTriangleVoxelizationShaderTemplate::new(
            VoxelResolution::R128,
        ));
    }

    #[test]
    fn should_resolve_large_triangle_pass_to_valid_wgsl() {
        validate_template(&LargeTriangleVoxelizationShaderTemplate::new(
            VoxelResolution::R128,
        ));
    }

    #[test]
    fn should_insert_resolution_into_shared_code() {
        let source = resolve_triangle_voxelization(VoxelResolution::R256).unwrap();
        assert!(source.contains("const VOXELS_PER_SIDE: u32 = 256u;"));
        assert!(!source.contains("{{"));
    }
}
