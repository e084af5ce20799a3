//! Shader templates for the sparse voxel visualization.

use crate::{
    compute_template_source, rendering_template_source,
    uniform::{VisualizationCameraUniform, VoxelGridUniform},
    visualization::{CubeVertexAttributeLocation, SparseVoxelVisualizer},
    volume::VOLUME_WORKGROUP_SIZE,
};
use anyhow::Result;
use std::sync::LazyLock;
use voxcone_gpu::{
    shader::template::{ShaderTemplate, SpecificShaderTemplate},
    shader_template_replacements,
};

/// Shader template for the kernel that zeroes the instance count of the
/// indirect draw arguments.
#[derive(Clone, Copy, Debug)]
pub struct VisualizationResetShaderTemplate;

/// Shader template for the kernel that appends the position and color of
/// every occupied voxel to the instance buffers.
#[derive(Clone, Copy, Debug)]
pub struct VisualizationCompactionShaderTemplate {
    instance_capacity: u32,
}

/// Shader template for drawing one cube per compacted voxel.
#[derive(Clone, Copy, Debug)]
pub struct VisualizationDrawShaderTemplate;

static RESET_TEMPLATE: LazyLock<ShaderTemplate<'static>> =
    LazyLock::new(|| ShaderTemplate::new(compute_template_source!("visualization_reset")));

static COMPACTION_TEMPLATE: LazyLock<ShaderTemplate<'static>> = LazyLock::new(|| {
    ShaderTemplate::new(compute_template_source!("visualization_compaction"))
});

static DRAW_TEMPLATE: LazyLock<ShaderTemplate<'static>> =
    LazyLock::new(|| ShaderTemplate::new(rendering_template_source!("visualization_draw")));

impl SpecificShaderTemplate for VisualizationResetShaderTemplate {
    fn resolve(&self) -> Result<String> {
        RESET_TEMPLATE.resolve(shader_template_replacements!(
            "draw_args_binding" => SparseVoxelVisualizer::draw_args_binding(),
        ))
    }
}

impl VisualizationCompactionShaderTemplate {
    pub fn new(instance_capacity: u32) -> Self {
        Self { instance_capacity }
    }
}

impl SpecificShaderTemplate for VisualizationCompactionShaderTemplate {
    fn resolve(&self) -> Result<String> {
        COMPACTION_TEMPLATE.resolve(shader_template_replacements!(
            "voxel_grid_struct" => VoxelGridUniform::wgsl_struct(),
            "instance_capacity" => self.instance_capacity,
            "workgroup_size" => VOLUME_WORKGROUP_SIZE,
            "grid_group" => 0,
            "grid_binding" => VoxelGridUniform::binding(),
            "instance_group" => 1,
            "volume_binding" => SparseVoxelVisualizer::volume_binding(),
            "draw_args_binding" => SparseVoxelVisualizer::draw_args_binding(),
            "positions_binding" => SparseVoxelVisualizer::positions_binding(),
            "colors_binding" => SparseVoxelVisualizer::colors_binding(),
        ))
    }
}

impl SpecificShaderTemplate for VisualizationDrawShaderTemplate {
    fn resolve(&self) -> Result<String> {
        DRAW_TEMPLATE.resolve(shader_template_replacements!(
            "camera_binding" => VisualizationCameraUniform::binding(),
            "cube_position_location" => CubeVertexAttributeLocation::CubePosition as u32,
            "instance_position_location" => CubeVertexAttributeLocation::InstancePosition as u32,
            "instance_color_location" => CubeVertexAttributeLocation::InstanceColor as u32,
        ))
    }
}
