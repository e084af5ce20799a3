//! Shader template for clearing the base level of the voxel volume.

use crate::{
    compute_template_source,
    resolution::VoxelResolution,
    volume::{VOLUME_WORKGROUP_SIZE, VoxelVolume},
};
use anyhow::Result;
use std::sync::LazyLock;
use voxcone_gpu::{
    shader::template::{ShaderTemplate, SpecificShaderTemplate},
    shader_template_replacements,
};

/// Shader template for the kernel that zeroes every voxel of the base level,
/// making all voxels empty.
#[derive(Clone, Copy, Debug)]
pub struct ClearVolumeShaderTemplate {
    resolution: VoxelResolution,
}

static TEMPLATE: LazyLock<ShaderTemplate<'static>> =
    LazyLock::new(|| ShaderTemplate::new(compute_template_source!("clear_volume")));

impl ClearVolumeShaderTemplate {
    pub fn new(resolution: VoxelResolution) -> Self {
        Self { resolution }
    }
}

impl SpecificShaderTemplate for ClearVolumeShaderTemplate {
    fn resolve(&self) -> Result<String> {
        TEMPLATE.resolve(shader_template_replacements!(
            "voxels_per_side" => self.resolution.voxels_per_side(),
            "workgroup_size" => VOLUME_WORKGROUP_SIZE,
            "volume_group" => 0,
            "volume_binding" => VoxelVolume::storage_binding(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxcone_gpu::shader::template::validate_template;

    #[test]
    fn should_resolve_to_valid_wgsl() {
        for resolution in VoxelResolution::ALL {
            validate_template(&ClearVolumeShaderTemplate::new(resolution));
        }
    }
}
