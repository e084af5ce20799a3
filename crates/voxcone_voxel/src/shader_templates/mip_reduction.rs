//! Shader template for reducing one mip level of the voxel volume into the
//! next.

use crate::{
    compute_template_source,
    mipmap::MipGenerator,
    volume::VOLUME_WORKGROUP_SIZE,
};
use anyhow::Result;
use std::sync::LazyLock;
use voxcone_gpu::{
    shader::template::{ShaderTemplate, SpecificShaderTemplate},
    shader_template_replacements,
};

/// Shader template for the mip reduction kernel, which writes the average of
/// the eight children of every voxel of the destination level. The kernel
/// reads the level extents from the bound textures, so one pipeline serves
/// every level.
#[derive(Clone, Copy, Debug)]
pub struct MipReductionShaderTemplate;

static TEMPLATE: LazyLock<ShaderTemplate<'static>> =
    LazyLock::new(|| ShaderTemplate::new(compute_template_source!("mip_reduction")));

impl SpecificShaderTemplate for MipReductionShaderTemplate {
    fn resolve(&self) -> Result<String> {
        TEMPLATE.resolve(shader_template_replacements!(
            "workgroup_size" => VOLUME_WORKGROUP_SIZE,
            "source_binding" => MipGenerator::source_binding(),
            "destination_binding" => MipGenerator::destination_binding(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxcone_gpu::shader::template::validate_template;

    #[test]
    fn should_resolve_to_valid_wgsl() {
        validate_template(&MipReductionShaderTemplate);
    }
}
