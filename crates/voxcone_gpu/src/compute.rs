//! Compute pipelines.

use crate::shader::Shader;

/// Creates a pipeline layout for a compute pipeline with the given bind group
/// layouts and push constant ranges.
pub fn create_compute_pipeline_layout(
    device: &wgpu::Device,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    push_constant_ranges: &[wgpu::PushConstantRange],
    label: &str,
) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        bind_group_layouts,
        push_constant_ranges,
        label: Some(label),
    })
}

/// Creates a compute pipeline running the given entry point of the given
/// shader.
pub fn create_compute_pipeline(
    device: &wgpu::Device,
    pipeline_layout: &wgpu::PipelineLayout,
    shader: &Shader,
    entry_point: &str,
    label: &str,
) -> wgpu::ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        layout: Some(pipeline_layout),
        module: shader.module(),
        entry_point: Some(entry_point),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
        label: Some(label),
    })
}

/// Returns the number of workgroups of the given size needed to cover the
/// given number of invocations along one dimension.
pub const fn workgroup_count(invocations: u32, workgroup_size: u32) -> u32 {
    invocations.div_ceil(workgroup_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_cover_all_invocations_with_workgroups() {
        assert_eq!(workgroup_count(0, 4), 0);
        assert_eq!(workgroup_count(1, 4), 1);
        assert_eq!(workgroup_count(4, 4), 1);
        assert_eq!(workgroup_count(5, 4), 2);
        assert_eq!(workgroup_count(512, 4), 128);
    }
}
