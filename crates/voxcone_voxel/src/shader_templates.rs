pub mod clear_volume;
pub mod compute_voxelization;
pub mod mip_reduction;
pub mod rasterization_voxelization;
pub mod visualization;

#[macro_export]
macro_rules! compute_template_source {
    ($name:expr) => {{
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/shaders/compute/",
            $name,
            ".template.wgsl"
        ))
    }};
}

#[macro_export]
macro_rules! rendering_template_source {
    ($name:expr) => {{
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/shaders/rendering/",
            $name,
            ".template.wgsl"
        ))
    }};
}
