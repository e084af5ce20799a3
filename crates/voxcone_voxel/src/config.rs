//! Configuration of the voxel engine.

use crate::{bounds::VoxelGridBounds, resolution::VoxelResolution};
use anyhow::{Result, bail};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use voxcone_gpu::wgpu;

/// Configuration parameters for the voxel engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelEngineConfig {
    /// The number of voxels along each side of the grid.
    pub resolution: VoxelResolution,
    /// One corner of the world-space box to voxelize.
    pub first_corner: [f32; 3],
    /// The opposite corner of the world-space box to voxelize.
    pub second_corner: [f32; 3],
    /// How meshes are written into the volume.
    pub strategy: VoxelizationStrategy,
    pub visualization: VisualizationConfig,
    pub cone_tracing: ConeTracingParameters,
    /// Seed for the random rotation texture used to jitter cone directions.
    pub noise_seed: u64,
}

/// The method used for writing triangle meshes into the voxel volume.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoxelizationStrategy {
    /// Render the mesh with conservative rasterization, writing voxels from
    /// the fragment stage.
    #[default]
    Rasterization,
    /// Classify triangles in a compute kernel, voxelizing small ones directly
    /// and subdividing large ones in a second, indirectly dispatched kernel.
    Compute,
}

/// Configuration parameters for the sparse voxel visualization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizationConfig {
    /// Whether occupied voxels are compacted and drawn each cycle.
    pub enabled: bool,
    /// The size of each drawn cube relative to the voxel width.
    pub cube_scale_factor: f32,
    /// The maximum number of voxel instances that can be drawn.
    pub instance_capacity: u32,
}

/// Shading parameters consumed by the external cone tracing pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConeTracingParameters {
    pub ambient_occlusion_enabled: bool,
    pub occlusion_visualization_enabled: bool,
    pub occlusion_decay_factor: f32,
    pub surface_offset: f32,
    pub cone_cutoff: f32,
}

/// Formats of the render target the voxel visualization is drawn into.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VisualizationTargetConfig {
    pub color_format: wgpu::TextureFormat,
    /// Format of the depth attachment, or [`None`] if the pass has none.
    pub depth_format: Option<wgpu::TextureFormat>,
}

impl VoxelEngineConfig {
    /// Derives the cubical grid bounds from the configured corners.
    ///
    /// # Errors
    /// See [`VoxelGridBounds::from_corners`].
    pub fn grid_bounds(&self) -> Result<VoxelGridBounds> {
        VoxelGridBounds::from_corners(
            &Point3::from(self.first_corner),
            &Point3::from(self.second_corner),
        )
    }

    /// Checks that the configuration parameters are valid.
    ///
    /// # Errors
    /// Returns an error if the corners do not span a valid box, the cube scale
    /// factor is not positive or the instance capacity is zero.
    pub fn validate(&self) -> Result<()> {
        self.grid_bounds()?;

        let cube_scale_factor = self.visualization.cube_scale_factor;
        if !cube_scale_factor.is_finite() || cube_scale_factor <= 0.0 {
            bail!("Visualization cube scale factor must be positive, got {cube_scale_factor}");
        }
        if self.visualization.instance_capacity == 0 {
            bail!("Visualization instance capacity must be at least one");
        }
        Ok(())
    }
}

impl Default for VoxelEngineConfig {
    fn default() -> Self {
        Self {
            resolution: VoxelResolution::default(),
            first_corner: [-1.0; 3],
            second_corner: [1.0; 3],
            strategy: VoxelizationStrategy::default(),
            visualization: VisualizationConfig::default(),
            cone_tracing: ConeTracingParameters::default(),
            noise_seed: 0,
        }
    }
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cube_scale_factor: 2.0,
            instance_capacity: 2_000_000,
        }
    }
}

impl Default for ConeTracingParameters {
    fn default() -> Self {
        Self {
            ambient_occlusion_enabled: false,
            occlusion_visualization_enabled: false,
            occlusion_decay_factor: 0.0,
            surface_offset: 15.719,
            cone_cutoff: 143.813,
        }
    }
}

impl Default for VisualizationTargetConfig {
    fn default() -> Self {
        Self {
            color_format: wgpu::TextureFormat::Rgba8UnormSrgb,
            depth_format: Some(wgpu::TextureFormat::Depth32Float),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_fill_in_defaults_for_missing_fields() {
        let config: VoxelEngineConfig = ron::from_str(
            "(
                resolution: 128,
                strategy: Compute,
                visualization: (enabled: true),
            )",
        )
        .unwrap();

        assert_eq!(config.resolution, VoxelResolution::R128);
        assert_eq!(config.strategy, VoxelizationStrategy::Compute);
        assert!(config.visualization.enabled);
        assert_eq!(config.visualization.instance_capacity, 2_000_000);
        assert_eq!(config.first_corner, [-1.0; 3]);
        assert_eq!(config.cone_tracing, ConeTracingParameters::default());
    }

    #[test]
    fn should_reject_unsupported_resolution() {
        let result = ron::from_str::<VoxelEngineConfig>("(resolution: 100)");
        assert!(result.is_err());
    }

    #[test]
    fn should_validate_default_config() {
        assert!(VoxelEngineConfig::default().validate().is_ok());
    }

    #[test]
    fn should_fail_validation_for_degenerate_corners() {
        let config = VoxelEngineConfig {
            first_corner: [1.0; 3],
            second_corner: [1.0; 3],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_fail_validation_for_zero_instance_capacity() {
        let mut config = VoxelEngineConfig::default();
        config.visualization.instance_capacity = 0;
        assert!(config.validate().is_err());
    }
}
