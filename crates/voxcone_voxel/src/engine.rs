//! The voxel engine, tying together the volume, voxelizer, mip generator,
//! visualizer and cone tracing resources.

use crate::{
    bounds::VoxelGridBounds,
    cone_tracing::ConeTracingResources,
    config::{
        ConeTracingParameters, VisualizationTargetConfig, VoxelEngineConfig,
        VoxelizationStrategy,
    },
    mesh::VoxelizableMesh,
    mipmap::MipGenerator,
    resolution::VoxelResolution,
    triangle::{LARGE_TRIANGLE_CAPACITY, estimate_large_triangle_records},
    uniform::{
        VisualizationCameraUniform, VoxelFrameUniforms, VoxelGridUniform,
        VoxelizationTransformsUniform,
    },
    visualization::SparseVoxelVisualizer,
    volume::VoxelVolume,
    voxelizer::{VoxelizationPass, Voxelizer},
};
use anyhow::{Context, Result};
use nalgebra::{Matrix4, Point3};
use voxcone_gpu::{bind_group_layout::BindGroupLayoutRegistry, device::GraphicsDevice, wgpu};

/// GPU voxelization engine.
///
/// Each cycle clears the volume, voxelizes every mesh into the base level,
/// regenerates the mip chain and, when visualization is enabled, compacts
/// the occupied voxels into instance buffers for drawing. All of it is
/// recorded into the caller's command encoder, so the host never waits on
/// the GPU except in [`Self::revoxelize`] and the diagnostic readbacks.
#[derive(Debug)]
pub struct VoxelEngine {
    config: VoxelEngineConfig,
    target: VisualizationTargetConfig,
    bounds: VoxelGridBounds,
    camera_view_projection: Matrix4<f32>,
    uniforms: VoxelFrameUniforms,
    volume: VoxelVolume,
    voxelizer: Voxelizer,
    mip_generator: MipGenerator,
    visualizer: Option<SparseVoxelVisualizer>,
    cone_tracing: ConeTracingResources,
}

impl VoxelEngine {
    /// Creates every GPU resource and pipeline of the engine for the given
    /// configuration. The visualization is drawn into targets with the
    /// formats in `target`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or any resource or
    /// pipeline can not be created.
    pub fn new(
        graphics_device: &GraphicsDevice,
        bind_group_layout_registry: &BindGroupLayoutRegistry,
        config: VoxelEngineConfig,
        target: VisualizationTargetConfig,
    ) -> Result<Self> {
        Self::new_with_camera(
            graphics_device,
            bind_group_layout_registry,
            config,
            target,
            Matrix4::identity(),
        )
    }

    fn new_with_camera(
        graphics_device: &GraphicsDevice,
        bind_group_layout_registry: &BindGroupLayoutRegistry,
        config: VoxelEngineConfig,
        target: VisualizationTargetConfig,
        camera_view_projection: Matrix4<f32>,
    ) -> Result<Self> {
        config.validate().context("Invalid voxel engine configuration")?;

        let bounds = config.grid_bounds()?;
        let resolution = config.resolution;

        log::info!(
            "Creating {resolution} voxel engine for grid from {} to {} (voxel width {})",
            bounds.min(),
            bounds.max(),
            bounds.voxel_width(resolution)
        );

        let grid_uniform = VoxelGridUniform::new(&bounds, resolution, &config.cone_tracing);
        let transforms_uniform = VoxelizationTransformsUniform::new(&bounds);
        let camera_uniform = VisualizationCameraUniform::new(
            &camera_view_projection,
            visualization_cube_scale(&bounds, resolution, config.visualization.cube_scale_factor),
        );

        let uniforms = VoxelFrameUniforms::new(
            graphics_device,
            &grid_uniform,
            &transforms_uniform,
            &camera_uniform,
        );

        let volume = VoxelVolume::new(graphics_device, resolution)?;

        let voxelizer = Voxelizer::new(
            graphics_device,
            bind_group_layout_registry,
            config.strategy,
            resolution,
            &uniforms,
            &volume,
        )?;

        let mip_generator = MipGenerator::new(graphics_device, &volume)?;

        let visualizer = if config.visualization.enabled {
            Some(SparseVoxelVisualizer::new(
                graphics_device,
                &config.visualization,
                &target,
                &uniforms,
                &volume,
            )?)
        } else {
            None
        };

        let cone_tracing =
            ConeTracingResources::new(graphics_device, &uniforms, &volume, config.noise_seed)?;

        Ok(Self {
            config,
            target,
            bounds,
            camera_view_projection,
            uniforms,
            volume,
            voxelizer,
            mip_generator,
            visualizer,
            cone_tracing,
        })
    }

    pub fn config(&self) -> &VoxelEngineConfig {
        &self.config
    }

    pub fn resolution(&self) -> VoxelResolution {
        self.config.resolution
    }

    pub fn bounds(&self) -> &VoxelGridBounds {
        &self.bounds
    }

    pub fn aabb_min(&self) -> &Point3<f32> {
        self.bounds.min()
    }

    pub fn aabb_max(&self) -> &Point3<f32> {
        self.bounds.max()
    }

    pub fn center(&self) -> &Point3<f32> {
        self.bounds.center()
    }

    pub fn voxel_width(&self) -> f32 {
        self.bounds.voxel_width(self.config.resolution)
    }

    pub fn volume(&self) -> &VoxelVolume {
        &self.volume
    }

    pub fn voxelizer(&self) -> &Voxelizer {
        &self.voxelizer
    }

    pub fn uniforms(&self) -> &VoxelFrameUniforms {
        &self.uniforms
    }

    /// Returns the visualizer, or [`None`] if visualization is disabled.
    pub fn visualizer(&self) -> Option<&SparseVoxelVisualizer> {
        self.visualizer.as_ref()
    }

    pub fn cone_tracing(&self) -> &ConeTracingResources {
        &self.cone_tracing
    }

    /// Stores the view-projection transform of the external camera. It is
    /// written to the GPU by the next call to [`Self::update_uniform_buffers`].
    pub fn set_camera_view_projection(&mut self, view_projection: Matrix4<f32>) {
        self.camera_view_projection = view_projection;
    }

    /// Replaces the shading parameters of the cone tracing pass. They are
    /// written to the GPU by the next call to [`Self::update_uniform_buffers`]
    /// for each frame.
    pub fn set_cone_tracing_parameters(&mut self, parameters: ConeTracingParameters) {
        log::debug!("Setting cone tracing parameters to {parameters:?}");
        self.config.cone_tracing = parameters;
    }

    /// Turns the sparse visualization on or off. The visualizer and its
    /// buffers are created when first enabled and dropped when disabled. The
    /// setting is kept across [`Self::revoxelize`].
    ///
    /// # Errors
    /// Returns an error if the visualizer can not be created.
    pub fn set_visualization_enabled(
        &mut self,
        graphics_device: &GraphicsDevice,
        enabled: bool,
    ) -> Result<()> {
        match (enabled, self.visualizer.is_some()) {
            (true, false) => {
                log::info!("Enabling voxel visualization");
                self.visualizer = Some(
                    SparseVoxelVisualizer::new(
                        graphics_device,
                        &self.config.visualization,
                        &self.target,
                        &self.uniforms,
                        &self.volume,
                    )
                    .context("Failed to create voxel visualizer")?,
                );
            }
            (false, true) => {
                log::info!("Disabling voxel visualization");
                self.visualizer = None;
            }
            _ => {}
        }
        self.config.visualization.enabled = enabled;
        Ok(())
    }

    /// The grid uniform written by [`Self::update_uniform_buffers`].
    pub fn grid_uniform(&self) -> VoxelGridUniform {
        VoxelGridUniform::new(
            &self.bounds,
            self.config.resolution,
            &self.config.cone_tracing,
        )
    }

    /// Queues writes of the current grid, transform and camera data to the
    /// uniform buffers of the given frame.
    pub fn update_uniform_buffers(&self, graphics_device: &GraphicsDevice, frame_index: usize) {
        let resolution = self.config.resolution;
        self.uniforms.write(
            graphics_device,
            frame_index,
            &self.grid_uniform(),
            &VoxelizationTransformsUniform::new(&self.bounds),
            &VisualizationCameraUniform::new(
                &self.camera_view_projection,
                visualization_cube_scale(
                    &self.bounds,
                    resolution,
                    self.config.visualization.cube_scale_factor,
                ),
            ),
        );
    }

    /// Records the clearing of the base level of the volume.
    pub fn clear_volume(&self, command_encoder: &mut wgpu::CommandEncoder) {
        log::debug!("Recording voxel volume clear");
        self.volume.record_clear(command_encoder);
    }

    /// See [`Voxelizer::begin_voxelization`].
    pub fn begin_voxelization<'a>(
        &self,
        command_encoder: &'a mut wgpu::CommandEncoder,
        frame_index: usize,
    ) -> VoxelizationPass<'a> {
        self.voxelizer.begin_voxelization(
            command_encoder,
            &self.uniforms,
            &self.volume,
            frame_index,
        )
    }

    /// See [`Voxelizer::voxelize`].
    ///
    /// # Errors
    /// See [`Voxelizer::voxelize`].
    pub fn voxelize(
        &self,
        pass: &mut VoxelizationPass<'_>,
        mesh: &VoxelizableMesh,
        frame_index: usize,
    ) -> Result<()> {
        self.voxelizer
            .voxelize(pass, mesh, &self.uniforms, &self.volume, frame_index)
    }

    /// See [`Voxelizer::end_voxelization`].
    pub fn end_voxelization(&self, pass: VoxelizationPass<'_>) {
        self.voxelizer.end_voxelization(pass);
    }

    /// Records the regeneration of every mip level from the base level.
    pub fn generate_mip_maps(&self, command_encoder: &mut wgpu::CommandEncoder) {
        self.mip_generator.record(command_encoder);
    }

    /// Records the reset of the visualization instance count. Does nothing if
    /// visualization is disabled.
    pub fn dispatch_visualization_reset(&self, command_encoder: &mut wgpu::CommandEncoder) {
        if let Some(visualizer) = &self.visualizer {
            log::debug!("Recording voxel visualization reset");
            visualizer.record_reset(command_encoder);
        }
    }

    /// Records the compaction of the occupied voxels into the visualization
    /// instance buffers. Does nothing if visualization is disabled.
    pub fn dispatch_visualization_compute(
        &self,
        command_encoder: &mut wgpu::CommandEncoder,
        frame_index: usize,
    ) {
        if let Some(visualizer) = &self.visualizer {
            log::debug!("Recording voxel visualization compaction");
            visualizer.record_compaction(command_encoder, &self.uniforms, frame_index);
        }
    }

    /// Records the draw of the compacted voxels into the given render pass,
    /// whose attachments must have the formats the engine was created with.
    /// Does nothing if visualization is disabled.
    pub fn visualize_voxel_grid(&self, render_pass: &mut wgpu::RenderPass<'_>, frame_index: usize) {
        if let Some(visualizer) = &self.visualizer {
            visualizer.record_draw(render_pass, &self.uniforms, frame_index);
        }
    }

    /// Records a complete voxelization cycle for the given meshes: clearing
    /// the volume, voxelizing every mesh, generating the mip chain and, if
    /// visualization is enabled, resetting and compacting the visualization
    /// instances. Drawing is left to [`Self::visualize_voxel_grid`].
    ///
    /// # Errors
    /// See [`Voxelizer::voxelize`].
    pub fn record_voxelization_cycle(
        &self,
        command_encoder: &mut wgpu::CommandEncoder,
        meshes: &[VoxelizableMesh],
        frame_index: usize,
    ) -> Result<()> {
        log::debug!(
            "Recording voxelization cycle for {} meshes (frame {frame_index})",
            meshes.len()
        );

        self.clear_volume(command_encoder);

        let mut pass = self.begin_voxelization(command_encoder, frame_index);
        for mesh in meshes {
            self.voxelize(&mut pass, mesh, frame_index)?;
        }
        self.end_voxelization(pass);

        self.generate_mip_maps(command_encoder);

        self.dispatch_visualization_reset(command_encoder);
        self.dispatch_visualization_compute(command_encoder, frame_index);

        Ok(())
    }

    /// Predicts how many large-triangle records the compute voxelizer would
    /// produce for the given mesh, and logs a warning if they would not all
    /// fit. Returns the estimate.
    pub fn check_large_triangle_capacity(&self, mesh: &VoxelizableMesh) -> u64 {
        let estimate = estimate_large_triangle_records(
            mesh.positions(),
            mesh.indices(),
            mesh.model_transform(),
            &self.bounds,
            self.config.resolution,
        );

        if self.config.strategy == VoxelizationStrategy::Compute
            && estimate > u64::from(LARGE_TRIANGLE_CAPACITY)
        {
            log::warn!(
                "Mesh {} needs an estimated {estimate} large triangle records, exceeding the capacity of {LARGE_TRIANGLE_CAPACITY}; some large triangles will be dropped",
                mesh.label()
            );
        }

        estimate
    }

    /// Reads back the number of large-triangle records produced for the last
    /// mesh voxelized by the compute voxelizer, or [`None`] for the
    /// rasterization voxelizer.
    ///
    /// # Errors
    /// Returns an error if the readback fails.
    pub fn read_large_triangle_record_count(
        &self,
        graphics_device: &GraphicsDevice,
    ) -> Result<Option<u32>> {
        match &self.voxelizer {
            Voxelizer::Compute(voxelizer) => voxelizer
                .large_triangle_buffers()
                .read_record_count(graphics_device)
                .map(Some),
            Voxelizer::Rasterization(_) => Ok(None),
        }
    }

    /// Tears down every GPU resource and pipeline and rebuilds them for the
    /// given resolution, after waiting for the device to become idle. The
    /// camera transform is kept. The rebuild happens even if the resolution
    /// is unchanged.
    ///
    /// # Errors
    /// Returns an error if any resource or pipeline can not be created. The
    /// engine is left unchanged in that case.
    pub fn revoxelize(
        &mut self,
        graphics_device: &GraphicsDevice,
        bind_group_layout_registry: &BindGroupLayoutRegistry,
        resolution: VoxelResolution,
    ) -> Result<()> {
        log::info!(
            "Revoxelizing from {} to {resolution}",
            self.config.resolution
        );

        graphics_device.wait_until_idle();

        let config = VoxelEngineConfig {
            resolution,
            ..self.config.clone()
        };

        *self = Self::new_with_camera(
            graphics_device,
            bind_group_layout_registry,
            config,
            self.target,
            self.camera_view_projection,
        )
        .with_context(|| format!("Failed to rebuild voxel engine at {resolution}"))?;

        Ok(())
    }
}

/// Returns the edge length of the cube drawn for each voxel. The drawn cube
/// spans `[-0.5, 0.5]` in model space, so a scale factor of 2 gives cubes
/// two voxels wide.
pub fn visualization_cube_scale(
    bounds: &VoxelGridBounds,
    resolution: VoxelResolution,
    cube_scale_factor: f32,
) -> f32 {
    cube_scale_factor * bounds.voxel_width(resolution)
}
