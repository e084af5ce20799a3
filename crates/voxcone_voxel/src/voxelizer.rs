//! Voxelization of triangle meshes into the base level of the voxel volume.

pub mod compute;
pub mod rasterization;

pub use compute::ComputeVoxelizer;
pub use rasterization::RasterizationVoxelizer;

use crate::{
    config::VoxelizationStrategy, mesh::VoxelizableMesh, resolution::VoxelResolution,
    uniform::VoxelFrameUniforms, volume::VoxelVolume,
};
use anyhow::{Result, bail};
use voxcone_gpu::{bind_group_layout::BindGroupLayoutRegistry, device::GraphicsDevice, wgpu};

/// Writes the voxels covered by meshes into the base level of a
/// [`VoxelVolume`], using the strategy selected at construction.
///
/// Every voxelization follows the same sequence: [`Self::begin_voxelization`]
/// opens a [`VoxelizationPass`], [`Self::voxelize`] is called once per mesh
/// and [`Self::end_voxelization`] closes the pass.
#[derive(Debug)]
pub enum Voxelizer {
    Rasterization(RasterizationVoxelizer),
    Compute(ComputeVoxelizer),
}

/// An open voxelization pass, created by [`Voxelizer::begin_voxelization`].
#[derive(Debug)]
pub enum VoxelizationPass<'a> {
    /// A render pass with the voxelization pipeline, grid transforms and
    /// volume bound.
    Rasterization(wgpu::RenderPass<'a>),
    /// The encoder that each mesh records its compute passes into.
    Compute(&'a mut wgpu::CommandEncoder),
}

impl Voxelizer {
    /// Creates the voxelizer for the given strategy.
    ///
    /// # Errors
    /// Returns an error if a shader fails to compile or a pipeline can not be
    /// created.
    pub fn new(
        graphics_device: &GraphicsDevice,
        bind_group_layout_registry: &BindGroupLayoutRegistry,
        strategy: VoxelizationStrategy,
        resolution: VoxelResolution,
        uniforms: &VoxelFrameUniforms,
        volume: &VoxelVolume,
    ) -> Result<Self> {
        log::info!("Creating {strategy:?} voxelizer for {resolution} grid");

        Ok(match strategy {
            VoxelizationStrategy::Rasterization => {
                Self::Rasterization(RasterizationVoxelizer::new(
                    graphics_device,
                    bind_group_layout_registry,
                    resolution,
                    uniforms,
                    volume,
                )?)
            }
            VoxelizationStrategy::Compute => Self::Compute(ComputeVoxelizer::new(
                graphics_device,
                bind_group_layout_registry,
                resolution,
                uniforms,
                volume,
            )?),
        })
    }

    pub fn strategy(&self) -> VoxelizationStrategy {
        match self {
            Self::Rasterization(_) => VoxelizationStrategy::Rasterization,
            Self::Compute(_) => VoxelizationStrategy::Compute,
        }
    }

    /// Opens a voxelization pass in the given encoder, using the uniforms of
    /// the given frame.
    pub fn begin_voxelization<'a>(
        &self,
        command_encoder: &'a mut wgpu::CommandEncoder,
        uniforms: &VoxelFrameUniforms,
        volume: &VoxelVolume,
        frame_index: usize,
    ) -> VoxelizationPass<'a> {
        log::debug!("Beginning {:?} voxelization", self.strategy());

        match self {
            Self::Rasterization(voxelizer) => VoxelizationPass::Rasterization(
                voxelizer.begin_render_pass(
                    command_encoder,
                    uniforms.grid_bind_group(frame_index),
                    volume,
                ),
            ),
            Self::Compute(_) => VoxelizationPass::Compute(command_encoder),
        }
    }

    /// Records the voxelization of the given mesh into the given pass.
    ///
    /// # Errors
    /// Returns an error if the pass was opened by a voxelizer with a
    /// different strategy.
    pub fn voxelize(
        &self,
        pass: &mut VoxelizationPass<'_>,
        mesh: &VoxelizableMesh,
        uniforms: &VoxelFrameUniforms,
        volume: &VoxelVolume,
        frame_index: usize,
    ) -> Result<()> {
        log::trace!(
            "Voxelizing mesh {} with {} triangles",
            mesh.label(),
            mesh.triangle_count()
        );

        match (self, pass) {
            (Self::Rasterization(voxelizer), VoxelizationPass::Rasterization(render_pass)) => {
                voxelizer.record_mesh(render_pass, mesh);
            }
            (Self::Compute(voxelizer), VoxelizationPass::Compute(command_encoder)) => {
                voxelizer.record_mesh(
                    command_encoder,
                    uniforms.grid_bind_group(frame_index),
                    volume,
                    mesh,
                );
            }
            _ => bail!(
                "Voxelization pass does not match {:?} voxelizer",
                self.strategy()
            ),
        }
        Ok(())
    }

    /// Closes the given voxelization pass.
    pub fn end_voxelization(&self, pass: VoxelizationPass<'_>) {
        log::debug!("Ending {:?} voxelization", self.strategy());
        drop(pass);
    }
}
