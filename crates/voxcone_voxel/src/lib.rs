//! GPU voxelization of triangle meshes into a mipmapped 3D volume, with
//! sparse visualization of the occupied voxels and resources for voxel cone
//! tracing.

pub mod bounds;
pub mod cone_tracing;
pub mod config;
pub mod engine;
pub mod mesh;
pub mod mipmap;
pub mod reference;
pub mod resolution;
pub mod shader_templates;
pub mod triangle;
pub mod uniform;
pub mod visualization;
pub mod volume;
pub mod voxelizer;

pub use config::{VisualizationTargetConfig, VoxelEngineConfig, VoxelizationStrategy};
pub use engine::VoxelEngine;
pub use resolution::VoxelResolution;
