//! Headless driver for the voxcone voxel engine.

pub mod gpu;
pub mod io;
pub mod run;

pub use voxcone_gpu;
pub use voxcone_voxel;
