//! Cubical world-space bounds of the voxel grid.

use crate::resolution::VoxelResolution;
use anyhow::{Result, bail};
use nalgebra::{Matrix4, Point3, Translation3, Vector3};

/// The axis-aligned cube in world space covered by the voxel grid.
///
/// The cube is derived from two arbitrary corner points by centering a cube
/// with side equal to the longest extent of the box they span on the center
/// of that box. The cube therefore always contains the original box.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelGridBounds {
    min: Point3<f32>,
    max: Point3<f32>,
    center: Point3<f32>,
    length: f32,
}

/// The grid axis the voxelization projection looks along.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VoxelizationAxis {
    X,
    Y,
    Z,
}

impl VoxelGridBounds {
    /// Creates the cubical bounds for the box spanned by the two given corner
    /// points.
    ///
    /// # Errors
    /// Returns an error if the longest extent of the box is not a positive
    /// finite number.
    pub fn from_corners(first_corner: &Point3<f32>, second_corner: &Point3<f32>) -> Result<Self> {
        if !first_corner
            .iter()
            .chain(second_corner.iter())
            .all(|coord| coord.is_finite())
        {
            bail!("Voxel grid corners {first_corner} and {second_corner} are not finite");
        }

        let extents = (second_corner - first_corner).abs();
        let length = extents.max();

        if !(length.is_finite() && length > 0.0) {
            bail!(
                "Invalid voxel grid corners {first_corner} and {second_corner}: longest extent is {length}"
            );
        }

        let center = nalgebra::center(first_corner, second_corner);
        let half_extent = Vector3::repeat(0.5 * length);

        Ok(Self {
            min: center - half_extent,
            max: center + half_extent,
            center,
            length,
        })
    }

    /// The corner of the cube with the smallest coordinates.
    pub fn min(&self) -> &Point3<f32> {
        &self.min
    }

    /// The corner of the cube with the largest coordinates.
    pub fn max(&self) -> &Point3<f32> {
        &self.max
    }

    pub fn center(&self) -> &Point3<f32> {
        &self.center
    }

    /// The side length of the cube.
    pub fn length(&self) -> f32 {
        self.length
    }

    /// The side length of a single voxel at the given resolution.
    pub fn voxel_width(&self, resolution: VoxelResolution) -> f32 {
        self.length / resolution.voxels_per_side() as f32
    }

    /// Returns the view transform that centers the cube on the origin and
    /// rotates the coordinate axes so that the given axis becomes the view
    /// Z-axis. The remaining two axes follow in cyclic order, so looking along
    /// X maps `(x, y, z)` to `(y, z, x)` and looking along Y maps it to
    /// `(z, x, y)`.
    pub fn axis_view_transform(&self, axis: VoxelizationAxis) -> Matrix4<f32> {
        #[rustfmt::skip]
        let permutation = match axis {
            VoxelizationAxis::X => Matrix4::new(
                0.0, 1.0, 0.0, 0.0,
                0.0, 0.0, 1.0, 0.0,
                1.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ),
            VoxelizationAxis::Y => Matrix4::new(
                0.0, 0.0, 1.0, 0.0,
                1.0, 0.0, 0.0, 0.0,
                0.0, 1.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ),
            VoxelizationAxis::Z => Matrix4::identity(),
        };
        permutation * Translation3::from(-self.center.coords).to_homogeneous()
    }

    /// Returns the orthographic projection mapping the centered cube to the
    /// clip volume, with X and Y in `[-1, 1]` and depth in `[0, 1]`.
    pub fn orthographic_projection(&self) -> Matrix4<f32> {
        let inverse_length = self.length.recip();
        #[rustfmt::skip]
        let projection = Matrix4::new(
            2.0 * inverse_length, 0.0,                  0.0,            0.0,
            0.0,                  2.0 * inverse_length, 0.0,            0.0,
            0.0,                  0.0,                  inverse_length, 0.5,
            0.0,                  0.0,                  0.0,            1.0,
        );
        projection
    }
}

impl VoxelizationAxis {
    pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];
}
