//! Classification and subdivision of triangles for compute voxelization.
//!
//! These functions mirror the computations performed by the compute
//! voxelization kernels, so that the host can predict how many large-triangle
//! records a mesh will produce.

use crate::{bounds::VoxelGridBounds, resolution::VoxelResolution};
use nalgebra::{Matrix4, Point3};

/// Triangles whose clamped footprint spans at most this many voxels along
/// every axis are voxelized directly by the thread that classifies them.
pub const SMALL_TRIANGLE_MAX_SPAN: u32 = 4;

/// The number of inner triangles handled by one large-triangle record (one
/// workgroup of the large-triangle pass).
pub const INNER_TRIANGLES_PER_RECORD: u32 = 64;

/// The maximum number of large-triangle records per voxelized mesh.
pub const LARGE_TRIANGLE_CAPACITY: u32 = 10_000;

/// Converts the given world-space position into continuous grid coordinates,
/// where voxel `(i, j, k)` covers `[i, i + 1) x [j, j + 1) x [k, k + 1)`.
pub fn world_to_grid(
    bounds: &VoxelGridBounds,
    resolution: VoxelResolution,
    position: &Point3<f32>,
) -> Point3<f32> {
    Point3::from((position - bounds.min()) / bounds.voxel_width(resolution))
}

/// Returns the largest number of voxels spanned along any axis by the
/// bounding box of the given triangle (in grid coordinates), after clamping
/// the box to the grid. An axis without finite coordinates spans one voxel.
pub fn triangle_voxel_span(vertices: &[Point3<f32>; 3], voxels_per_side: u32) -> u32 {
    let max_index = voxels_per_side.saturating_sub(1) as f32;
    let mut span = 1;
    for dim in 0..3 {
        let (lower, upper) = vertices
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lower, upper), vertex| {
                (lower.min(vertex[dim]), upper.max(vertex[dim]))
            });
        let lower = lower.floor().clamp(0.0, max_index) as u32;
        let upper = upper.floor().clamp(0.0, max_index) as u32;
        span = span.max(upper.saturating_sub(lower) + 1);
    }
    span
}

/// Whether a triangle with the given span is voxelized directly.
pub const fn is_small_triangle(span: u32) -> bool {
    span <= SMALL_TRIANGLE_MAX_SPAN
}

/// The number of segments each edge of a large triangle with the given span
/// is divided into. The triangle is split into the square of this number of
/// inner triangles.
pub const fn subdivision_factor(span: u32) -> u32 {
    span.div_ceil(SMALL_TRIANGLE_MAX_SPAN)
}

/// The number of large-triangle records needed for a triangle with the given
/// span. Zero for small triangles.
pub const fn large_triangle_record_count(span: u32) -> u32 {
    if is_small_triangle(span) {
        return 0;
    }
    let factor = subdivision_factor(span);
    (factor * factor).div_ceil(INNER_TRIANGLES_PER_RECORD)
}

/// Returns the lattice coordinates `(l, m)` of the three corners of the inner
/// triangle with the given index, for a triangle subdivided with the given
/// factor `s`. The lattice point `(l, m)` lies at
/// `v0 + (l / s) * (v1 - v0) + (m / s) * (v2 - v1)`, with `0 <= m <= l <= s`.
///
/// Row `r` of the subdivision holds the `2r + 1` inner triangles between the
/// lattice lines `l = r` and `l = r + 1`, alternating between triangles with
/// an edge on line `r + 1` and triangles with an edge on line `r`.
pub fn inner_triangle_lattice_coords(inner_index: u32) -> [(u32, u32); 3] {
    let row = inner_index.isqrt();
    let in_row = inner_index - row * row;
    if in_row % 2 == 0 {
        let m = in_row / 2;
        [(row, m), (row + 1, m), (row + 1, m + 1)]
    } else {
        let m = (in_row - 1) / 2;
        [(row, m), (row + 1, m + 1), (row, m + 1)]
    }
}

/// Returns the vertices of the inner triangle with the given index when the
/// given triangle is subdivided with the given factor.
pub fn inner_triangle_vertices(
    vertices: &[Point3<f32>; 3],
    subdivision_factor: u32,
    inner_index: u32,
) -> [Point3<f32>; 3] {
    let inverse_factor = (subdivision_factor as f32).recip();
    let edge_01 = vertices[1] - vertices[0];
    let edge_12 = vertices[2] - vertices[1];

    inner_triangle_lattice_coords(inner_index).map(|(l, m)| {
        vertices[0] + edge_01 * (l as f32 * inverse_factor) + edge_12 * (m as f32 * inverse_factor)
    })
}

/// Predicts the number of large-triangle records the compute voxelizer will
/// produce for the given mesh geometry, placed in the world with the given
/// model transform.
pub fn estimate_large_triangle_records(
    positions: &[Point3<f32>],
    indices: &[u32],
    model_transform: &Matrix4<f32>,
    bounds: &VoxelGridBounds,
    resolution: VoxelResolution,
) -> u64 {
    let voxels_per_side = resolution.voxels_per_side();

    indices
        .chunks_exact(3)
        .filter_map(|triangle| {
            let mut vertices = [Point3::origin(); 3];
            for (vertex, &index) in vertices.iter_mut().zip(triangle) {
                let position = positions.get(index as usize)?;
                *vertex = world_to_grid(
                    bounds,
                    resolution,
                    &model_transform.transform_point(position),
                );
            }
            let span = triangle_voxel_span(&vertices, voxels_per_side);
            Some(u64::from(large_triangle_record_count(span)))
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn triangle_area(vertices: &[Point3<f32>; 3]) -> f32 {
        0.5 * (vertices[1] - vertices[0])
            .cross(&(vertices[2] - vertices[0]))
            .norm()
    }

    #[test]
    fn should_give_span_one_for_triangle_inside_single_voxel() {
        let vertices = [
            Point3::new(3.1, 3.2, 3.3),
            Point3::new(3.9, 3.2, 3.3),
            Point3::new(3.5, 3.8, 3.6),
        ];
        assert_eq!(triangle_voxel_span(&vertices, 64), 1);
    }

    #[test]
    fn should_give_largest_span_over_axes() {
        let vertices = [
            Point3::new(0.5, 0.5, 0.5),
            Point3::new(6.5, 0.5, 0.5),
            Point3::new(0.5, 2.5, 0.5),
        ];
        assert_eq!(triangle_voxel_span(&vertices, 64), 7);
    }

    #[test]
    fn should_clamp_span_to_grid() {
        let vertices = [
            Point3::new(-1000.0, 0.5, 0.5),
            Point3::new(1000.0, 0.5, 0.5),
            Point3::new(0.5, 0.5, 1000.0),
        ];
        assert_eq!(triangle_voxel_span(&vertices, 64), 64);
    }

    #[test]
    fn should_give_span_one_for_all_nan_triangle() {
        let vertices = [Point3::new(f32::NAN, f32::NAN, f32::NAN); 3];
        assert_eq!(triangle_voxel_span(&vertices, 64), 1);
    }

    #[test]
    fn should_ignore_axis_without_finite_coordinates() {
        let vertices = [
            Point3::new(0.5, f32::NAN, 0.5),
            Point3::new(6.5, f32::NAN, 0.5),
            Point3::new(0.5, f32::NAN, 2.5),
        ];
        assert_eq!(triangle_voxel_span(&vertices, 64), 7);
    }

    #[test]
    fn should_estimate_no_records_for_nan_mesh() {
        let bounds = VoxelGridBounds::from_corners(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(64.0, 64.0, 64.0),
        )
        .unwrap();
        let positions = [Point3::new(f32::NAN, f32::NAN, f32::NAN); 3];

        let estimate = estimate_large_triangle_records(
            &positions,
            &[0, 1, 2],
            &Matrix4::identity(),
            &bounds,
            VoxelResolution::R64,
        );

        assert_eq!(estimate, 0);
    }

    #[test]
    fn should_classify_triangles_by_span() {
        assert!(is_small_triangle(1));
        assert!(is_small_triangle(SMALL_TRIANGLE_MAX_SPAN));
        assert!(!is_small_triangle(SMALL_TRIANGLE_MAX_SPAN + 1));
        assert_eq!(large_triangle_record_count(4), 0);
    }

    #[test]
    fn should_compute_subdivision_and_record_count() {
        assert_eq!(subdivision_factor(5), 2);
        assert_eq!(subdivision_factor(8), 2);
        assert_eq!(subdivision_factor(9), 3);
        assert_eq!(large_triangle_record_count(5), 1);
        assert_eq!(large_triangle_record_count(32), 1);
        assert_eq!(large_triangle_record_count(33), 2);
        assert_eq!(large_triangle_record_count(512), 256);
    }

    #[test]
    fn should_enumerate_lattice_rows() {
        assert_eq!(inner_triangle_lattice_coords(0), [(0, 0), (1, 0), (1, 1)]);
        assert_eq!(inner_triangle_lattice_coords(1), [(1, 0), (2, 0), (2, 1)]);
        assert_eq!(inner_triangle_lattice_coords(2), [(1, 0), (2, 1), (1, 1)]);
        assert_eq!(inner_triangle_lattice_coords(3), [(1, 1), (2, 1), (2, 2)]);
        assert_eq!(inner_triangle_lattice_coords(4), [(2, 0), (3, 0), (3, 1)]);
    }

    #[test]
    fn should_cover_triangle_area_with_inner_triangles() {
        let vertices = [
            Point3::new(0.3, 0.1, 0.7),
            Point3::new(20.0, 3.0, 5.5),
            Point3::new(4.0, 17.0, 9.0),
        ];
        let area = triangle_area(&vertices);

        for factor in [1, 2, 3, 7] {
            let inner_area: f32 = (0..factor * factor)
                .map(|k| triangle_area(&inner_triangle_vertices(&vertices, factor, k)))
                .sum();
            assert_abs_diff_eq!(inner_area, area, epsilon = 1e-3 * area);
        }
    }

    #[test]
    fn should_place_inner_triangles_at_original_corners() {
        let vertices = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(8.0, 0.0, 0.0),
            Point3::new(8.0, 8.0, 0.0),
        ];
        let factor = 4;

        let first = inner_triangle_vertices(&vertices, factor, 0);
        assert_abs_diff_eq!(first[0], vertices[0]);

        let last_row_start = (factor - 1) * (factor - 1);
        let bottom_left = inner_triangle_vertices(&vertices, factor, last_row_start);
        assert_abs_diff_eq!(bottom_left[1], vertices[1]);

        let last = inner_triangle_vertices(&vertices, factor, factor * factor - 1);
        assert_abs_diff_eq!(last[2], vertices[2]);
    }

    #[test]
    fn should_estimate_no_records_for_small_triangles() {
        let bounds = VoxelGridBounds::from_corners(
            &Point3::new(-1.0, -1.0, -1.0),
            &Point3::new(1.0, 1.0, 1.0),
        )
        .unwrap();
        let positions = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.01, 0.0, 0.0),
            Point3::new(0.0, 0.01, 0.0),
        ];
        let records = estimate_large_triangle_records(
            &positions,
            &[0, 1, 2],
            &Matrix4::identity(),
            &bounds,
            VoxelResolution::R64,
        );
        assert_eq!(records, 0);
    }

    #[test]
    fn should_estimate_records_for_large_transformed_triangles() {
        let bounds = VoxelGridBounds::from_corners(
            &Point3::new(-1.0, -1.0, -1.0),
            &Point3::new(1.0, 1.0, 1.0),
        )
        .unwrap();
        let positions = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(0.0, 0.1, 0.0),
        ];
        // Scaled by 10, the legs reach the grid boundary and span 32 voxels
        let model_transform = Matrix4::new_scaling(10.0);
        let records = estimate_large_triangle_records(
            &positions,
            &[0, 1, 2, 2, 1, 0],
            &model_transform,
            &bounds,
            VoxelResolution::R64,
        );
        assert_eq!(records, 2 * u64::from(large_triangle_record_count(32)));
    }
}
