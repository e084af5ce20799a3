//! CPU reference computations for voxel volume contents.

use crate::resolution::{mip_extent, mip_level_count_for_side};

/// An RGBA8 voxel value. Zero alpha means the voxel is empty.
pub type Texel = [u8; 4];

/// Returns the linear index of the voxel at the given coordinates in a volume
/// with the given extent, stored x-fastest, then y, then z.
pub const fn linear_voxel_index(extent: u32, x: u32, y: u32, z: u32) -> usize {
    ((z as usize * extent as usize) + y as usize) * extent as usize + x as usize
}

/// Whether the given voxel is occupied.
pub const fn is_occupied(texel: &Texel) -> bool {
    texel[3] > 0
}

/// Counts the occupied voxels in the given volume level.
pub fn occupied_voxel_count(texels: &[Texel]) -> usize {
    texels.iter().filter(|texel| is_occupied(texel)).count()
}

/// Reduces the given level with the given extent to the next coarser level by
/// averaging each block of eight children. Child coordinates outside the
/// source level are clamped to its edge.
pub fn reduce_mip_level(source: &[Texel], source_extent: u32) -> Vec<Texel> {
    assert_eq!(
        source.len(),
        (source_extent as usize).pow(3),
        "Source level size does not match extent"
    );

    let extent = (source_extent / 2).max(1);
    let max_source_coord = source_extent - 1;

    let mut destination = Vec::with_capacity((extent as usize).pow(3));

    for z in 0..extent {
        for y in 0..extent {
            for x in 0..extent {
                let mut sums = [0_u32; 4];
                for offset in 0..8_u32 {
                    let sx = (2 * x + (offset & 1)).min(max_source_coord);
                    let sy = (2 * y + ((offset >> 1) & 1)).min(max_source_coord);
                    let sz = (2 * z + ((offset >> 2) & 1)).min(max_source_coord);
                    let texel = source[linear_voxel_index(source_extent, sx, sy, sz)];
                    for (sum, channel) in sums.iter_mut().zip(texel) {
                        *sum += u32::from(channel);
                    }
                }
                destination.push(sums.map(|sum| (sum as f32 / 8.0).round() as u8));
            }
        }
    }

    destination
}

/// Computes the full mip chain of a volume with the given number of voxels per
/// side from its base level. The returned vector holds the base level first.
pub fn mip_chain(base_level: &[Texel], voxels_per_side: u32) -> Vec<Vec<Texel>> {
    let level_count = mip_level_count_for_side(voxels_per_side);
    let mut levels = Vec::with_capacity(level_count as usize);
    levels.push(base_level.to_vec());

    for level in 1..level_count {
        let source_extent = mip_extent(voxels_per_side, level - 1);
        let reduced = reduce_mip_level(&levels[level as usize - 1], source_extent);
        levels.push(reduced);
    }

    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_count_only_voxels_with_nonzero_alpha() {
        let texels = [[0, 0, 0, 0], [255, 0, 0, 0], [0, 0, 0, 1], [9, 9, 9, 255]];
        assert_eq!(occupied_voxel_count(&texels), 2);
    }

    #[test]
    fn should_order_voxels_x_fastest() {
        assert_eq!(linear_voxel_index(4, 0, 0, 0), 0);
        assert_eq!(linear_voxel_index(4, 1, 0, 0), 1);
        assert_eq!(linear_voxel_index(4, 0, 1, 0), 4);
        assert_eq!(linear_voxel_index(4, 0, 0, 1), 16);
        assert_eq!(linear_voxel_index(4, 3, 3, 3), 63);
    }

    #[test]
    fn should_average_eight_children() {
        let mut source = vec![[0; 4]; 8];
        source[linear_voxel_index(2, 1, 1, 1)] = [255, 128, 16, 255];
        let reduced = reduce_mip_level(&source, 2);
        assert_eq!(reduced, vec![[32, 16, 2, 32]]);
    }

    #[test]
    fn should_build_full_chain_down_to_single_voxel() {
        let n = 8;
        let base = vec![[200, 100, 50, 255]; (n * n * n) as usize];
        let chain = mip_chain(&base, n);

        assert_eq!(chain.len(), 4);
        for (level, texels) in chain.iter().enumerate() {
            assert_eq!(texels.len(), (mip_extent(n, level as u32) as usize).pow(3));
            assert!(texels.iter().all(|texel| *texel == [200, 100, 50, 255]));
        }
    }

    #[test]
    fn should_keep_single_occupied_voxel_visible_through_chain() {
        let n = 4;
        let mut base = vec![[0; 4]; (n * n * n) as usize];
        base[linear_voxel_index(n, 3, 0, 2)] = [255, 255, 255, 255];

        let chain = mip_chain(&base, n);
        assert_eq!(occupied_voxel_count(&chain[1]), 1);
        assert!(is_occupied(&chain[1][linear_voxel_index(2, 1, 0, 1)]));
        // Each reduction divides the lone contribution by eight
        assert_eq!(chain[2], vec![[4, 4, 4, 4]]);
    }
}
