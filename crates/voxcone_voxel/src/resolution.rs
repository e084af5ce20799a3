//! Voxel grid resolutions.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The number of voxels along each side of the cubical voxel grid.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum VoxelResolution {
    R64,
    R128,
    R256,
    #[default]
    R512,
}

impl VoxelResolution {
    /// All supported resolutions, from coarsest to finest.
    pub const ALL: [Self; 4] = [Self::R64, Self::R128, Self::R256, Self::R512];

    /// Returns the number of voxels along each side of the grid.
    pub const fn voxels_per_side(&self) -> u32 {
        match self {
            Self::R64 => 64,
            Self::R128 => 128,
            Self::R256 => 256,
            Self::R512 => 512,
        }
    }

    /// Returns the number of levels in the full mip chain of a volume with
    /// this resolution.
    pub const fn mip_level_count(&self) -> u32 {
        mip_level_count_for_side(self.voxels_per_side())
    }

    /// Returns the total number of voxels at the finest level.
    pub const fn voxel_count(&self) -> u64 {
        let n = self.voxels_per_side() as u64;
        n * n * n
    }
}

impl TryFrom<u32> for VoxelResolution {
    type Error = anyhow::Error;

    fn try_from(voxels_per_side: u32) -> Result<Self> {
        match voxels_per_side {
            64 => Ok(Self::R64),
            128 => Ok(Self::R128),
            256 => Ok(Self::R256),
            512 => Ok(Self::R512),
            _ => bail!(
                "Unsupported voxel resolution {voxels_per_side} (supported: 64, 128, 256, 512)"
            ),
        }
    }
}

impl From<VoxelResolution> for u32 {
    fn from(resolution: VoxelResolution) -> Self {
        resolution.voxels_per_side()
    }
}

impl fmt::Display for VoxelResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.voxels_per_side();
        write!(f, "{n}x{n}x{n}")
    }
}

/// Returns the number of mip levels `floor(log2(n)) + 1` for a volume with `n`
/// voxels per side. Returns zero for `n == 0`.
pub const fn mip_level_count_for_side(voxels_per_side: u32) -> u32 {
    u32::BITS - voxels_per_side.leading_zeros()
}

/// Returns the number of voxels per side at the given mip level of a volume
/// with `n` voxels per side at level zero.
pub const fn mip_extent(voxels_per_side: u32, mip_level: u32) -> u32 {
    let extent = voxels_per_side.checked_shr(mip_level);
    match extent {
        Some(extent) if extent > 0 => extent,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_give_log2_plus_one_mip_levels_for_all_resolutions() {
        for resolution in VoxelResolution::ALL {
            let n = resolution.voxels_per_side();
            assert_eq!(resolution.mip_level_count(), n.ilog2() + 1);
        }
        assert_eq!(VoxelResolution::R64.mip_level_count(), 7);
        assert_eq!(VoxelResolution::R512.mip_level_count(), 10);
    }

    #[test]
    fn should_give_single_voxel_at_coarsest_level() {
        for resolution in VoxelResolution::ALL {
            let n = resolution.voxels_per_side();
            assert_eq!(mip_extent(n, resolution.mip_level_count() - 1), 1);
        }
    }

    #[test]
    fn should_halve_extent_per_level_down_to_one() {
        assert_eq!(mip_extent(128, 0), 128);
        assert_eq!(mip_extent(128, 1), 64);
        assert_eq!(mip_extent(128, 7), 1);
        assert_eq!(mip_extent(128, 12), 1);
        assert_eq!(mip_extent(128, 40), 1);
    }

    #[test]
    fn should_count_mip_levels_for_non_power_of_two_sides() {
        assert_eq!(mip_level_count_for_side(0), 0);
        assert_eq!(mip_level_count_for_side(1), 1);
        assert_eq!(mip_level_count_for_side(3), 2);
        assert_eq!(mip_level_count_for_side(100), 7);
    }

    #[test]
    fn should_convert_supported_sides_and_reject_others() {
        for resolution in VoxelResolution::ALL {
            assert_eq!(
                VoxelResolution::try_from(resolution.voxels_per_side()).unwrap(),
                resolution
            );
        }
        assert!(VoxelResolution::try_from(32).is_err());
        assert!(VoxelResolution::try_from(100).is_err());
    }
}
