//! Input/output utilities.

use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

/// Reads and returns the content of the specified text file.
pub fn read_text_file(file_path: impl AsRef<Path>) -> io::Result<String> {
    let file = File::open(file_path)?;
    let mut text = String::new();
    let _ = BufReader::new(file).read_to_string(&mut text)?;
    Ok(text)
}

/// Parses the RON (Rusty Object Notation) file at the given path into type
/// `T`.
///
/// # Errors
/// Returns an error if the file can not be read or its content does not
/// deserialize into `T`.
pub fn parse_ron_file<T>(file_path: impl AsRef<Path>) -> Result<T>
where
    T: for<'de> serde::de::Deserialize<'de>,
{
    let file_path = file_path.as_ref();

    let text = read_text_file(file_path)
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Could not open {}", file_path.display()))?;

    ron::from_str::<T>(&text)
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Invalid syntax in {}", file_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use voxcone_voxel::{VoxelEngineConfig, VoxelResolution, VoxelizationStrategy};

    #[test]
    fn should_parse_bundled_config() {
        let config: VoxelEngineConfig = parse_ron_file(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/assets/voxcone.ron"
        ))
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.resolution, VoxelResolution::R128);
        assert!(config.visualization.enabled);
    }

    #[test]
    fn should_fill_missing_fields_with_defaults() {
        let config: VoxelEngineConfig =
            ron::from_str("(resolution: 256, strategy: Compute)").unwrap();
        assert_eq!(config.resolution, VoxelResolution::R256);
        assert_eq!(config.strategy, VoxelizationStrategy::Compute);
        assert_abs_diff_eq!(config.visualization.cube_scale_factor, 2.0);
        assert_abs_diff_eq!(config.cone_tracing.surface_offset, 15.719);
    }

    #[test]
    fn should_reject_unsupported_resolution() {
        assert!(ron::from_str::<VoxelEngineConfig>("(resolution: 100)").is_err());
    }

    #[test]
    fn should_fail_to_open_missing_file() {
        let result: Result<VoxelEngineConfig> = parse_ron_file("does/not/exist.ron");
        assert!(result.is_err());
    }
}
