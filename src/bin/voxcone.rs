use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use voxcone::{io::parse_ron_file, run};
use voxcone_voxel::{VoxelEngineConfig, VoxelResolution};

const DEFAULT_CONFIG_PATH: &str = "assets/voxcone.ron";

#[derive(Debug, Parser)]
#[command(about = "GPU voxelization with sparse voxel visualization", long_about = None)]
struct Cli {
    /// Path to RON configuration file to use
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Rebuild the engine at this resolution after the first cycle and run
    /// another cycle
    #[arg(short, long, value_parser = parse_resolution)]
    revoxelize: Option<VoxelResolution>,
}

fn parse_resolution(arg: &str) -> Result<VoxelResolution> {
    VoxelResolution::try_from(arg.parse::<u32>()?)
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let config: VoxelEngineConfig = parse_ron_file(&cli.config)?;

    run::run(config, cli.revoxelize)
}
