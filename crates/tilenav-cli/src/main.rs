//! Pathfinding CLI over pre-built navigation mesh tiles
//!
//! Resolves world coordinates onto the mesh through the terrain height
//! grids, then runs find-nearest, path search and string pulling; prints
//! the walk distance or the waypoint list.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod pathfinder;
mod terrain;

use pathfinder::PathFinder;

#[derive(Parser, Debug)]
#[command(name = "tilenav")]
#[command(about = "Navigation mesh path queries over pre-built tile data")]
#[command(version)]
struct Cli {
    /// Directory containing the mmaps/ and maps/ subdirectories
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the walk distance between two world positions, or -1 when
    /// no path exists
    Distance(QueryArgs),
    /// Print the waypoints of the walk path between two world positions
    Path(QueryArgs),
}

#[derive(clap::Args, Debug)]
struct QueryArgs {
    /// Map id the tile files were built for
    map_id: u32,
    /// Start position x in world coordinates
    x1: f32,
    /// Start position y in world coordinates
    y1: f32,
    /// End position x in world coordinates
    x2: f32,
    /// End position y in world coordinates
    y2: f32,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run_distance(data_dir: &PathBuf, args: &QueryArgs) -> Result<ExitCode> {
    let mut pf = PathFinder::new(data_dir, args.map_id)?;
    match pf.compute_distance(args.x1, args.y1, args.x2, args.y2)? {
        Some(distance) => {
            println!("{distance:.4}");
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("-1");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_path(data_dir: &PathBuf, args: &QueryArgs) -> Result<ExitCode> {
    let mut pf = PathFinder::new(data_dir, args.map_id)?;
    match pf.find_world_path(args.x1, args.y1, args.x2, args.y2)? {
        Some(path) => {
            // Waypoints go back out in world axes: mesh (x, y, z) is
            // world (z, x, y).
            for p in &path.points {
                println!("{:.4} {:.4} {:.4}", p[2], p[0], p[1]);
            }
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("-1");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn main() -> Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        Command::Distance(args) => run_distance(&cli.data_dir, args),
        Command::Path(args) => run_path(&cli.data_dir, args),
    }
}
