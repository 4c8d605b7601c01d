use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use gcroute::route;
use gcroute::settings::RunOptions;
use gcroute::Algorithm;

#[derive(Parser)]
#[command(
    name = "gcroute",
    version,
    about = concat!("gcroute: a deterministic gap/channel router for trunk layout\nVersion: ", env!("CARGO_PKG_VERSION"))
)]
struct Cli {
    /// Netlist file path
    #[arg(long = "netlist", default_value = "assets/input/netlist.csv")]
    netlist: PathBuf,

    /// Problem settings file path
    #[arg(long = "problem_settings", default_value = "assets/input/problem_settings.yaml")]
    problem_settings: PathBuf,

    /// Reserved area file path. A reserved area is occupied by a circuit block.
    #[arg(long = "reserved_areas", default_value = "assets/input/reserved_areas.csv")]
    reserved_areas: PathBuf,

    /// Routing layer to use
    #[arg(short = 'l', long, default_value = "D1", value_parser = ["D1", "D2"])]
    layer: String,

    /// Algorithm to use
    #[arg(short = 'a', long, value_enum, default_value_t = Algorithm::Ccap)]
    algorithm: Algorithm,

    /// Whether to use GCO area ordering
    #[arg(long, default_value_t = false)]
    gco: bool,

    /// Save directory
    #[arg(long = "save_dir", default_value = "assets/output/")]
    save_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    println!("Target Layer: {}", cli.layer);
    println!(
        "Problem Settings: {}",
        cli.problem_settings.file_name().unwrap_or_default().to_string_lossy()
    );
    println!(
        "Netlist: {}",
        cli.netlist.file_name().unwrap_or_default().to_string_lossy()
    );
    println!(
        "Reserved Area: {}",
        cli.reserved_areas.file_name().unwrap_or_default().to_string_lossy()
    );
    println!("Algorithm: {}", cli.algorithm.label());

    let opts = RunOptions {
        reserved_areas_file: cli.reserved_areas.clone(),
        target_layer: cli.layer.clone(),
        algorithm: cli.algorithm,
        use_gco: cli.gco,
        save_dir: cli.save_dir.clone(),
    };
    route::run(&cli.netlist, &cli.problem_settings, opts)
}
