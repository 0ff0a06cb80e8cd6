use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "rirb", version, about = "Reverse-incremental backup orchestrator driven by an rclone-modeled sync tool")]
pub struct Cli {
    /// Configuration file path
    pub configpath: PathBuf,

    /// Write a template config at `configpath` (which must not already exist) and exit
    #[arg(long)]
    pub new: bool,

    /// No previous list expected; forces --dst-list and tolerates a missing destination listing
    #[arg(long)]
    pub init: bool,

    /// Compare against a fresh destination listing instead of the cached prior list
    #[arg(long)]
    pub dst_list: bool,

    /// Plan only; issue no sync-tool mutations
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print the plan and prompt before transferring
    #[arg(short = 'i', long)]
    pub interactive: bool,

    /// A `key = value` config override, evaluated before and after the config file body; repeatable
    #[arg(long = "override", value_name = "EXPR")]
    pub overrides: Vec<String>,

    /// Elevate the debug log to the primary log and print full error chains
    #[arg(long)]
    pub debug: bool,
}
