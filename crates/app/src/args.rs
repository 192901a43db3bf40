pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "loglink")]
#[command(about = "Fetch and decrypt log bundles from a content-addressed store")]
pub struct Args {
    /// Path to the loglink state directory (defaults to ~/.loglink)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
