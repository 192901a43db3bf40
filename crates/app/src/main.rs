// CLI modules
mod args;
mod op;
mod ops;

// Configuration and state
mod config;
mod state;

// Core service modules (fetch, node supervision, naming)
mod fetch;
mod keys;
mod node;
mod resolve;
mod util;

#[cfg(test)]
mod testutil;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Daemon, Fetch, Init, Keys, Publish, Resolve, Shell, Version};

command_enum! {
    (Daemon, Daemon),
    (Fetch, Fetch),
    (Init, Init),
    (Keys, Keys),
    (Publish, Publish),
    (Resolve, Resolve),
    (Shell, Shell),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let ctx = op::OpContext {
        config_path: args.config_path.clone(),
    };

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
