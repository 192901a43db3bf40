use std::fmt::Display;
use std::io::Write;

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};

use common::prelude::ContentId;

use crate::node::supervisor::{NodeSupervisor, SupervisorError};
use crate::ops::fetch::{fetch_bundle, resolve_newest, FetchOpError};
use crate::state::{AppState, StateError};
use crate::util;

const HELP: &str = "\
commands:
  fetch <cid>       fetch and decrypt a specific bundle
  fetch --resolve   resolve the naming pointer to the newest bundle
  fetch --chain     fetch the predecessor of the last bundle
  help | ?          show this help
  exit | quit       leave the shell";

#[derive(Args, Debug, Clone)]
pub struct Shell {}

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("node daemon failed: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Shell {
    type Error = ShellError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let _guards = util::init_logging(&state.settings.logging.level, Some(&state.log_dir()));

        let supervisor = NodeSupervisor::new(state.supervisor_config()?);
        // A failed start is fatal; the shell is useless without a backend.
        supervisor.start().await?;
        println!("node daemon ready; type 'help' for commands");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("loglink> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let command = line.trim();

            match command {
                "" => continue,
                "exit" | "quit" => break,
                "help" | "?" => println!("{}", HELP),
                "fetch --resolve" => report(resolve_newest(&state).await),
                "fetch --chain" => match state.read_chain() {
                    Ok(Some(id)) => report(fetch_bundle(&state, &id).await),
                    Ok(None) => println!("no previous bundle"),
                    Err(e) => eprintln!("error: {}", e),
                },
                other if other.starts_with("fetch ") => {
                    let id = ContentId::from(other["fetch ".len()..].trim());
                    if id.is_empty() {
                        println!("please provide a content id after 'fetch'");
                    } else {
                        report(fetch_bundle(&state, &id).await);
                    }
                }
                other => println!("unknown command '{}'. type 'help'", other),
            }
        }

        supervisor.stop().await?;
        Ok("bye".to_string())
    }
}

fn report<T: Display>(result: Result<T, FetchOpError>) {
    match result {
        Ok(output) => println!("{}", output),
        Err(e) => eprintln!("error: {}", e),
    }
}
