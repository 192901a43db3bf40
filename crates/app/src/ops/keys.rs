use clap::{Args, Subcommand};

use crate::keys::{KeyRegistry, KeyRegistryError};
use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Keys {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum KeysCommand {
    /// List naming identities known to the local node
    List,
    /// Create a new naming identity
    Gen {
        /// Name of the identity
        name: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum KeysError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Registry(#[from] KeyRegistryError),
}

#[async_trait::async_trait]
impl crate::op::Op for Keys {
    type Error = KeysError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let registry = KeyRegistry::new(
            state.node_client(),
            state.settings.encryption.key_gen_bits,
        );

        match &self.command {
            KeysCommand::List => {
                let keys = registry.list().await?;
                let lines: Vec<String> = keys
                    .iter()
                    .map(|key| format!("{} {}", key.value, key.name))
                    .collect();
                Ok(lines.join("\n"))
            }
            KeysCommand::Gen { name } => {
                let value = registry.create(name).await?;
                Ok(format!("created key '{}': {}", name, value))
            }
        }
    }
}
