use clap::Args;

use common::crypto::{generate_private_key_pem, DecryptError};

use crate::keys::{KeyRegistry, KeyRegistryError};
use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Skip creating the naming identity on the local node
    #[arg(long)]
    pub skip_naming_key: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    State(#[from] StateError),

    #[error("key generation failed: {0}")]
    Crypto(#[from] DecryptError),

    #[error(transparent)]
    Registry(#[from] KeyRegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::init(ctx.config_path.clone(), None)?;

        // Content decryption key
        let key_path = state.private_key_file();
        let content_key_note = if key_path.exists() {
            "already present"
        } else {
            let pem = generate_private_key_pem(state.settings.encryption.key_gen_bits)?;
            std::fs::write(&key_path, pem)?;
            "generated"
        };

        // Naming identity, owned by the local node
        let naming_note = if self.skip_naming_key {
            "skipped".to_string()
        } else {
            // Best effort: an already-initialized repository is fine.
            if let Err(e) = state.node_client().run(&["init"]).await {
                tracing::debug!(error = %e, "node repository init skipped");
            }

            let registry = KeyRegistry::new(
                state.node_client(),
                state.settings.encryption.key_gen_bits,
            );
            let name = &state.settings.node.ipns_key_name;
            let value = match registry.create(name).await {
                Ok(value) => value,
                Err(KeyRegistryError::Duplicate(_)) => registry
                    .list()
                    .await?
                    .into_iter()
                    .find(|key| &key.name == name)
                    .map(|key| key.value)
                    .unwrap_or_default(),
                Err(e) => return Err(e.into()),
            };
            std::fs::write(state.naming_key_file(), &value)?;
            value
        };

        Ok(format!(
            "Initialized loglink directory at: {}\n\
             - Config: {}\n\
             - Content key: {} ({})\n\
             - Naming key: {}",
            state.dir.display(),
            state.config_path.display(),
            key_path.display(),
            content_key_note,
            naming_note,
        ))
    }
}
