use std::path::PathBuf;

use clap::Args;

use crate::node::NodeError;
use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Publish {
    /// File to add to the content store
    pub file: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Node(#[from] NodeError),
}

#[async_trait::async_trait]
impl crate::op::Op for Publish {
    type Error = PublishError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;

        let id = state
            .node_client()
            .add_file(
                &self.file,
                state.settings.node.pin_enabled,
                state.settings.node.pin_recursive,
            )
            .await?;

        Ok(id.to_string())
    }
}
