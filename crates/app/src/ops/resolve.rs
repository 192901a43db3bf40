use clap::Args;

use crate::ops::fetch::{resolve_newest, FetchOpError};
use crate::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Resolve {}

#[async_trait::async_trait]
impl crate::op::Op for Resolve {
    type Error = FetchOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let id = resolve_newest(&state).await?;
        Ok(id.to_string())
    }
}
