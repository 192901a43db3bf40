use clap::Args;

use crate::node::supervisor::{NodeSupervisor, SupervisorError};
use crate::state::{AppState, StateError};
use crate::util;

#[derive(Args, Debug, Clone)]
pub struct Daemon {}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("node daemon failed: {0}")]
    Supervisor(#[from] SupervisorError),
}

#[async_trait::async_trait]
impl crate::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let _guards = util::init_logging(&state.settings.logging.level, Some(&state.log_dir()));

        let supervisor = NodeSupervisor::new(state.supervisor_config()?);
        // A failed start is fatal; there is no running without a backend.
        supervisor.start().await?;

        let (waiter, _shutdown_tx, _shutdown_rx) = util::graceful_shutdown_blocker();
        tracing::info!("node daemon supervised; press Ctrl+C to stop");
        let _ = waiter.await;

        supervisor.stop().await?;
        Ok("node daemon stopped".to_string())
    }
}
