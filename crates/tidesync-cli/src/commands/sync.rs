//! `tidesync sync` - run one synchronization pass.

use anyhow::Result;
use clap::Args;

use tidesync_core::config::Config;
use tidesync_core::domain::events::RunStatus;

use super::{build_engine, interrupt_token, print_summary};

#[derive(Debug, Args)]
pub struct SyncCommand {}

impl SyncCommand {
    pub async fn execute(&self, config: Config) -> Result<()> {
        let engine = build_engine(config).await?;

        let summary = engine.run_once(interrupt_token()).await?;
        print_summary(&summary);

        if summary.status == RunStatus::Error {
            anyhow::bail!("run aborted; see log output");
        }
        Ok(())
    }
}
