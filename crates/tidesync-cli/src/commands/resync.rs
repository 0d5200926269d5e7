//! `tidesync resync` - drop sync state under a path.
//!
//! Forgets the local/remote pairing for the subtree; the next pass
//! re-observes both sides from scratch and re-converges them.

use anyhow::{Context, Result};
use clap::Args;

use tidesync_core::config::Config;
use tidesync_core::domain::newtypes::SyncPath;
use tidesync_core::ports::journal_store::JournalStore;

use super::open_journal;

#[derive(Debug, Args)]
pub struct ResyncCommand {
    /// Path relative to the sync root
    pub path: String,
}

impl ResyncCommand {
    pub async fn execute(&self, _config: Config) -> Result<()> {
        let path = SyncPath::new(self.path.as_str()).context("invalid path")?;

        let journal = open_journal().await?;
        journal.delete_prefix(&path).await?;
        journal.delete(&path).await?;
        println!("{path} scheduled for resync; run `tidesync sync`");
        Ok(())
    }
}
