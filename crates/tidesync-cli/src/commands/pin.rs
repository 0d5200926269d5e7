//! `tidesync pin` - set the pin policy for a path.
//!
//! Works on the journal directly; the next pass applies the policy.

use anyhow::{Context, Result};
use clap::Args;

use tidesync_core::config::Config;
use tidesync_core::domain::journal_record::PinState;
use tidesync_core::domain::newtypes::SyncPath;
use tidesync_core::ports::journal_store::JournalStore;

use super::open_journal;

#[derive(Debug, Args)]
pub struct PinCommand {
    /// Path relative to the sync root
    pub path: String,

    /// Pin policy: always-local, online-only, or unspecified
    pub state: String,
}

impl PinCommand {
    pub async fn execute(&self, _config: Config) -> Result<()> {
        let path = SyncPath::new(self.path.as_str()).context("invalid path")?;
        let state = PinState::parse(&self.state).with_context(|| {
            format!(
                "unknown pin state {:?}; expected always-local, online-only or unspecified",
                self.state
            )
        })?;

        let journal = open_journal().await?;
        journal.set_pin_state(&path, state).await?;
        println!("{path} pinned {}", state.name());
        Ok(())
    }
}
