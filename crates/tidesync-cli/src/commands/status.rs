//! `tidesync status` - report what the journal knows.

use anyhow::Result;
use clap::Args;

use tidesync_core::config::Config;
use tidesync_core::domain::journal_record::PinState;
use tidesync_core::ports::journal_store::JournalStore;

use super::open_journal;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// List every tracked path instead of the summary
    #[arg(long)]
    pub list: bool,
}

impl StatusCommand {
    pub async fn execute(&self, config: Config) -> Result<()> {
        let journal = open_journal().await?;
        let records = journal.all().await?;

        println!("Local mirror: {}", config.sync.root.display());
        println!("Remote:       {}", config.remote.url);

        let files = records.iter().filter(|r| !r.is_directory()).count();
        let directories = records.len() - files;
        println!("Tracked:      {files} files, {directories} directories");

        let online_only = records
            .iter()
            .filter(|r| r.pin_state() == PinState::OnlineOnly)
            .count();
        if online_only > 0 {
            println!("Online-only:  {online_only}");
        }

        let failing: Vec<_> = records
            .iter()
            .filter(|r| r.consecutive_failures() > 0)
            .collect();
        if failing.is_empty() {
            println!("Health:       ok");
        } else {
            println!("Health:       {} path(s) failing", failing.len());
            for record in &failing {
                println!(
                    "  {} ({} consecutive failures)",
                    record.path(),
                    record.consecutive_failures()
                );
            }
        }

        if self.list {
            println!();
            for record in &records {
                let kind = if record.is_directory() { "dir " } else { "file" };
                println!("  {kind}  {}  {}", record.etag(), record.path());
            }
        }
        Ok(())
    }
}
