//! `tidesync watch` - synchronize continuously until interrupted.

use anyhow::Result;
use clap::Args;

use tidesync_core::config::Config;
use tidesync_core::domain::events::SyncEvent;
use tidesync_engine::SyncService;

use super::{build_engine, interrupt_token, print_summary};

#[derive(Debug, Args)]
pub struct WatchCommand {}

impl WatchCommand {
    pub async fn execute(&self, config: Config) -> Result<()> {
        let engine = build_engine(config).await?;

        // Print each run's summary as it finishes.
        let mut events = engine.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let SyncEvent::RunFinished { summary } = event {
                    print_summary(&summary);
                }
            }
        });

        let (service, _commands) = SyncService::new(engine);
        println!("Watching for changes (Ctrl-C to stop)");
        service.run(interrupt_token()).await
    }
}
