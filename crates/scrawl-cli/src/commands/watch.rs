use scrawl_core::SyncStatus;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::commands::common::{format_timestamp, CliContext};
use crate::error::CliError;

/// Run the sync engine in the foreground until Ctrl-C.
pub async fn run_watch(context: &CliContext) -> Result<(), CliError> {
    let (_notes, engine) = context.open_sync()?;
    let (_connectivity_tx, connectivity) = watch::channel(true);
    let shutdown = CancellationToken::new();

    let mut status = engine.status();
    let printer = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let line = format_status_line(&status.borrow_and_update());
            println!("{line}");
        }
    });

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current pass");
        }
        signal_token.cancel();
    });

    println!("Watching for changes (Ctrl-C to stop)");
    let result = engine.run(connectivity, shutdown).await;
    drop(engine);
    printer.abort();
    result?;
    Ok(())
}

pub fn format_status_line(status: &SyncStatus) -> String {
    let mut line = format!("{:<8} pending={}", status.phase.as_str(), status.pending_ops);
    if let Some(at) = status.last_synced_at {
        line = format!("{line} last_synced={}", format_timestamp(at));
    }
    if let Some(error) = &status.last_error {
        line = format!("{line} error=\"{error}\"");
    }
    line
}
