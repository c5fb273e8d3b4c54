use inbox_poller::events::{Event, Topic};
use inbox_poller::{Message, Poller, PollerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PollerConfig::from_env().unwrap_or_else(|| {
        eprintln!("Error: INBOX_URL not set");
        eprintln!("  export INBOX_URL=https://example.com/inbox");
        std::process::exit(1);
    });

    eprintln!("📬 Inbox Poller v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Inbox: {}", config.inbox_url);
    eprintln!("   Backoff: {}s", config.wait_time.as_secs());
    eprintln!("   Press Ctrl-C to stop.\n");

    let poller = Poller::from_config(config, |message: Message| async move {
        tracing::info!(message = %message, "Message received");
        Ok::<_, anyhow::Error>(serde_json::Value::Null)
    })?;

    poller.bus().subscribe(Topic::Any, |event: &Event| {
        tracing::trace!(event = %event.to_json(), "Event");
    });

    let Some(mut handle) = poller.start() else {
        return Ok(());
    };

    // The loop only ends on its own when the inbox sends a malformed batch.
    let halt = tokio::select! {
        halt = &mut handle => halt?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            poller.stop(None, None);
            handle.await?
        }
    };

    tracing::info!(reason = %halt, "Exited");
    Ok(())
}
