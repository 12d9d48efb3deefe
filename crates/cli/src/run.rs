//! `ferry run`: wire the relay to a chat platform and serve until Ctrl-C.

use std::sync::Arc;

use {
    anyhow::{Result, bail},
    ferry_channels::{ChatClient, InboundSink, MemoryChatClient},
    ferry_config::{FerryConfig, Severity, validate::validate_config},
    ferry_relay::{FileRouteStore, Relay, RouteTable},
    ferry_telegram::{TelegramClient, spawn_polling},
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

pub async fn run(config: FerryConfig, dry_run: bool) -> Result<()> {
    let diagnostics = validate_config(&config, !dry_run);
    for d in &diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
            Severity::Info => {},
        }
    }
    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    if errors > 0 {
        bail!("configuration has {errors} error(s); run `ferry check-config` for details");
    }

    let routes_path = config.storage.resolved_routes_path();
    let store = Arc::new(FileRouteStore::new(routes_path.clone()));
    let routes = Arc::new(RouteTable::load(store).await?);
    info!(path = %routes_path.display(), routes = routes.len(), "route table loaded");

    let telegram = if dry_run {
        None
    } else {
        Some(Arc::new(TelegramClient::connect(&config.telegram).await?))
    };
    let client: Arc<dyn ChatClient> = match &telegram {
        Some(telegram) => telegram.clone(),
        None => {
            info!("dry run, using in-memory chat client");
            Arc::new(MemoryChatClient::new())
        },
    };

    let cancel = CancellationToken::new();
    let relay = Relay::new(client, Arc::clone(&routes), &config);
    let tasks = relay.start(&cancel);
    let polling = telegram.map(|telegram| {
        let sink: Arc<dyn InboundSink> = relay.clone();
        spawn_polling(telegram, sink, config.telegram.poll_timeout_secs, cancel.clone())
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    cancel.cancel();

    if let Some(polling) = polling
        && let Err(e) = polling.await
    {
        warn!(error = %e, "polling task ended abnormally");
    }
    tasks.join().await;
    routes.save().await?;
    info!(path = %routes_path.display(), "routes saved");
    Ok(())
}
