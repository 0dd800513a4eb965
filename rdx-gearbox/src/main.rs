use anyhow::Result;
use colored::Colorize;
use gearbox::prelude::*;
use gearbox::{LIBRARY_NAME, VERSION};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging. RUST_LOG overrides the default level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // 2. Load settings from the file given as the first argument, if any.
    let config_path = env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;

    // 3. Build the registry and make sure there is something to watch.
    let registry = Registry::from_settings(&settings).await?;
    if registry.is_empty().await {
        registry
            .create(DEFAULT_INSTANCE, settings.defaults.clone())
            .await?;
    }

    // 4. Report every event of every instance.
    for name in registry.names().await {
        if let Some(controller) = registry.get(&name).await {
            spawn_event_listener(controller);
        }
    }

    info!(
        "{} v{} running {} instance(s). Press Ctrl+C to save and exit.",
        LIBRARY_NAME.cyan(),
        VERSION,
        registry.len().await
    );
    tokio::signal::ctrl_c().await?;

    // 5. Persist gears and stop everything.
    match registry.save(None).await {
        Ok(saved) => info!("Saved {} gear(s).", saved),
        Err(err) => warn!("Failed to save gears: {}", err),
    }
    registry.all(RegistryOp::Stop).await;
    Ok(())
}

/// Spawns a task that logs the event stream of one controller.
fn spawn_event_listener(controller: Controller) {
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            match event {
                Event::Shift(shift) => info!(
                    "[{}] {} {} -> {}",
                    controller.name().yellow(),
                    "SHIFT".bold(),
                    shift.from,
                    shift.to
                ),
                Event::Sampled { performance } => {
                    tracing::debug!("[{}] drift {}ms", controller.name(), performance)
                }
                other => info!("[{}] => {:?}", controller.name().yellow(), other),
            }
        }
    });
}
