use anyhow::Result;
use heartbeat::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    // 2. Build a heartbeat, from a config file if one is given.
    let mut heartbeat = match std::env::args().nth(1) {
        Some(path) => {
            let config = HeartbeatConfig::from_file(std::path::Path::new(&path))?;
            info!("Loaded config: {:?}", config);
            Heartbeat::from_config(&config)
        }
        None => Heartbeat::new(),
    };

    // 3. Spawn a task listening to the event stream.
    spawn_event_listener(&heartbeat);

    // 4. Register callbacks to demonstrate the core logic.
    register_demo_callbacks(&heartbeat);

    // 5. Start beating and demonstrate skip control.
    if heartbeat.pulse().is_none() {
        heartbeat.set_pulse(Duration::from_secs(1));
    }
    heartbeat.start(None);
    heartbeat.skip(2, true);
    info!(
        "Heartbeat running at {:?} with {} beats to skip. Press Ctrl+C to stop.",
        heartbeat.pulse(),
        heartbeat.beat_skips()
    );

    // 6. Run until Ctrl+C, then stop cleanly.
    tokio::signal::ctrl_c().await?;
    heartbeat.stop();
    info!("Final beat count: {}", heartbeat.beat_count());
    Ok(())
}

/// Spawns a task that prints every event the heartbeat broadcasts.
fn spawn_event_listener(heartbeat: &Heartbeat) {
    let mut events = heartbeat.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("[EVENT] => {:?}", event);
        }
    });
}

/// Registers demo callbacks against the heartbeat's registry.
fn register_demo_callbacks(heartbeat: &Heartbeat) {
    let beat_counter = Arc::new(AtomicU32::new(0));

    // --- A counting callback ---
    let counter_clone = beat_counter.clone();
    heartbeat.register(move |_descriptor| {
        let current = counter_clone.fetch_add(1, Ordering::Relaxed) + 1;
        info!("[BEAT CALLBACK] Counter is now: {}", current);
        Ok(())
    });

    // --- A callback inspecting the descriptor ---
    heartbeat.register(|descriptor| {
        info!(
            "[INSPECTOR] Tick descriptor carries no payload: {}, created at {}",
            descriptor.changed_object().is_none(),
            descriptor.created_at()
        );
        Ok(())
    });

    // --- A deliberately failing callback; the registry swallows it ---
    heartbeat.register(|_descriptor| Err(anyhow::anyhow!("this subscriber always fails")));
}
