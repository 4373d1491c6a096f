use vibecheck_app::platform::logging::{self, LogDestination};
use vibecheck_app::platform::console;
use vibecheck_app::{HostConfig, HostOrchestrator};
use vibecheck_logging::{host_error, host_info};

fn main() {
    logging::initialize(LogDestination::File);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            host_error!("Could not start the async runtime: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run()) {
        host_error!("VibeCheck stopped with an error: {:#}", err);
        eprintln!("VibeCheck stopped with an error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = HostConfig::from_env();
    host_info!("VibeCheck v{} starting", config.current_version);

    let surface = console::ConsoleSurface::new();
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(console::print_events(events_rx));

    let mut host = HostOrchestrator::from_config(&config, surface.clone(), events_tx)?;
    // A failed service launch has already been shown; updates and file info still work.
    let _ = host.startup().await;

    let lines = console::spawn_reader(surface);
    tokio::select! {
        _ = console::run(&host, lines) => {}
        _ = tokio::signal::ctrl_c() => host_info!("Interrupted"),
    }

    host.shutdown().await;
    Ok(())
}
