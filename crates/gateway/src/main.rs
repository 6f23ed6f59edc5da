//! CAN-to-ELM327 Gateway - Main Entry Point

use anyhow::Context;
use can_bus::{
    BusDriver, BusError, FrameSource, IngestStats, MonotonicClock, NullDriver, ReplayDriver,
    Simulator, SubscriptionRegistry,
};
use elm_protocol::SessionContext;
use gateway::{
    bind_tcp, init_logging, run_serial, serve_tcp, BusDriverKind, GatewayControl, SessionTable,
    Settings,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CANELM_CONFIG").ok());
    let settings = Settings::load(config_path.as_deref()).context("loading configuration")?;
    let log = Arc::new(init_logging(&settings.log)?);

    info!("=== CAN ELM327 Bridge v{} ===", env!("CARGO_PKG_VERSION"));
    info!(filter = %log.directives(), "Logging initialised");

    if let Some(addr) = settings.metrics.listen {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }

    let registry = SubscriptionRegistry::new();
    let clock = MonotonicClock::new();

    let source = match settings.bus.driver {
        BusDriverKind::None => spawn_source(NullDriver, &registry, clock, &settings),
        BusDriverKind::Replay => {
            let path = settings
                .bus
                .replay_path
                .clone()
                .context("bus.replay_path is not set")?;
            info!("Replaying CAN log {}", path.display());
            let driver = ReplayDriver::new(
                path,
                Duration::from_millis(settings.bus.replay_interval_ms),
                settings.bus.replay_loop,
            );
            spawn_source(driver, &registry, clock, &settings)
        }
    };
    tokio::spawn(async move {
        match source.await {
            Ok(Ok(stats)) => info!(?stats, "CAN ingestion finished"),
            Ok(Err(e)) => error!("CAN ingestion stopped: {}", e),
            Err(e) => error!("CAN ingestion task failed: {}", e),
        }
    });

    let simulator = Simulator::new(
        settings.simulator.simulator_config(),
        registry.clone(),
        clock,
    );
    if settings.simulator.autostart {
        simulator.start();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let sessions = SessionTable::new();
    let control = GatewayControl::new(
        sessions.clone(),
        registry.clone(),
        Some(Arc::clone(&log)),
        Arc::clone(&shutdown_tx),
    );
    let ctx = Arc::new(
        SessionContext::new(registry.clone(), simulator.clone(), Arc::new(control))
            .with_monitor_settings(settings.monitor.monitor_settings()),
    );

    let mut servers: Vec<JoinHandle<()>> = Vec::new();
    if settings.tcp.enabled {
        let listener = bind_tcp(&settings.tcp.bind)
            .await
            .with_context(|| format!("binding {}", settings.tcp.bind))?;
        let (ctx, sessions, shutdown) = (Arc::clone(&ctx), sessions.clone(), shutdown_rx.clone());
        servers.push(tokio::spawn(async move {
            if let Err(e) = serve_tcp(listener, ctx, sessions, shutdown).await {
                error!("TCP server failed: {}", e);
            }
        }));
    }
    if settings.serial.enabled {
        servers.push(tokio::spawn(run_serial(
            settings.serial.clone(),
            Arc::clone(&ctx),
            sessions.clone(),
            shutdown_rx.clone(),
        )));
    }

    let mut restart = shutdown_rx.clone();
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Signal handler failed: {}", e);
            }
            info!("Interrupt received, shutting down");
        }
        _ = restart.wait_for(|stop| *stop) => {
            info!("Shutdown requested");
        }
    }

    shutdown_tx.send_replace(true);
    simulator.stop();
    for server in servers {
        if let Err(e) = server.await {
            warn!("Server task failed: {}", e);
        }
    }

    info!("Gateway stopped");
    Ok(())
}

fn spawn_source<D: BusDriver + 'static>(
    driver: D,
    registry: &SubscriptionRegistry,
    clock: MonotonicClock,
    settings: &Settings,
) -> JoinHandle<Result<IngestStats, BusError>> {
    FrameSource::new(driver, registry.clone(), clock)
        .with_report_interval(settings.bus.report_interval())
        .spawn()
}
