use std::sync::Arc;

use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use drone_dispatch::api;
use drone_dispatch::clock::SystemClock;
use drone_dispatch::config::Config;
use drone_dispatch::engine::assignment::{run_assignment_engine, DispatchSettings};
use drone_dispatch::engine::route::RouteSteps;
use drone_dispatch::engine::simulation::{
    run_simulation, FleetSimulator, SimulationSettings, StdRandom,
};
use drone_dispatch::error::AppError;
use drone_dispatch::state::AppState;
use drone_dispatch::store::Stores;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let settings = DispatchSettings {
        route_steps: RouteSteps::default(),
        max_reservation_attempts: config.max_reservation_attempts,
    };
    let (app_state, order_rx) = AppState::new(
        Stores::in_memory(config.event_buffer_size),
        Arc::new(SystemClock),
        settings,
        config.order_queue_size,
    );
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_assignment_engine(shared_state.clone(), order_rx));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    if config.sim_enabled {
        let rng = match config.sim_seed {
            Some(seed) => StdRandom::seeded(seed),
            None => StdRandom::from_entropy(),
        };
        let simulator = FleetSimulator::new(
            shared_state.stores.clone(),
            shared_state.clock.clone(),
            shared_state.metrics.clone(),
            SimulationSettings::from_config(&config),
            rng,
        );
        tokio::spawn(run_simulation(
            shared_state.clone(),
            simulator,
            shutdown_tx.subscribe(),
        ));
    } else {
        tracing::info!("fleet simulation disabled");
    }

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    let _ = shutdown_tx.send(());
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
