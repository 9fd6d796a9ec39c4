//! Composition root
//!
//! Arranque: entorno, logging, base de datos, broker (con la topología
//! declarada), hubs realtime, servicios y consumidores. Cualquier fallo de
//! arranque termina el proceso con código 1; el shutdown ordenado sale
//! con 0.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{routing::get, Json, Router};
use dotenvy::dotenv;
use serde_json::json;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ride_hail_backend::broker::{BrokerConfig, Rmq};
use ride_hail_backend::config::environment::EnvironmentConfig;
use ride_hail_backend::database::{Database, DbConfig};
use ride_hail_backend::middleware::cors::cors_middleware;
use ride_hail_backend::repositories::driver_repository::DriverRepository;
use ride_hail_backend::routes;
use ride_hail_backend::services::driver_service::DriverService;
use ride_hail_backend::services::matching_service::MatchingService;
use ride_hail_backend::services::ride_service::RideService;
use ride_hail_backend::state::AppState;
use ride_hail_backend::ws::Hub;

/// Período del monitor de salud de DB y broker
const HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(10);
/// Ventana de gracia del shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    let config = EnvironmentConfig::from_env();

    // Configurar logging
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚕 Ride-Hail Backend - Dispatch & Ride Lifecycle");
    info!("================================================");

    // Base de datos
    let db = Database::new(DbConfig::from_environment(&config));
    if let Err(e) = db.connect().await {
        error!("❌ Error conectando a la base de datos: {}", e);
        return Err(anyhow::anyhow!("database error: {}", e));
    }
    info!("🗄️  PostgreSQL conectado");

    // Broker
    let broker = Rmq::new(BrokerConfig::from_environment(&config));
    if let Err(e) = broker.connect().await {
        error!("❌ Error conectando a RabbitMQ: {}", e);
        return Err(anyhow::anyhow!("broker error: {}", e));
    }
    if let Err(e) = broker.declare_topology().await {
        error!("❌ Error declarando topología del broker: {}", e);
        return Err(anyhow::anyhow!("broker error: {}", e));
    }

    // Hubs realtime (uno por rol)
    let passenger_hub = Hub::start("passengers");
    let driver_hub = Hub::start("drivers");

    // Servicios
    let ride_service = Arc::new(RideService::new(
        db.clone(),
        broker.clone(),
        passenger_hub.clone(),
        driver_hub.clone(),
    ));
    let driver_service = Arc::new(DriverService::new(db.clone(), broker.clone()));
    let matching_service = Arc::new(MatchingService::new(
        DriverRepository::new(db.clone()),
        broker.clone(),
        driver_hub.clone(),
    ));

    // Señal de shutdown para todas las tareas de larga vida
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Consumidores
    tokio::spawn(matching_service.clone().run(shutdown_rx.clone()));
    tokio::spawn(ride_service.clone().run_driver_responses(shutdown_rx.clone()));
    tokio::spawn(ride_service.clone().run_ride_status(shutdown_rx.clone()));
    tokio::spawn(ride_service.clone().run_location_updates(shutdown_rx.clone()));

    // Limpieza periódica del rate limiter
    driver_service.rate_limiter().spawn_sweeper(shutdown_rx.clone());

    // Supervisor de salud de DB y broker
    tokio::spawn(health_monitor(db.clone(), broker.clone(), shutdown_rx));

    let state = AppState {
        db: db.clone(),
        config: config.clone(),
        broker: broker.clone(),
        passenger_hub,
        driver_hub,
        ride_service,
        driver_service,
        matching_service,
    };

    let app = Router::new()
        .route("/health", get(health_endpoint))
        .nest("/rides", routes::ride_routes::create_ride_router(state.clone()))
        .nest("/drivers", routes::driver_routes::create_driver_router(state.clone()))
        .nest("/ws", routes::ws_routes::create_ws_router())
        .layer(cors_middleware())
        .with_state(state);

    let addr = config.server_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("❌ No se pudo abrir el puerto {}: {}", addr, e);
            return Err(anyhow::anyhow!("bind error: {}", e));
        }
    };

    info!("🌐 Servidor escuchando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   POST /rides - Crear viaje (PASSENGER)");
    info!("   POST /rides/:id/cancel - Cancelar viaje");
    info!("   GET  /rides - Listar viajes del pasajero");
    info!("   POST /drivers/:id/online|offline|location|start|complete (DRIVER)");
    info!("   GET  /ws/passengers/:id - WebSocket pasajero");
    info!("   GET  /ws/drivers/:id - WebSocket conductor");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    // Ventana de gracia para que los consumidores drenen
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    broker.close().await;
    db.close().await;

    info!("👋 Shutdown completo");
    Ok(())
}

async fn health_endpoint(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<serde_json::Value> {
    let db_healthy = state.db.is_healthy().await;
    let broker_healthy = state.broker.is_healthy().await;

    Json(json!({
        "status": if db_healthy && broker_healthy { "healthy" } else { "degraded" },
        "database": db_healthy,
        "broker": broker_healthy,
        "passengers_connected": state.passenger_hub.count(),
        "drivers_connected": state.driver_hub.count(),
    }))
}

/// Supervisor compartido: cada 10s verifica DB y broker y reconecta al
/// que esté caído.
async fn health_monitor(db: Database, broker: Rmq, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(HEALTH_CHECK_PERIOD);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if !db.is_healthy().await {
                    warn!("database unhealthy, reconnecting");
                    if let Err(e) = db.reconnect().await {
                        error!(error = %e, "database reconnect failed");
                    } else {
                        info!("database reconnected");
                    }
                }

                if !broker.is_healthy().await {
                    warn!("broker unhealthy, reconnecting");
                    match broker.reconnect().await {
                        Err(e) => error!(error = %e, "broker reconnect failed"),
                        Ok(()) => {
                            if let Err(e) = broker.declare_topology().await {
                                error!(error = %e, "topology redeclare failed");
                            } else {
                                info!("broker reconnected");
                            }
                        }
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Espera SIGINT/SIGTERM y propaga la señal de shutdown
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Señal de shutdown recibida");
    let _ = shutdown_tx.send(true);
}
