mod config;
mod routes;
mod sink;
mod udp;
mod ws;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use velotrain_core::clock::{Clock, SystemClock};
use velotrain_core::engine::{Engine, EngineHandles};
use velotrain_core::intake::GateSource;
use velotrain_core::reorder::{DEFAULT_CAPACITY, DEFAULT_WINDOW_SECS};
use velotrain_core::track::TrackModel;

use crate::sink::BroadcastSink;

static STARTUP_MS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Parser)]
#[command(name = "velotrain-server", about = "Realtime track-cycling timing filter")]
struct Args {
    /// Path to a TOML config file (recognized keys documented in velotrain_core::Config).
    #[arg(long, default_value = "velotrain.toml")]
    config: std::path::PathBuf,

    /// HTTP/WS port for the debug surface (§6 health + topic bridge).
    #[arg(long, default_value_t = 3000)]
    port: u16,
}

pub struct AppState {
    pub handles: EngineHandles,
    pub sink: Arc<BroadcastSink>,
    pub clock: Arc<dyn Clock>,
    pub trig_refid: String,
}

async fn health_check() -> axum::Json<serde_json::Value> {
    let now_ms =
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
    let startup = STARTUP_MS.load(Ordering::Relaxed);
    let uptime_secs = if startup > 0 { (now_ms - startup) / 1000 } else { 0 };
    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": uptime_secs,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let startup_ms =
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
    STARTUP_MS.store(startup_ms, Ordering::Relaxed);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "velotrain_server=info,velotrain_core=info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = config::load(&args.config)?;
    info!(config = %args.config.display(), "loaded configuration");

    let track = TrackModel::build(cfg.laplen, &cfg.mpseq, &cfg.mps)?;

    let gate = cfg.gatesrc.as_ref().map(|channel| GateSource {
        channel: channel.clone(),
        refid: cfg.gate.clone(),
        delay_secs: cfg.gatedelay,
    });

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let broadcast_sink = Arc::new(BroadcastSink::default());

    let (engine, handles) = Engine::new(
        track.clone(),
        cfg.mpseq.clone(),
        cfg.sync.clone(),
        cfg.trig.clone(),
        cfg.moto.clone(),
        cfg.minspeed,
        cfg.maxspeed,
        cfg.mingate,
        cfg.maxgate,
        cfg.laplen,
        cfg.authkey.clone(),
        DEFAULT_WINDOW_SECS,
        DEFAULT_CAPACITY,
        gate,
        clock.clone(),
        broadcast_sink.clone(),
    );

    tokio::spawn(async move {
        if let Err(err) = engine.run().await {
            tracing::error!(error = %err, "engine loop exited");
        }
    });

    let udp_cfg = udp::UdpIntakeConfig { port: cfg.uport, gate_channel: cfg.gatesrc.clone() };
    let track_for_udp = Arc::new(track);
    let clock_for_udp = clock.clone();
    let raw_tx = handles.raw_tx.clone();
    tokio::spawn(udp::run(udp_cfg, track_for_udp, clock_for_udp, raw_tx));

    let state = Arc::new(AppState { handles, sink: broadcast_sink, clock, trig_refid: cfg.trig });

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/marker", post(routes::marker))
        .route("/reset", post(routes::reset))
        .route("/resetunit", post(routes::reset_unit))
        .route("/timer", post(routes::timer))
        .route("/request", post(routes::request))
        .route("/ws", get(ws::upgrade))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!(%addr, "velotrain-server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_sink = broadcast_sink.clone();
    let shutdown_clock = clock.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            // Final status emitted on graceful exit (§4.9): `info = "offline"`.
            use velotrain_core::sink::StatusSink;
            use velotrain_core::status::StatusTicker;
            let snapshot = StatusTicker::default().offline_snapshot(shutdown_clock.now(), 0);
            shutdown_sink.publish_status(&snapshot).await;
        })
        .await?;
    Ok(())
}
