#![warn(missing_docs)]

//! AisBridge daemon entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aisbridge_bus::{BusTransport, RedisBus, RpcClient, RpcClientConfig};
use aisbridge_gateway::{api, AppState, GatewayConfig};
use aisbridge_relay::streams::{self, LogClass, StatusCache};
use aisbridge_relay::{ClientRegistry, RelayError, RelayManager, SessionHandler, WsChannel};
use aisbridge_store::{AisRecord, ShardedStore};

/// Bridge between the web control plane and the shipborne terminal's
/// master-control service.
#[derive(Debug, Parser)]
#[command(name = "aisbridge", version)]
struct Cli {
    /// Configuration file (TOML or JSON); defaults apply when absent.
    #[arg(short, long, env = "AISBRIDGE_CONFIG", default_value = "/etc/aisbridge/gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = if cli.config.exists() {
        GatewayConfig::from_file(&cli.config)?
    } else {
        tracing::warn!("Config file not found, using defaults: {}", cli.config.display());
        GatewayConfig::default()
    };

    tracing::info!(redis = %config.redis_url, bind = %config.bind_addr, "aisbridge starting");

    let bus = Arc::new(RedisBus::connect(&config.redis_url).await?);
    let transport: Arc<dyn BusTransport> = bus.clone();
    let rpc = Arc::new(
        RpcClient::start(
            transport.clone(),
            RpcClientConfig {
                request_channel: config.request_channel.clone(),
                response_channel: config.response_channel.clone(),
                default_timeout_ms: config.default_timeout_ms,
            },
        )
        .await?,
    );

    let store = Arc::new(ShardedStore::new(
        config.shard_dir.clone(),
        config.shard_prefix.clone(),
    ));
    let registry = Arc::new(ClientRegistry::new());
    let status = StatusCache::new();
    let relays = RelayManager::new(registry.clone());

    // AIS frames fan out to opted-in clients and land in the sharded store.
    let sink = spawn_store_sink(store.clone());
    let ais_relay = relays
        .register(transport.as_ref(), &config.ais_channel, WsChannel::Ais, false, {
            move |raw| {
                let frame = streams::decode_ais_frame(raw)?;
                let record = AisRecord::new(frame.utc, &frame.ts, frame.mmsi, frame.msg, &frame.content);
                let _ = sink.send(record);
                serde_json::to_value(&frame).map_err(|e| RelayError::Transform(e.to_string()))
            }
        })
        .await?;

    let log_relay = relays
        .register(transport.as_ref(), &config.log_channel, WsChannel::Log, true, |raw| {
            let frame = streams::decode_log_frame(raw)?;
            // Run-log lines also land in the gateway's own log; storage
            // frames stay relay-only.
            if frame.class == LogClass::Running {
                tracing::info!(target: "terminal", tip = %frame.tip, utc = frame.utc, "{}", frame.content);
            }
            serde_json::to_value(&frame).map_err(|e| RelayError::Transform(e.to_string()))
        })
        .await?;

    let update_relay = relays
        .register(transport.as_ref(), &config.update_channel, WsChannel::Update, true, {
            let status = status.clone();
            move |raw| {
                let value = streams::decode_update_frame(raw)?;
                status.set(value.clone());
                Ok(value)
            }
        })
        .await?;

    let state = Arc::new(AppState {
        rpc: rpc.clone(),
        bus,
        store,
        registry: registry.clone(),
        session: SessionHandler::new(registry),
        status,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");

    tokio::select! {
        result = axum::serve(listener, api::router(state).into_make_service()) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    ais_relay.close();
    log_relay.close();
    update_relay.close();
    rpc.shutdown().await;
    Ok(())
}

/// A background writer draining decoded AIS records into the store. Append
/// is synchronous SQLite work, so it runs on the blocking pool.
fn spawn_store_sink(store: Arc<ShardedStore>) -> mpsc::UnboundedSender<AisRecord> {
    let (tx, mut rx) = mpsc::unbounded_channel::<AisRecord>();
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            let store = store.clone();
            let written = tokio::task::spawn_blocking(move || store.append(&record)).await;
            match written {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(error = %err, "ais append failed"),
                Err(err) => tracing::warn!(error = %err, "ais append task failed"),
            }
        }
    });
    tx
}
