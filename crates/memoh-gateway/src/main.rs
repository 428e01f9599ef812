use std::net::SocketAddr;
use std::sync::Arc;

use memoh_channels::ChannelManager;
use memoh_core::MemohConfig;
use memoh_telegram::TelegramAdapter;
use tracing::{info, warn};

mod app;
mod broadcast;
mod http;
mod telegram_sink;

use telegram_sink::GatewaySink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "memoh_gateway=info,tower_http=debug".into()))
        .init();

    // load config: explicit MEMOH_CONFIG env > ~/.memoh/memoh.toml > defaults
    let config = MemohConfig::load(None).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        MemohConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let mut channels = ChannelManager::new();
    let telegram_enabled = config.channels.telegram.enabled;
    let telegram = if telegram_enabled {
        match TelegramAdapter::new(config.channels.telegram.clone()) {
            Ok(adapter) => {
                channels.register(Box::new(adapter.clone()));
                Some(adapter)
            }
            Err(e) => {
                warn!("telegram channel disabled: {e}");
                None
            }
        }
    } else {
        None
    };

    channels.connect_all().await;

    let state = app::AppState::build(config, channels)?;

    if let Some(adapter) = telegram {
        let sink = Arc::new(GatewaySink { state: Arc::clone(&state) });
        tokio::spawn(adapter.run(sink));
    }

    let router = app::build_router(Arc::clone(&state));

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("memoh gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
