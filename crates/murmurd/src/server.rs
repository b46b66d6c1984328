//! The relay HTTP surface: `/ws` plus health and metrics on one listener.

use anyhow::{Context, Result};
use axum::extract::{FromRef, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use murmur_core::RelayConfig;
use murmur_crypto::RelayKeyPair;
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::connection::run_connection;
use crate::hub::{spawn_hub, HubHandle};
use crate::metrics::{healthz_handler, metrics_handler, RelayMetrics};

/// Hub command queue depth
const HUB_QUEUE: usize = 4096;

#[derive(Clone)]
pub struct RelayState {
    pub keys: Arc<RelayKeyPair>,
    pub hub: HubHandle,
    pub metrics: RelayMetrics,
    pub registry: Arc<Registry>,
    pub outbound_queue: usize,
    pub max_frame_bytes: usize,
}

impl FromRef<RelayState> for Arc<Registry> {
    fn from_ref(state: &RelayState) -> Self {
        state.registry.clone()
    }
}

impl RelayState {
    /// Build the state and start the hub task.
    pub fn new(config: &RelayConfig, keys: Arc<RelayKeyPair>) -> Self {
        let mut registry = Registry::default();
        let metrics = RelayMetrics::register(&mut registry);
        let (hub, _task) = spawn_hub(metrics.clone(), HUB_QUEUE);
        Self {
            keys,
            hub,
            metrics,
            registry: Arc::new(registry),
            outbound_queue: config.outbound_queue,
            max_frame_bytes: config.max_frame_bytes,
        }
    }
}

pub fn app(state: RelayState, with_metrics: bool) -> Router {
    let mut router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz_handler));
    if with_metrics {
        router = router.route("/metrics", get(metrics_handler));
    }
    router.with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    ws.max_message_size(state.max_frame_bytes)
        .max_frame_size(state.max_frame_bytes)
        .on_upgrade(move |socket| {
            run_connection(
                socket,
                state.keys,
                state.hub,
                state.metrics,
                state.outbound_queue,
            )
        })
}

/// Generate the transport keypair off the async runtime.
pub async fn generate_keys(bits: usize) -> Result<Arc<RelayKeyPair>> {
    let keys = tokio::task::spawn_blocking(move || RelayKeyPair::generate(bits))
        .await
        .context("key generation task")??;
    Ok(Arc::new(keys))
}

/// A relay bound to a socket, not yet serving.
pub struct BoundRelay {
    listener: TcpListener,
    app: Router,
}

impl BoundRelay {
    pub async fn bind(config: &RelayConfig, keys: Arc<RelayKeyPair>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen)
            .await
            .with_context(|| format!("relay bind {}", config.listen))?;
        let state = RelayState::new(config, keys);
        Ok(Self {
            listener,
            app: app(state, config.metrics),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!(addr = %addr, "relay: listening on /ws, /healthz, /metrics");
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("relay server")
    }
}

/// Generate keys, bind, and serve until Ctrl-C.
pub async fn run(config: RelayConfig) -> Result<()> {
    info!(bits = config.rsa_bits, "generating transport keypair");
    let keys = generate_keys(config.rsa_bits).await?;
    let relay = BoundRelay::bind(&config, keys).await?;
    relay
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
}
