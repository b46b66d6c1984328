//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints (served on the same listener as /ws):
//!   GET /metrics  Prometheus text format
//!   GET /healthz  liveness probe, 200 while the process runs

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::{counter::Counter, family::Family, gauge::Gauge};
use prometheus_client::registry::Registry;
use std::sync::Arc;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ActionLabels {
    pub action: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReasonLabels {
    pub reason: String,
}

/// Relay counters. Handles are cheap clones sharing the registered series.
#[derive(Clone, Default)]
pub struct RelayMetrics {
    pub connections: Gauge,
    pub rooms: Gauge,
    pub frames_relayed: Family<ActionLabels, Counter>,
    pub frames_dropped: Family<ReasonLabels, Counter>,
    pub handshake_failures: Counter,
}

impl RelayMetrics {
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "murmur_connections",
            "Open, authenticated WebSocket connections",
            metrics.connections.clone(),
        );
        registry.register("murmur_rooms", "Rooms with at least one member", metrics.rooms.clone());
        registry.register(
            "murmur_frames_relayed",
            "Outer frames queued to a recipient, by action",
            metrics.frames_relayed.clone(),
        );
        registry.register(
            "murmur_frames_dropped",
            "Outer frames discarded, by reason",
            metrics.frames_dropped.clone(),
        );
        registry.register(
            "murmur_handshake_failures",
            "Connections closed during the transport handshake",
            metrics.handshake_failures.clone(),
        );
        metrics
    }

    pub fn relayed(&self, action: &str) {
        self.frames_relayed
            .get_or_create(&ActionLabels {
                action: action.to_string(),
            })
            .inc();
    }

    pub fn dropped(&self, reason: &str) {
        self.frames_dropped
            .get_or_create(&ReasonLabels {
                reason: reason.to_string(),
            })
            .inc();
    }
}

pub async fn metrics_handler(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

/// Liveness probe: returns 200 if the process is running.
pub async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_series() {
        let mut registry = Registry::default();
        let metrics = RelayMetrics::register(&mut registry);
        metrics.connections.inc();
        metrics.relayed("m");
        metrics.relayed("m");
        metrics.dropped("not_in_room");

        let mut body = String::new();
        encode(&mut body, &registry).unwrap();
        assert!(body.contains("murmur_connections 1"));
        assert!(body.contains("murmur_frames_relayed_total{action=\"m\"} 2"));
        assert!(body.contains("murmur_frames_dropped_total{reason=\"not_in_room\"} 1"));
    }
}
