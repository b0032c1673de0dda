//! # qrgate-api: HTTP Surface for the Check-in Bridge
//!
//! The bridge itself talks MQTT. This crate gives it an HTTP face for
//! dashboards and operators.
//!
//! ## API Surface
//!
//! | Route                | Purpose                                        |
//! |----------------------|------------------------------------------------|
//! | `/api/events`        | Server-Sent Events stream of fan-out events    |
//! | `/health/liveness`   | Process is up                                  |
//! | `/health/readiness`  | Broker connection is up                        |
//! | `/metrics`           | Prometheus text exposition                     |

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{self, Stream, StreamExt};
use tower_http::trace::TraceLayer;

use qrgate_bridge::{BridgeMetrics, FanOut, Observer, Transport};

/// Shared state for the route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Observer hub the bridge mirrors into.
    pub fanout: FanOut,
    /// Bridge counters.
    pub metrics: BridgeMetrics,
    /// Broker connection, for readiness and the connection gauge.
    pub transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("fanout", &self.fanout)
            .field("transport", &self.transport.name())
            .finish()
    }
}

impl AppState {
    /// Bundle the handles the routes need.
    pub fn new(fanout: FanOut, metrics: BridgeMetrics, transport: Arc<dyn Transport>) -> Self {
        Self {
            fanout,
            metrics,
            transport,
        }
    }
}

/// Assemble the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/events", get(events))
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// -- Observer stream ----------------------------------------------------------

/// Unregisters its observer when the SSE response is dropped.
struct Subscription {
    fanout: FanOut,
    observer: Observer,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.fanout.unregister(self.observer.id);
    }
}

async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let observer = state.fanout.subscribe();
    tracing::info!(observer_id = observer.id, "observer connected");

    let subscription = Subscription {
        fanout: state.fanout.clone(),
        observer,
    };
    let hello = stream::once(async { Ok(Event::default().comment("connected")) });
    let feed = stream::unfold(subscription, |mut sub| async move {
        let event = sub.observer.events.recv().await?;
        Some((Ok(Event::default().data(event.to_json_string())), sub))
    });
    Sse::new(hello.chain(feed))
}

// -- Probes -------------------------------------------------------------------

/// Liveness probe: 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 503 while the broker connection is down.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if state.transport.is_connected() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "transport disconnected")
    }
}

async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state
        .metrics
        .set_gauges(state.fanout.observer_count(), state.transport.is_connected());

    match state.metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}
