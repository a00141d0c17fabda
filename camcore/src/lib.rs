use axum::extract::Request;
use axum::routing::get;
use axum::Router;

use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tower_http::validate_request::ValidateRequestHeaderLayer;
use tracing::{error, info, info_span, Level};

use crate::auth::ManyValidate;
use crate::config::Config;
use crate::route::AppState;

pub mod auth;
pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod router;
pub mod viewer;

mod r#macro;
mod metrics;
mod result;
mod route;

pub async fn serve<F>(cfg: Config, listener: TcpListener, signal: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let app_state = AppState::new(cfg.clone());
    let sweeper = tokio::spawn(crate::device::registry::sweep_tick(
        app_state.registry.clone(),
        cfg.registry.sweep_interval(),
        cfg.registry.offline_ttl(),
    ));

    let auth_layer = ValidateRequestHeaderLayer::custom(ManyValidate::new(cfg.auth.tokens));
    let app = Router::new()
        .merge(
            route::device::route()
                .merge(route::pipeline::route())
                .layer(auth_layer),
        )
        .merge(route::register::route())
        .merge(route::ws::route())
        .route(api::path::METRICS, get(metrics))
        .with_state(app_state.clone())
        .layer(if cfg.http.cors {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        })
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let span = info_span!(
                        "http_request",
                        uri = ?request.uri(),
                        method = ?request.method(),
                        span_id = tracing::field::Empty,
                    );
                    span.record(
                        "span_id",
                        span.id().unwrap_or(tracing::Id::from_u64(42)).into_u64(),
                    );
                    span
                })
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO))
                .on_failure(tower_http::trace::DefaultOnFailure::new().level(Level::INFO)),
        );

    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .unwrap_or_else(|e| error!("Application error: {e}"));

    sweeper.abort();
    info!("stopping pipelines");
    app_state.pipelines.shutdown().await;
}

pub fn metrics_register() {
    let collectors: [Box<dyn prometheus::core::Collector>; 6] = [
        Box::new(metrics::DEVICE.clone()),
        Box::new(metrics::CONNECTED.clone()),
        Box::new(metrics::PIPELINE.clone()),
        Box::new(metrics::VIEWER.clone()),
        Box::new(metrics::FRAME.clone()),
        Box::new(metrics::DROPPED.clone()),
    ];
    for collector in collectors {
        if let Err(e) = metrics::REGISTRY.register(collector) {
            error!("metrics register error: {}", e);
        }
    }
}

async fn metrics() -> String {
    metrics::ENCODER
        .encode_to_string(&metrics::REGISTRY.gather())
        .unwrap_or_else(|e| {
            error!("metrics encode error: {}", e);
            String::new()
        })
}
