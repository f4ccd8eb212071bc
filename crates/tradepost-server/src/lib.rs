// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! HTTP server for the tradepost storefront: public catalog and
//! checkout routes, the signed payment webhook, and the key-guarded
//! admin surface, plus the background close scheduler.

pub mod config;

mod admin;
mod handlers;
mod metrics;
mod rate_limit;
mod request_utils;
mod scheduler;

pub use config::{validate_startup_config_contract, ServerConfig};
pub use scheduler::run_scheduler;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::Router;
use metrics::RequestMetrics;
use rate_limit::RateLimiter;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::Instant;
use tradepost_core::unix_millis;
use tradepost_gateways::{CopyModel, Mailer, PaymentGateway};
use tradepost_store::Store;

pub const CRATE_NAME: &str = "tradepost-server";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<Store>,
    pub payments: Arc<dyn PaymentGateway>,
    pub mailer: Arc<dyn Mailer>,
    pub copy_model: Arc<dyn CopyModel>,
    pub accepting_requests: Arc<AtomicBool>,
    pub(crate) metrics: Arc<RequestMetrics>,
    pub(crate) ip_limiter: Arc<RateLimiter>,
    pub(crate) request_id_seed: Arc<AtomicU64>,
    pub(crate) order_nonce: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: ServerConfig,
        store: Store,
        payments: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
        copy_model: Arc<dyn CopyModel>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            payments,
            mailer,
            copy_model,
            accepting_requests: Arc::new(AtomicBool::new(true)),
            metrics: Arc::new(RequestMetrics::default()),
            ip_limiter: Arc::new(RateLimiter::default()),
            request_id_seed: Arc::new(AtomicU64::new(1)),
            // Seeded from the clock so ids stay unique across restarts.
            order_nonce: Arc::new(AtomicU64::new(unix_millis())),
        }
    }
}

async fn metrics_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // Requests that matched no route share one label; labelling by raw
    // path would let probes grow the metric maps without bound.
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());
    let started = Instant::now();
    state.metrics.request_started();
    let resp = next.run(req).await;
    state
        .metrics
        .observe_request(
            &route,
            resp.status().as_u16(),
            started.elapsed().as_nanos() as u64,
        )
        .await;
    resp
}

pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.config.limits.max_body_bytes;
    Router::new()
        .route("/", get(handlers::landing_handler))
        .route("/healthz", get(handlers::healthz_handler))
        .route("/readyz", get(handlers::readyz_handler))
        .route("/version", get(handlers::version_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/v1/openapi.json", get(handlers::openapi_handler))
        .route("/v1/products", get(handlers::products_handler))
        .route("/v1/products/{slug}", get(handlers::product_handler))
        .route("/v1/checkout", post(handlers::checkout_handler))
        .route(
            "/v1/newsletter/subscribe",
            post(handlers::subscribe_handler),
        )
        .route(
            "/v1/newsletter/confirm",
            get(handlers::newsletter_confirm_handler),
        )
        .route(
            "/v1/newsletter/unsubscribe",
            get(handlers::newsletter_unsubscribe_handler),
        )
        .route("/v1/contact", post(handlers::contact_handler))
        .route("/v1/webhooks/stripe", post(handlers::stripe_webhook_handler))
        .route(
            "/v1/admin/products",
            get(admin::products_list_handler).post(admin::product_create_handler),
        )
        .route(
            "/v1/admin/products/{slug}",
            put(admin::product_update_handler),
        )
        .route(
            "/v1/admin/products/{slug}/archive",
            post(admin::product_archive_handler),
        )
        .route("/v1/admin/orders", get(admin::orders_list_handler))
        .route("/v1/admin/orders/{id}", get(admin::order_get_handler))
        .route(
            "/v1/admin/orders/{id}/fulfill",
            post(admin::order_fulfill_handler),
        )
        .route(
            "/v1/admin/orders/{id}/refund",
            post(admin::order_refund_handler),
        )
        .route("/v1/admin/messages", get(admin::messages_list_handler))
        .route(
            "/v1/admin/messages/{id}/resolve",
            post(admin::message_resolve_handler),
        )
        .route(
            "/v1/admin/subscribers",
            get(admin::subscribers_list_handler),
        )
        .route(
            "/v1/admin/close-runs",
            get(admin::close_runs_list_handler).post(admin::close_run_trigger_handler),
        )
        .route(
            "/v1/admin/close-runs/{date}",
            get(admin::close_run_get_handler),
        )
        .route(
            "/v1/admin/ads-drafts",
            get(admin::drafts_list_handler).post(admin::draft_create_handler),
        )
        .route(
            "/v1/admin/ads-drafts/{id}/review",
            post(admin::draft_review_handler),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            request_utils::security_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .with_state(state)
}
