// SPDX-License-Identifier: Apache-2.0

//! Public storefront handlers: catalog reads, checkout, newsletter,
//! contact, and the payment webhook. Admin routes live in `admin`.

use crate::request_utils::{
    api_error_response, client_key, if_none_match, make_request_id, maybe_compress_response,
    normalized_header_value, parse_paging, propagated_request_id, put_cache_headers,
    with_request_id,
};
use crate::AppState;
use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use tracing::{info, warn};
use tradepost_api::{
    openapi_v1_spec, ApiError, CheckoutRequest, CheckoutResponse, ContactRequest, ContactResponse,
    HealthResponse, NewsletterSignupRequest, ProductListResponse, ProductResponse,
    SubscribeResponse, VersionResponse, WebhookAck,
};
use tradepost_core::{sha256_hex, unix_millis};
use tradepost_gateways::{Email, WebhookEvent, WebhookEventKind};
use tradepost_model::{EmailAddress, OrderDraft, OrderDraftLine, OrderId, OrderStatus, ProductSlug};
use tradepost_store::{CreateOrderOutcome, StoreError, StoreErrorCode, WebhookEventRecord, WebhookOutcome};

pub(crate) fn store_error_response(err: &StoreError, request_id: &str) -> Response {
    let (status, api_err) = match err.code {
        StoreErrorCode::NotFound => (StatusCode::NOT_FOUND, ApiError::not_found(&err.message)),
        StoreErrorCode::Conflict => (StatusCode::CONFLICT, ApiError::conflict(&err.message)),
        StoreErrorCode::Constraint => (
            StatusCode::BAD_REQUEST,
            ApiError::bad_request(&err.message, serde_json::json!({})),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::internal("store operation failed"),
        ),
    };
    api_error_response(status, api_err.with_request_id(request_id))
}

fn bad_json_response(rejection: &JsonRejection, request_id: &str) -> Response {
    api_error_response(
        StatusCode::BAD_REQUEST,
        ApiError::bad_request(
            "request body is not valid json for this route",
            serde_json::json!({"detail": rejection.body_text()}),
        )
        .with_request_id(request_id),
    )
}

async fn rate_limit_gate(
    state: &AppState,
    peer: SocketAddr,
    headers: &HeaderMap,
    request_id: &str,
) -> Option<Response> {
    let ip = client_key(
        Some(peer),
        headers,
        state.config.rate_limit_per_ip.trust_forwarded_for,
    );
    match state
        .ip_limiter
        .allow(&ip, &state.config.rate_limit_per_ip)
        .await
    {
        Ok(()) => None,
        Err(retry_after_secs) => {
            let mut resp = api_error_response(
                StatusCode::TOO_MANY_REQUESTS,
                ApiError::rate_limited(retry_after_secs).with_request_id(request_id),
            );
            if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                resp.headers_mut().insert("retry-after", v);
            }
            Some(resp)
        }
    }
}

pub(crate) async fn landing_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let mut list = String::new();
    if let Ok((products, _)) = state.store.list_products(true, 50, 0) {
        for product in &products {
            list.push_str(&format!(
                "<li><a href=\"/v1/products/{slug}\">{name}</a> - {dollars}.{cents:02} {currency}</li>",
                slug = product.slug,
                name = product.name,
                dollars = product.price_cents / 100,
                cents = product.price_cents % 100,
                currency = product.currency.as_str(),
            ));
        }
    }
    if list.is_empty() {
        list.push_str("<li>Nothing on the shelves yet.</li>");
    }
    let html = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Tradepost</title></head><body>\
<h1>Tradepost</h1>\
<p>Version: <code>{}</code></p>\
<h2>Catalog</h2><ul>{}</ul>\
<h2>API</h2>\
<ul>\
<li><a href=\"/v1/products\">/v1/products</a></li>\
<li><a href=\"/v1/openapi.json\">/v1/openapi.json</a></li>\
</ul>\
</body></html>",
        env!("CARGO_PKG_VERSION"),
        list
    );
    let mut resp = Response::new(Body::from(html));
    resp.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    with_request_id(resp, &request_id)
}

pub(crate) async fn healthz_handler(State(state): State<AppState>) -> Response {
    let request_id = make_request_id(&state);
    let resp = Json(HealthResponse {
        status: "ok".to_string(),
    })
    .into_response();
    with_request_id(resp, &request_id)
}

pub(crate) async fn readyz_handler(State(state): State<AppState>) -> Response {
    let request_id = make_request_id(&state);
    let draining = !state.accepting_requests.load(Ordering::Relaxed);
    let resp = if !draining && state.store.ping().is_ok() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not-ready").into_response()
    };
    with_request_id(resp, &request_id)
}

pub(crate) async fn version_handler(State(state): State<AppState>) -> Response {
    let request_id = make_request_id(&state);
    let mut resp = Json(VersionResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
    .into_response();
    if let Ok(value) = HeaderValue::from_str("public, max-age=30") {
        resp.headers_mut().insert("cache-control", value);
    }
    with_request_id(resp, &request_id)
}

pub(crate) async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = state.metrics.render_prometheus().await;
    let mut resp = Response::new(Body::from(body));
    resp.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    resp
}

pub(crate) async fn openapi_handler(State(state): State<AppState>) -> Response {
    let request_id = make_request_id(&state);
    let mut resp = Json(openapi_v1_spec()).into_response();
    if let Ok(value) = HeaderValue::from_str("public, max-age=300") {
        resp.headers_mut().insert("cache-control", value);
    }
    with_request_id(resp, &request_id)
}

/// Public catalog: active products only, etagged and compressible so
/// storefront polls stay cheap.
pub(crate) async fn products_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let paging = match parse_paging(&params, &[]) {
        Ok(p) => p,
        Err(err) => {
            return api_error_response(
                StatusCode::BAD_REQUEST,
                err.with_request_id(&request_id),
            )
        }
    };
    let (products, total) = match state.store.list_products(true, paging.limit, paging.offset) {
        Ok(rows) => rows,
        Err(err) => return store_error_response(&err, &request_id),
    };
    let payload = ProductListResponse {
        products: products.iter().map(ProductResponse::from).collect(),
        total,
    };
    let bytes = match serde_json::to_vec(&payload) {
        Ok(b) => b,
        Err(_) => {
            return api_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal("serialization failed").with_request_id(&request_id),
            )
        }
    };
    let etag = format!("\"{}\"", sha256_hex(&bytes));
    if if_none_match(&headers).as_deref() == Some(etag.as_str()) {
        let mut resp = StatusCode::NOT_MODIFIED.into_response();
        put_cache_headers(resp.headers_mut(), state.config.limits.products_ttl, &etag);
        return with_request_id(resp, &request_id);
    }
    let (bytes, encoding) = match maybe_compress_response(&headers, &state, bytes) {
        Ok(out) => out,
        Err(err) => {
            return api_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.with_request_id(&request_id),
            )
        }
    };
    let mut resp = Response::new(Body::from(bytes));
    resp.headers_mut()
        .insert("content-type", HeaderValue::from_static("application/json"));
    if let Some(encoding) = encoding {
        resp.headers_mut()
            .insert("content-encoding", HeaderValue::from_static(encoding));
    }
    put_cache_headers(resp.headers_mut(), state.config.limits.products_ttl, &etag);
    with_request_id(resp, &request_id)
}

pub(crate) async fn product_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let slug = match ProductSlug::parse(&slug) {
        Ok(slug) => slug,
        Err(e) => {
            return api_error_response(
                StatusCode::BAD_REQUEST,
                ApiError::bad_request(format!("slug: {e}"), serde_json::json!({}))
                    .with_request_id(&request_id),
            )
        }
    };
    match state.store.product_by_slug(&slug) {
        Ok(Some(product)) if product.active => {
            let mut resp = Json(ProductResponse::from(&product)).into_response();
            let etag = format!(
                "\"{}\"",
                sha256_hex(format!("{}:{}", product.slug, product.updated_at_ms).as_bytes())
            );
            put_cache_headers(resp.headers_mut(), state.config.limits.products_ttl, &etag);
            with_request_id(resp, &request_id)
        }
        // Archived products vanish from the public surface.
        Ok(_) => api_error_response(
            StatusCode::NOT_FOUND,
            ApiError::not_found(format!("product {slug}")).with_request_id(&request_id),
        ),
        Err(err) => store_error_response(&err, &request_id),
    }
}

pub(crate) async fn checkout_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    if let Some(resp) = rate_limit_gate(&state, peer, &headers, &request_id).await {
        return resp;
    }
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_json_response(&rejection, &request_id),
    };
    let email = match EmailAddress::parse(&req.email) {
        Ok(email) => email,
        Err(e) => {
            return api_error_response(
                StatusCode::BAD_REQUEST,
                ApiError::bad_request(format!("email: {e}"), serde_json::json!({}))
                    .with_request_id(&request_id),
            )
        }
    };
    if req.items.is_empty() {
        return api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::bad_request("checkout needs at least one item", serde_json::json!({}))
                .with_request_id(&request_id),
        );
    }
    let mut lines = Vec::with_capacity(req.items.len());
    for item in &req.items {
        let slug = match ProductSlug::parse(&item.slug) {
            Ok(slug) => slug,
            Err(e) => {
                return api_error_response(
                    StatusCode::BAD_REQUEST,
                    ApiError::bad_request(
                        format!("item slug {:?}: {e}", item.slug),
                        serde_json::json!({}),
                    )
                    .with_request_id(&request_id),
                )
            }
        };
        lines.push(OrderDraftLine {
            slug,
            quantity: item.quantity,
        });
    }
    let draft = OrderDraft {
        email,
        lines,
        idempotency_key: req.idempotency_key.clone(),
    };
    let order_id = OrderId::mint(state.order_nonce.fetch_add(1, Ordering::Relaxed));
    let now_ms = unix_millis();
    let outcome = match state.store.create_order(&draft, &order_id, now_ms) {
        Ok(outcome) => outcome,
        Err(err) => return store_error_response(&err, &request_id),
    };
    if let CreateOrderOutcome::Replayed(order) = &outcome {
        // Same idempotency key, same order: hand back what exists.
        let resp = Json(CheckoutResponse {
            order_id: order.id.to_string(),
            status: order.status.as_str().to_string(),
            total_cents: order.total_cents,
            currency: order.currency.to_string(),
            payment_ref: order.payment_ref.clone(),
            checkout_url: None,
        })
        .into_response();
        return with_request_id(resp, &request_id);
    }
    let order = outcome.order().clone();
    let session = match state.payments.create_checkout(&order).await {
        Ok(session) => session,
        Err(err) => {
            // Order stays Pending; the client may retry with the same key.
            warn!(order_id = %order.id, error = %err, "payment session creation failed");
            return api_error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::unavailable("payment provider is unavailable, try again")
                    .with_request_id(&request_id),
            );
        }
    };
    if let Err(err) = state
        .store
        .set_payment_ref(&order.id, &session.payment_ref, unix_millis())
    {
        return store_error_response(&err, &request_id);
    }
    info!(order_id = %order.id, total_cents = order.total_cents, "checkout created");
    let resp = (
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id: order.id.to_string(),
            status: order.status.as_str().to_string(),
            total_cents: order.total_cents,
            currency: order.currency.to_string(),
            payment_ref: Some(session.payment_ref),
            checkout_url: Some(session.checkout_url),
        }),
    )
        .into_response();
    with_request_id(resp, &request_id)
}

fn newsletter_token(state: &AppState, email: &EmailAddress, created_at_ms: u64) -> String {
    sha256_hex(
        format!(
            "{}|{}|{}",
            email, created_at_ms, state.config.newsletter_token_secret
        )
        .as_bytes(),
    )
}

/// Always answers 202 pending so the endpoint does not leak who is
/// already subscribed. The confirmation mail only goes out for rows
/// that actually need one.
pub(crate) async fn subscribe_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<NewsletterSignupRequest>, JsonRejection>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    if let Some(resp) = rate_limit_gate(&state, peer, &headers, &request_id).await {
        return resp;
    }
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_json_response(&rejection, &request_id),
    };
    let email = match EmailAddress::parse(&req.email) {
        Ok(email) => email,
        Err(e) => {
            return api_error_response(
                StatusCode::BAD_REQUEST,
                ApiError::bad_request(format!("email: {e}"), serde_json::json!({}))
                    .with_request_id(&request_id),
            )
        }
    };
    let now_ms = unix_millis();
    let token = newsletter_token(&state, &email, now_ms);
    let outcome = match state.store.subscribe_newsletter(&email, &token, now_ms) {
        Ok(outcome) => outcome,
        Err(err) => return store_error_response(&err, &request_id),
    };
    if outcome.needs_confirmation_email() {
        let subscriber = outcome.subscriber();
        let confirm_url = format!(
            "{}/v1/newsletter/confirm?token={}",
            state.config.mail.public_base_url, subscriber.token
        );
        let mail = Email {
            to: email.clone(),
            subject: "Confirm your tradepost newsletter signup".to_string(),
            text: format!(
                "Hi,\n\nConfirm your subscription by opening:\n{confirm_url}\n\n\
                 If you did not sign up, ignore this mail.\n"
            ),
        };
        if let Err(err) = state.mailer.send(&mail).await {
            warn!(error = %err, "newsletter confirmation mail failed");
        }
    }
    let resp = (
        StatusCode::ACCEPTED,
        Json(SubscribeResponse {
            status: "pending".to_string(),
        }),
    )
        .into_response();
    with_request_id(resp, &request_id)
}

fn token_param(
    params: &HashMap<String, String>,
    request_id: &str,
) -> Result<String, Box<Response>> {
    match params.get("token").map(String::as_str) {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(Box::new(api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::bad_request("missing token parameter", serde_json::json!({}))
                .with_request_id(request_id),
        ))),
    }
}

pub(crate) async fn newsletter_confirm_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let token = match token_param(&params, &request_id) {
        Ok(token) => token,
        Err(resp) => return *resp,
    };
    match state.store.confirm_subscriber(&token, unix_millis()) {
        Ok(subscriber) => {
            info!(email = %subscriber.email, "newsletter subscription confirmed");
            let resp = Json(SubscribeResponse {
                status: subscriber.status.as_str().to_string(),
            })
            .into_response();
            with_request_id(resp, &request_id)
        }
        Err(err) => store_error_response(&err, &request_id),
    }
}

pub(crate) async fn newsletter_unsubscribe_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let token = match token_param(&params, &request_id) {
        Ok(token) => token,
        Err(resp) => return *resp,
    };
    match state.store.unsubscribe_by_token(&token, unix_millis()) {
        Ok(subscriber) => {
            let resp = Json(SubscribeResponse {
                status: subscriber.status.as_str().to_string(),
            })
            .into_response();
            with_request_id(resp, &request_id)
        }
        Err(err) => store_error_response(&err, &request_id),
    }
}

pub(crate) async fn contact_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<ContactRequest>, JsonRejection>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    if let Some(resp) = rate_limit_gate(&state, peer, &headers, &request_id).await {
        return resp;
    }
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_json_response(&rejection, &request_id),
    };
    if req.looks_like_bot() {
        // Honeypot tripped: same answer as success, nothing stored.
        let resp = (StatusCode::ACCEPTED, Json(ContactResponse { received: true })).into_response();
        return with_request_id(resp, &request_id);
    }
    let email = match EmailAddress::parse(&req.email) {
        Ok(email) => email,
        Err(e) => {
            return api_error_response(
                StatusCode::BAD_REQUEST,
                ApiError::bad_request(format!("email: {e}"), serde_json::json!({}))
                    .with_request_id(&request_id),
            )
        }
    };
    let message = match state
        .store
        .insert_contact_message(&req.name, &email, &req.message, unix_millis())
    {
        Ok(message) => message,
        Err(err) => return store_error_response(&err, &request_id),
    };
    if let Ok(inbox) = EmailAddress::parse(&state.config.mail.shop_inbox) {
        let mail = Email {
            to: inbox,
            subject: format!("Contact form: {}", message.name),
            text: format!(
                "From: {} <{}>\n\n{}\n",
                message.name, message.email, message.body
            ),
        };
        if let Err(err) = state.mailer.send(&mail).await {
            warn!(message_id = message.id, error = %err, "contact notification mail failed");
        }
    }
    let resp = (StatusCode::ACCEPTED, Json(ContactResponse { received: true })).into_response();
    with_request_id(resp, &request_id)
}

async fn send_receipt(state: &AppState, order: &tradepost_model::Order) {
    let mail = Email {
        to: order.email.clone(),
        subject: format!("Receipt for order {}", order.id),
        text: format!(
            "Thanks for your order.\n\nOrder: {}\nTotal: {}.{:02} {}\n",
            order.id,
            order.total_cents / 100,
            order.total_cents % 100,
            order.currency.as_str()
        ),
    };
    if let Err(err) = state.mailer.send(&mail).await {
        warn!(order_id = %order.id, error = %err, "receipt mail failed");
    }
}

/// Applies a verified payment event to the order book. Dedupe is by
/// event id; replays ack with the outcome of the first delivery.
pub(crate) async fn stripe_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    if !state.config.webhook.enabled {
        return api_error_response(
            StatusCode::NOT_FOUND,
            ApiError::not_found("no such route").with_request_id(&request_id),
        );
    }
    if body.len() > state.config.limits.max_body_bytes {
        return api_error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::payload_too_large(state.config.limits.max_body_bytes)
                .with_request_id(&request_id),
        );
    }
    let Some(signature) = normalized_header_value(&headers, "stripe-signature", 512) else {
        return api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::bad_request("missing stripe-signature header", serde_json::json!({}))
                .with_request_id(&request_id),
        );
    };
    let now_unix = unix_millis() / 1_000;
    if let Err(err) = tradepost_gateways::webhook::verify_signature(
        &state.config.webhook.secret,
        &signature,
        &body,
        now_unix,
        state.config.webhook.tolerance_secs,
    ) {
        warn!(error = %err, "webhook signature rejected");
        return api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::bad_request(format!("signature: {err}"), serde_json::json!({}))
                .with_request_id(&request_id),
        );
    }
    let event = match WebhookEvent::from_body(&body) {
        Ok(event) => event,
        Err(e) => {
            return api_error_response(
                StatusCode::BAD_REQUEST,
                ApiError::bad_request(e, serde_json::json!({})).with_request_id(&request_id),
            )
        }
    };

    match state.store.webhook_event(&event.id) {
        Ok(Some(existing)) => {
            let resp = Json(WebhookAck {
                received: true,
                duplicate: true,
                outcome: existing.outcome.as_str().to_string(),
            })
            .into_response();
            return with_request_id(resp, &request_id);
        }
        Ok(None) => {}
        Err(err) => return store_error_response(&err, &request_id),
    }

    let now_ms = unix_millis();
    let applied = match &event.kind {
        WebhookEventKind::PaymentSucceeded { payment_ref, .. } => {
            apply_transition(&state, payment_ref, OrderStatus::Paid, &request_id).await
        }
        WebhookEventKind::PaymentFailed { payment_ref } => {
            apply_transition(&state, payment_ref, OrderStatus::Failed, &request_id).await
        }
        WebhookEventKind::ChargeRefunded { payment_ref, .. } => {
            apply_transition(&state, payment_ref, OrderStatus::Refunded, &request_id).await
        }
        // Kinds this build does not know about are acked like Ignored.
        _ => Ok((WebhookOutcome::Ignored, None)),
    };
    let (outcome, order_public_id) = match applied {
        Ok(pair) => pair,
        Err(resp) => return *resp,
    };

    let record = WebhookEventRecord {
        event_id: event.id.clone(),
        event_type: event.event_type.clone(),
        order_public_id,
        outcome,
        received_at_ms: now_ms,
    };
    let fresh = match state.store.record_webhook_event(&record) {
        Ok(fresh) => fresh,
        Err(err) => return store_error_response(&err, &request_id),
    };
    state.metrics.observe_webhook(outcome.as_str()).await;
    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        outcome = outcome.as_str(),
        "webhook processed"
    );
    let resp = Json(WebhookAck {
        received: true,
        duplicate: !fresh,
        outcome: outcome.as_str().to_string(),
    })
    .into_response();
    with_request_id(resp, &request_id)
}

/// Moves the order named by `payment_ref` to `target`. A missing order
/// is `Unmatched` and an illegal transition is `Conflict`; both are
/// acked so the provider stops retrying.
async fn apply_transition(
    state: &AppState,
    payment_ref: &str,
    target: OrderStatus,
    request_id: &str,
) -> Result<(WebhookOutcome, Option<OrderId>), Box<Response>> {
    let order = match state.store.order_by_payment_ref(payment_ref) {
        Ok(order) => order,
        Err(err) => return Err(Box::new(store_error_response(&err, request_id))),
    };
    let Some(order) = order else {
        warn!(payment_ref, "webhook names an unknown payment ref");
        return Ok((WebhookOutcome::Unmatched, None));
    };
    match state.store.set_order_status(&order.id, target, unix_millis()) {
        Ok(updated) => {
            if target == OrderStatus::Paid {
                send_receipt(state, &updated).await;
            }
            Ok((WebhookOutcome::Applied, Some(order.id)))
        }
        Err(err) if err.code == StoreErrorCode::Conflict => {
            warn!(
                order_id = %order.id,
                from = order.status.as_str(),
                to = target.as_str(),
                "webhook transition conflicts with order state"
            );
            Ok((WebhookOutcome::Conflict, Some(order.id)))
        }
        Err(err) => Err(Box::new(store_error_response(&err, request_id))),
    }
}
