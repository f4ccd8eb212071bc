// SPDX-License-Identifier: Apache-2.0

//! Admin handlers. Authentication happened in the security middleware
//! before any of these run; everything here assumes a trusted caller.

use crate::handlers::store_error_response;
use crate::request_utils::{
    api_error_response, bool_query_flag, parse_paging, propagated_request_id, with_request_id,
};
use crate::AppState;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::collections::HashMap;
use tracing::info;
use tradepost_api::{
    ApiError, CloseRunRequest, CloseRunResponse, ContactMessageResponse, DraftRequest,
    DraftResponse, DraftReviewRequest, OrderListResponse, OrderResponse, ProductListResponse,
    ProductResponse, ProductUpsertRequest, ReviewDecision, SubscriberResponse,
};
use tradepost_close::{
    generate_draft, run_close, CloseErrorCode, CloseJob, CloseOptions, DraftErrorCode, SummaryMail,
};
use tradepost_core::unix_millis;
use tradepost_model::{
    AdChannel, BusinessDate, CloseSource, Currency, DraftStatus, EmailAddress, OrderId,
    OrderStatus, Product, ProductSlug, SubscriberStatus,
};

fn bad_request(message: impl Into<String>, request_id: &str) -> Response {
    api_error_response(
        StatusCode::BAD_REQUEST,
        ApiError::bad_request(message, serde_json::json!({})).with_request_id(request_id),
    )
}

fn bad_json(rejection: &JsonRejection, request_id: &str) -> Response {
    api_error_response(
        StatusCode::BAD_REQUEST,
        ApiError::bad_request(
            "request body is not valid json for this route",
            serde_json::json!({"detail": rejection.body_text()}),
        )
        .with_request_id(request_id),
    )
}

pub(crate) async fn products_list_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let paging = match parse_paging(&params, &[]) {
        Ok(p) => p,
        Err(err) => {
            return api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id))
        }
    };
    match state.store.list_products(false, paging.limit, paging.offset) {
        Ok((products, total)) => {
            let resp = Json(ProductListResponse {
                products: products.iter().map(ProductResponse::from).collect(),
                total,
            })
            .into_response();
            with_request_id(resp, &request_id)
        }
        Err(err) => store_error_response(&err, &request_id),
    }
}

fn product_from_request(
    req: &ProductUpsertRequest,
    existing: Option<&Product>,
    now_ms: u64,
) -> Result<Product, String> {
    let slug = ProductSlug::parse(&req.slug).map_err(|e| format!("slug: {e}"))?;
    let currency =
        Currency::parse_str(&req.currency).ok_or_else(|| format!("unknown currency {:?}", req.currency))?;
    let product = Product {
        slug,
        name: req.name.clone(),
        description: req.description.clone(),
        price_cents: req.price_cents,
        currency,
        image_url: req.image_url.clone(),
        active: req.active,
        position: req.position,
        created_at_ms: existing.map_or(now_ms, |p| p.created_at_ms),
        updated_at_ms: now_ms,
    };
    product.validate().map_err(|e| e.to_string())?;
    Ok(product)
}

async fn upsert_product(
    state: &AppState,
    req: &ProductUpsertRequest,
    request_id: &str,
) -> Response {
    let slug = match ProductSlug::parse(&req.slug) {
        Ok(slug) => slug,
        Err(e) => return bad_request(format!("slug: {e}"), request_id),
    };
    let existing = match state.store.product_by_slug(&slug) {
        Ok(existing) => existing,
        Err(err) => return store_error_response(&err, request_id),
    };
    let created = existing.is_none();
    let product = match product_from_request(req, existing.as_ref(), unix_millis()) {
        Ok(product) => product,
        Err(e) => return bad_request(e, request_id),
    };
    if let Err(err) = state.store.upsert_product(&product) {
        return store_error_response(&err, request_id);
    }
    info!(slug = %product.slug, created, "product upserted");
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let resp = (status, Json(ProductResponse::from(&product))).into_response();
    with_request_id(resp, request_id)
}

pub(crate) async fn product_create_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ProductUpsertRequest>, JsonRejection>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_json(&rejection, &request_id),
    };
    upsert_product(&state, &req, &request_id).await
}

pub(crate) async fn product_update_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    payload: Result<Json<ProductUpsertRequest>, JsonRejection>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_json(&rejection, &request_id),
    };
    if req.slug != slug {
        return bad_request(
            format!("body slug {:?} does not match path slug {slug:?}", req.slug),
            &request_id,
        );
    }
    upsert_product(&state, &req, &request_id).await
}

pub(crate) async fn product_archive_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let slug = match ProductSlug::parse(&slug) {
        Ok(slug) => slug,
        Err(e) => return bad_request(format!("slug: {e}"), &request_id),
    };
    match state.store.archive_product(&slug, unix_millis()) {
        Ok(true) => {
            info!(slug = %slug, "product archived");
            let resp = Json(serde_json::json!({"archived": true})).into_response();
            with_request_id(resp, &request_id)
        }
        Ok(false) => api_error_response(
            StatusCode::NOT_FOUND,
            ApiError::not_found(format!("product {slug}")).with_request_id(&request_id),
        ),
        Err(err) => store_error_response(&err, &request_id),
    }
}

pub(crate) async fn orders_list_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let paging = match parse_paging(&params, &["status", "date"]) {
        Ok(p) => p,
        Err(err) => {
            return api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id))
        }
    };
    let status = match params.get("status") {
        None => None,
        Some(raw) => match OrderStatus::parse_str(raw) {
            Some(status) => Some(status),
            None => return bad_request(format!("unknown order status {raw:?}"), &request_id),
        },
    };
    let window = match params.get("date") {
        None => None,
        Some(raw) => {
            let Ok(date) = BusinessDate::parse(raw) else {
                return bad_request(format!("date {raw:?} is not YYYY-MM-DD"), &request_id);
            };
            let Some(window) = date.day_window_utc_ms(state.config.close.utc_offset_minutes)
            else {
                return bad_request(format!("date {raw} is out of range"), &request_id);
            };
            Some(window)
        }
    };
    match state
        .store
        .list_orders(status, window, paging.limit, paging.offset)
    {
        Ok((orders, total)) => {
            let resp = Json(OrderListResponse {
                orders: orders.iter().map(OrderResponse::from).collect(),
                total,
            })
            .into_response();
            with_request_id(resp, &request_id)
        }
        Err(err) => store_error_response(&err, &request_id),
    }
}

fn parse_order_id(raw: &str, request_id: &str) -> Result<OrderId, Box<Response>> {
    OrderId::parse(raw)
        .map_err(|e| Box::new(bad_request(format!("order id: {e}"), request_id)))
}

pub(crate) async fn order_get_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let id = match parse_order_id(&id, &request_id) {
        Ok(id) => id,
        Err(resp) => return *resp,
    };
    match state.store.order_by_public_id(&id) {
        Ok(Some(order)) => {
            let resp = Json(OrderResponse::from(&order)).into_response();
            with_request_id(resp, &request_id)
        }
        Ok(None) => api_error_response(
            StatusCode::NOT_FOUND,
            ApiError::not_found(format!("order {id}")).with_request_id(&request_id),
        ),
        Err(err) => store_error_response(&err, &request_id),
    }
}

pub(crate) async fn order_fulfill_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let id = match parse_order_id(&id, &request_id) {
        Ok(id) => id,
        Err(resp) => return *resp,
    };
    match state
        .store
        .set_order_status(&id, OrderStatus::Fulfilled, unix_millis())
    {
        Ok(order) => {
            info!(order_id = %order.id, "order fulfilled");
            let resp = Json(OrderResponse::from(&order)).into_response();
            with_request_id(resp, &request_id)
        }
        Err(err) => store_error_response(&err, &request_id),
    }
}

/// Refund path: the gateway moves the money first, the order book
/// follows. A gateway failure leaves the order untouched.
pub(crate) async fn order_refund_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let id = match parse_order_id(&id, &request_id) {
        Ok(id) => id,
        Err(resp) => return *resp,
    };
    let order = match state.store.order_by_public_id(&id) {
        Ok(Some(order)) => order,
        Ok(None) => {
            return api_error_response(
                StatusCode::NOT_FOUND,
                ApiError::not_found(format!("order {id}")).with_request_id(&request_id),
            )
        }
        Err(err) => return store_error_response(&err, &request_id),
    };
    let Some(payment_ref) = order.payment_ref.clone() else {
        return api_error_response(
            StatusCode::CONFLICT,
            ApiError::conflict(format!("order {id} has no payment to refund"))
                .with_request_id(&request_id),
        );
    };
    if !order.status.can_transition_to(OrderStatus::Refunded) {
        return api_error_response(
            StatusCode::CONFLICT,
            ApiError::conflict(format!(
                "order {id} is {} and cannot be refunded",
                order.status.as_str()
            ))
            .with_request_id(&request_id),
        );
    }
    let refund = match state.payments.refund(&payment_ref).await {
        Ok(refund) => refund,
        Err(err) => {
            return api_error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::unavailable(format!("refund failed at the gateway: {err}"))
                    .with_request_id(&request_id),
            )
        }
    };
    match state
        .store
        .set_order_status(&id, OrderStatus::Refunded, unix_millis())
    {
        Ok(order) => {
            info!(
                order_id = %order.id,
                refunded_cents = refund.refunded_cents,
                "order refunded"
            );
            let resp = Json(OrderResponse::from(&order)).into_response();
            with_request_id(resp, &request_id)
        }
        Err(err) => store_error_response(&err, &request_id),
    }
}

pub(crate) async fn messages_list_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let paging = match parse_paging(&params, &["unresolved"]) {
        Ok(p) => p,
        Err(err) => {
            return api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id))
        }
    };
    let unresolved_only = bool_query_flag(&params, "unresolved");
    match state
        .store
        .list_contact_messages(unresolved_only, paging.limit, paging.offset)
    {
        Ok((messages, total)) => {
            let resp = Json(serde_json::json!({
                "messages": messages
                    .iter()
                    .map(ContactMessageResponse::from)
                    .collect::<Vec<_>>(),
                "total": total,
            }))
            .into_response();
            with_request_id(resp, &request_id)
        }
        Err(err) => store_error_response(&err, &request_id),
    }
}

pub(crate) async fn message_resolve_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    match state.store.resolve_contact_message(id) {
        Ok(true) => {
            let resp = Json(serde_json::json!({"resolved": true})).into_response();
            with_request_id(resp, &request_id)
        }
        Ok(false) => api_error_response(
            StatusCode::NOT_FOUND,
            ApiError::not_found(format!("contact message {id}")).with_request_id(&request_id),
        ),
        Err(err) => store_error_response(&err, &request_id),
    }
}

pub(crate) async fn subscribers_list_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let paging = match parse_paging(&params, &["status", "export"]) {
        Ok(p) => p,
        Err(err) => {
            return api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id))
        }
    };
    let status = match params.get("status") {
        None => None,
        Some(raw) => match SubscriberStatus::parse_str(raw) {
            Some(status) => Some(status),
            None => return bad_request(format!("unknown subscriber status {raw:?}"), &request_id),
        },
    };
    let (subscribers, total) = match state
        .store
        .list_subscribers(status, paging.limit, paging.offset)
    {
        Ok(rows) => rows,
        Err(err) => return store_error_response(&err, &request_id),
    };
    if params.get("export").map(String::as_str) == Some("csv") {
        let mut csv = String::from("email,status,created_at_ms\n");
        for s in &subscribers {
            csv.push_str(&format!(
                "{},{},{}\n",
                s.email,
                s.status.as_str(),
                s.created_at_ms
            ));
        }
        let mut resp = Response::new(Body::from(csv));
        resp.headers_mut().insert(
            "content-type",
            HeaderValue::from_static("text/csv; charset=utf-8"),
        );
        return with_request_id(resp, &request_id);
    }
    let resp = Json(serde_json::json!({
        "subscribers": subscribers
            .iter()
            .map(SubscriberResponse::from)
            .collect::<Vec<_>>(),
        "total": total,
    }))
    .into_response();
    with_request_id(resp, &request_id)
}

pub(crate) async fn close_runs_list_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let paging = match parse_paging(&params, &["include_superseded"]) {
        Ok(p) => p,
        Err(err) => {
            return api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id))
        }
    };
    let include_superseded = bool_query_flag(&params, "include_superseded");
    match state
        .store
        .list_close_runs(include_superseded, paging.limit, paging.offset)
    {
        Ok(runs) => {
            let resp = Json(serde_json::json!({
                "runs": runs
                    .iter()
                    .map(|run| CloseRunResponse::from_run(run, &[]))
                    .collect::<Vec<_>>(),
            }))
            .into_response();
            with_request_id(resp, &request_id)
        }
        Err(err) => store_error_response(&err, &request_id),
    }
}

pub(crate) async fn close_run_trigger_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CloseRunRequest>, JsonRejection>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_json(&rejection, &request_id),
    };
    let offset = state.config.close.utc_offset_minutes;
    let now_ms = unix_millis();
    let date = match &req.date {
        Some(raw) => match BusinessDate::parse(raw) {
            Ok(date) => date,
            Err(e) => return bad_request(format!("date: {e}"), &request_id),
        },
        None => {
            let Some(date) =
                BusinessDate::from_utc_millis(now_ms as i64, offset).and_then(|d| d.pred())
            else {
                return bad_request("cannot derive yesterday for this clock", &request_id);
            };
            date
        }
    };
    let job = match CloseJob::from_options(
        CloseOptions {
            date,
            source: CloseSource::Admin,
            force: req.force,
            utc_offset_minutes: offset,
        },
        now_ms,
    ) {
        Ok(job) => job,
        Err(err) => return bad_request(err.message, &request_id),
    };
    let summary_to = state
        .config
        .close
        .summary_to
        .as_deref()
        .and_then(|raw| EmailAddress::parse(raw).ok());
    let summary = summary_to.map(|to| SummaryMail {
        mailer: state.mailer.as_ref(),
        to,
    });
    match run_close(
        state.store.as_ref(),
        state.payments.as_ref(),
        summary.as_ref(),
        &job,
    )
    .await
    {
        Ok(report) => {
            state
                .metrics
                .observe_close(report.run.status.as_str())
                .await;
            let resp = Json(CloseRunResponse::from_run(&report.run, &report.discrepancies))
                .into_response();
            with_request_id(resp, &request_id)
        }
        Err(err) if err.code == CloseErrorCode::AlreadyClosed => api_error_response(
            StatusCode::CONFLICT,
            ApiError::conflict(err.message).with_request_id(&request_id),
        ),
        Err(err) if err.code == CloseErrorCode::Options => {
            bad_request(err.message, &request_id)
        }
        Err(_) => api_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::internal("close run failed").with_request_id(&request_id),
        ),
    }
}

pub(crate) async fn close_run_get_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(date): Path<String>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let date = match BusinessDate::parse(&date) {
        Ok(date) => date,
        Err(e) => return bad_request(format!("date: {e}"), &request_id),
    };
    let run = match state.store.close_run_live(date) {
        Ok(Some(run)) => run,
        Ok(None) => {
            return api_error_response(
                StatusCode::NOT_FOUND,
                ApiError::not_found(format!("no close run for {date}"))
                    .with_request_id(&request_id),
            )
        }
        Err(err) => return store_error_response(&err, &request_id),
    };
    let discrepancies = match state.store.close_run_discrepancies(run.id) {
        Ok(rows) => rows,
        Err(err) => return store_error_response(&err, &request_id),
    };
    let resp = Json(CloseRunResponse::from_run(&run, &discrepancies)).into_response();
    with_request_id(resp, &request_id)
}

pub(crate) async fn draft_create_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DraftRequest>, JsonRejection>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_json(&rejection, &request_id),
    };
    let slug = match ProductSlug::parse(&req.slug) {
        Ok(slug) => slug,
        Err(e) => return bad_request(format!("slug: {e}"), &request_id),
    };
    let Some(channel) = AdChannel::parse_str(&req.channel) else {
        return bad_request(format!("unknown channel {:?}", req.channel), &request_id);
    };
    match generate_draft(
        state.store.as_ref(),
        state.copy_model.as_ref(),
        &slug,
        channel,
        req.tone.as_deref(),
        unix_millis(),
    )
    .await
    {
        Ok(draft) => {
            let resp = (StatusCode::CREATED, Json(DraftResponse::from(&draft))).into_response();
            with_request_id(resp, &request_id)
        }
        Err(err) => {
            let (status, api_err) = match err.code {
                DraftErrorCode::Validation => (
                    StatusCode::BAD_REQUEST,
                    ApiError::bad_request(err.message, serde_json::json!({})),
                ),
                DraftErrorCode::NotFound => {
                    (StatusCode::NOT_FOUND, ApiError::not_found(err.message))
                }
                DraftErrorCode::Gateway | DraftErrorCode::Decode => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ApiError::unavailable(err.message),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::internal("draft generation failed"),
                ),
            };
            api_error_response(status, api_err.with_request_id(&request_id))
        }
    }
}

pub(crate) async fn drafts_list_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let paging = match parse_paging(&params, &["status"]) {
        Ok(p) => p,
        Err(err) => {
            return api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id))
        }
    };
    let status = match params.get("status") {
        None => None,
        Some(raw) => match DraftStatus::parse_str(raw) {
            Some(status) => Some(status),
            None => return bad_request(format!("unknown draft status {raw:?}"), &request_id),
        },
    };
    match state
        .store
        .list_ads_drafts(status, paging.limit, paging.offset)
    {
        Ok((drafts, total)) => {
            let resp = Json(serde_json::json!({
                "drafts": drafts.iter().map(DraftResponse::from).collect::<Vec<_>>(),
                "total": total,
            }))
            .into_response();
            with_request_id(resp, &request_id)
        }
        Err(err) => store_error_response(&err, &request_id),
    }
}

pub(crate) async fn draft_review_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<DraftReviewRequest>, JsonRejection>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_json(&rejection, &request_id),
    };
    let decision = match req.decision {
        ReviewDecision::Approved => DraftStatus::Approved,
        ReviewDecision::Rejected => DraftStatus::Rejected,
    };
    match state.store.review_ads_draft(id, decision, unix_millis()) {
        Ok(draft) => {
            info!(draft_id = draft.id, decision = decision.as_str(), "ads draft reviewed");
            let resp = Json(DraftResponse::from(&draft)).into_response();
            with_request_id(resp, &request_id)
        }
        Err(err) => store_error_response(&err, &request_id),
    }
}
