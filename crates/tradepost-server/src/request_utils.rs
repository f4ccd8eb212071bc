// SPDX-License-Identifier: Apache-2.0

//! Shared request plumbing: request-id propagation, the JSON error
//! shape, conditional caching, response compression, paging, and the
//! security middleware that fronts every route.

use crate::AppState;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use brotli::CompressorWriter;
use flate2::{write::GzEncoder, Compression};
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::info;
use tradepost_api::ApiError;

pub(crate) fn make_request_id(state: &AppState) -> String {
    let id = state.request_id_seed.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:016x}")
}

pub(crate) fn propagated_request_id(headers: &HeaderMap, state: &AppState) -> String {
    if let Some(raw) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() && trimmed.len() <= 128 {
            return trimmed.to_string();
        }
    }
    if let Some(raw) = headers.get("traceparent").and_then(|v| v.to_str().ok()) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() && trimmed.len() <= 128 {
            return format!("trace-{trimmed}");
        }
    }
    make_request_id(state)
}

pub(crate) fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(v) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", v);
    }
    response
}

pub(crate) fn api_error_response(status: StatusCode, err: ApiError) -> Response {
    (status, Json(err)).into_response()
}

pub(crate) fn if_none_match(headers: &HeaderMap) -> Option<String> {
    headers
        .get("if-none-match")
        .and_then(|v| v.to_str().ok())
        .map(std::string::ToString::to_string)
}

pub(crate) fn put_cache_headers(headers: &mut HeaderMap, ttl: Duration, etag: &str) {
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", ttl.as_secs())) {
        headers.insert("cache-control", value);
    }
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert("etag", value);
    }
}

pub(crate) fn accepted_encoding(headers: &HeaderMap) -> Option<&'static str> {
    let accept = headers
        .get("accept-encoding")
        .and_then(|v| v.to_str().ok())?;
    if accept.contains("br") {
        Some("br")
    } else if accept.contains("gzip") {
        Some("gzip")
    } else {
        None
    }
}

pub(crate) fn maybe_compress_response(
    headers: &HeaderMap,
    state: &AppState,
    bytes: Vec<u8>,
) -> Result<(Vec<u8>, Option<&'static str>), ApiError> {
    let limits = &state.config.limits;
    if !limits.enable_response_compression || bytes.len() < limits.compression_min_bytes {
        return Ok((bytes, None));
    }
    match accepted_encoding(headers) {
        Some("gzip") => {
            let mut encoder = GzEncoder::new(
                Vec::with_capacity((bytes.len() / 2).max(256)),
                Compression::fast(),
            );
            encoder
                .write_all(&bytes)
                .map_err(|e| ApiError::internal(format!("gzip encoding failed: {e}")))?;
            let compressed = encoder
                .finish()
                .map_err(|e| ApiError::internal(format!("gzip finalize failed: {e}")))?;
            Ok((compressed, Some("gzip")))
        }
        Some("br") => {
            let mut compressed = Vec::with_capacity((bytes.len() / 2).max(256));
            {
                let mut writer = CompressorWriter::new(&mut compressed, 4096, 4, 22);
                writer
                    .write_all(&bytes)
                    .map_err(|e| ApiError::internal(format!("brotli encoding failed: {e}")))?;
            }
            Ok((compressed, Some("br")))
        }
        _ => Ok((bytes, None)),
    }
}

pub(crate) fn normalized_header_value(
    headers: &HeaderMap,
    key: &str,
    max_len: usize,
) -> Option<String> {
    let raw = headers.get(key)?.to_str().ok()?.trim();
    if raw.is_empty() || raw.len() > max_len {
        return None;
    }
    Some(raw.to_string())
}

pub(crate) fn normalized_forwarded_for(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = raw.split(',').next()?.trim();
    if first.is_empty() || first.len() > 64 {
        return None;
    }
    if first
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b':' || b == b'-')
    {
        Some(first.to_string())
    } else {
        None
    }
}

/// Rate-limit and audit key for a request. The forwarded header is
/// client-controlled, so it only counts when the deployment declares a
/// proxy in front that overwrites it; otherwise the peer address wins.
pub(crate) fn client_key(
    peer: Option<SocketAddr>,
    headers: &HeaderMap,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        if let Some(forwarded) = normalized_forwarded_for(headers) {
            return forwarded;
        }
    }
    peer.map_or_else(|| "unknown".to_string(), |p| p.ip().to_string())
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Paging {
    pub limit: u32,
    pub offset: u32,
}

pub(crate) const PAGE_LIMIT_DEFAULT: u32 = 50;
pub(crate) const PAGE_LIMIT_MAX: u32 = 100;

/// Parses `limit`/`offset` and rejects any query key outside
/// `extra_keys`. Typos in filter names fail loudly instead of silently
/// returning the unfiltered list.
pub(crate) fn parse_paging(
    params: &HashMap<String, String>,
    extra_keys: &[&str],
) -> Result<Paging, ApiError> {
    for key in params.keys() {
        if key != "limit" && key != "offset" && !extra_keys.contains(&key.as_str()) {
            return Err(ApiError::bad_request(
                format!("unknown query parameter {key:?}"),
                serde_json::json!({"parameter": key}),
            ));
        }
    }
    let limit = match params.get("limit") {
        None => PAGE_LIMIT_DEFAULT,
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|n| (1..=PAGE_LIMIT_MAX).contains(n))
            .ok_or_else(|| {
                ApiError::bad_request(
                    format!("limit must be 1..={PAGE_LIMIT_MAX}"),
                    serde_json::json!({"limit": raw}),
                )
            })?,
    };
    let offset = match params.get("offset") {
        None => 0,
        Some(raw) => raw.parse::<u32>().map_err(|_| {
            ApiError::bad_request(
                "offset must be a non-negative integer",
                serde_json::json!({"offset": raw}),
            )
        })?,
    };
    Ok(Paging { limit, offset })
}

pub(crate) fn bool_query_flag(params: &HashMap<String, String>, name: &str) -> bool {
    params
        .get(name)
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Runs ahead of every route: caps URI and header sizes, guards the
/// admin surface with the api-key allowlist, and writes the audit line
/// once the response exists.
pub(crate) async fn security_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let uri_text = req.uri().to_string();
    if uri_text.len() > state.config.limits.max_uri_bytes {
        let err = ApiError::bad_request(
            "request URI too large",
            serde_json::json!({
                "max_uri_bytes": state.config.limits.max_uri_bytes,
                "actual": uri_text.len()
            }),
        );
        return api_error_response(StatusCode::BAD_REQUEST, err);
    }
    let header_bytes: usize = req
        .headers()
        .iter()
        .map(|(k, v)| k.as_str().len() + v.as_bytes().len())
        .sum();
    if header_bytes > state.config.limits.max_header_bytes {
        let err = ApiError::bad_request(
            "request headers too large",
            serde_json::json!({
                "max_header_bytes": state.config.limits.max_header_bytes,
                "actual": header_bytes
            }),
        );
        return api_error_response(StatusCode::BAD_REQUEST, err);
    }

    let path = req.uri().path().to_string();
    if path.starts_with("/v1/admin/") || path == "/v1/admin" {
        if !state.config.admin.enabled {
            return api_error_response(
                StatusCode::NOT_FOUND,
                ApiError::not_found("no such route"),
            );
        }
        let presented = normalized_header_value(req.headers(), "x-api-key", 256);
        let allowed = presented
            .as_deref()
            .is_some_and(|key| state.config.admin.api_keys.iter().any(|k| k == key));
        if !allowed {
            return api_error_response(
                StatusCode::UNAUTHORIZED,
                ApiError::unauthorized("admin api key missing or invalid"),
            );
        }
    }

    let started = Instant::now();
    let method = req.method().clone();
    let request_id = normalized_header_value(req.headers(), "x-request-id", 128)
        .unwrap_or_default();
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|c| c.0);
    let client_ip = client_key(
        peer,
        req.headers(),
        state.config.rate_limit_per_ip.trust_forwarded_for,
    );
    let resp = next.run(req).await;
    info!(
        target: "tradepost_audit",
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        request_id = %request_id,
        client_ip = %client_ip,
        latency_ms = started.elapsed().as_millis() as u64,
        "audit"
    );
    resp
}
