// SPDX-License-Identifier: Apache-2.0

use serde_json::{json, Value};

/// Machine-readable description of the v1 surface, served at
/// `/v1/openapi.json`. Hand-maintained; the route contract test keeps it
/// honest against the router.
#[must_use]
pub fn openapi_v1_spec() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "tradepost",
            "description": "Storefront API: catalog, checkout, newsletter, contact, payment webhooks, and the admin surface.",
            "version": env!("CARGO_PKG_VERSION")
        },
        "paths": {
            "/healthz": {"get": {"summary": "Liveness probe"}},
            "/readyz": {"get": {"summary": "Readiness probe; 503 while draining or the store is unreachable"}},
            "/version": {"get": {"summary": "Build name and version"}},
            "/metrics": {"get": {"summary": "Prometheus text metrics"}},
            "/v1/openapi.json": {"get": {"summary": "This document"}},
            "/v1/products": {"get": {
                "summary": "Active catalog, ordered by position",
                "parameters": [
                    {"name": "limit", "in": "query", "schema": {"type": "integer", "maximum": 100}},
                    {"name": "offset", "in": "query", "schema": {"type": "integer"}}
                ]
            }},
            "/v1/products/{slug}": {"get": {"summary": "One active product; 404 for unknown or archived slugs"}},
            "/v1/checkout": {"post": {
                "summary": "Create an order and a payment session",
                "responses": {
                    "201": {"description": "Order created, checkout URL attached"},
                    "200": {"description": "Idempotency-key replay of an earlier order"},
                    "503": {"description": "Payment gateway unavailable; order stays pending"}
                }
            }},
            "/v1/newsletter/subscribe": {"post": {"summary": "Double-opt-in signup; always 202"}},
            "/v1/newsletter/confirm": {"get": {
                "summary": "Confirm a subscription",
                "parameters": [{"name": "token", "in": "query", "required": true, "schema": {"type": "string"}}]
            }},
            "/v1/newsletter/unsubscribe": {"get": {
                "summary": "Unsubscribe; idempotent",
                "parameters": [{"name": "token", "in": "query", "required": true, "schema": {"type": "string"}}]
            }},
            "/v1/contact": {"post": {"summary": "Contact form intake; always 202"}},
            "/v1/webhooks/stripe": {"post": {"summary": "Signed payment events; signature verified before parsing"}},
            "/v1/admin/products": {
                "get": {"summary": "Full catalog including archived rows"},
                "post": {"summary": "Create or update a product"}
            },
            "/v1/admin/products/{slug}": {"put": {"summary": "Update a product by slug"}},
            "/v1/admin/products/{slug}/archive": {"post": {"summary": "Hide a product from the storefront"}},
            "/v1/admin/orders": {"get": {"summary": "Orders with status/date filters"}},
            "/v1/admin/orders/{id}": {"get": {"summary": "One order with its lines"}},
            "/v1/admin/orders/{id}/fulfill": {"post": {"summary": "Mark a paid order fulfilled"}},
            "/v1/admin/orders/{id}/refund": {"post": {"summary": "Refund via the gateway, then transition"}},
            "/v1/admin/messages": {"get": {"summary": "Contact inbox"}},
            "/v1/admin/messages/{id}/resolve": {"post": {"summary": "Mark a message handled"}},
            "/v1/admin/subscribers": {"get": {"summary": "Newsletter roster with status filter"}},
            "/v1/admin/close-runs": {
                "get": {"summary": "Daily close history"},
                "post": {"summary": "Trigger a close for a date"}
            },
            "/v1/admin/close-runs/{date}": {"get": {"summary": "The live run for a date with its discrepancies"}},
            "/v1/admin/ads-drafts": {
                "get": {"summary": "Generated ad copy awaiting review"},
                "post": {"summary": "Generate a draft for a product and channel"}
            },
            "/v1/admin/ads-drafts/{id}/review": {"post": {"summary": "Approve or reject a draft; single-shot"}}
        },
        "components": {
            "securitySchemes": {
                "adminKey": {"type": "apiKey", "in": "header", "name": "x-api-key"}
            }
        }
    })
}
