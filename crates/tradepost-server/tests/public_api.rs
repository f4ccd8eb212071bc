// SPDX-License-Identifier: Apache-2.0

//! End-to-end checks of the public surface over a real listener: raw
//! HTTP in, status/headers/body out.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tradepost_core::unix_millis;
use tradepost_gateways::{webhook, FakeCopyModel, FakeMailer, FakePaymentGateway};
use tradepost_model::{Currency, Product, ProductSlug};
use tradepost_server::{build_router, AppState, ServerConfig};
use tradepost_store::Store;

const WEBHOOK_SECRET: &str = "whsec_test";

struct TestShop {
    addr: std::net::SocketAddr,
    state: AppState,
    payments: Arc<FakePaymentGateway>,
    mailer: Arc<FakeMailer>,
}

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.webhook.enabled = true;
    config.webhook.secret = WEBHOOK_SECRET.to_string();
    config.admin.enabled = true;
    config.admin.api_keys = vec!["ak_test".to_string()];
    // Generous default so ordinary tests never trip the limiter.
    config.rate_limit_per_ip.capacity = 1_000.0;
    config.rate_limit_per_ip.refill_per_sec = 1_000.0;
    config
}

async fn spawn_shop(config: ServerConfig) -> TestShop {
    let store = Store::open_in_memory(unix_millis()).expect("open store");
    spawn_shop_with_store(config, store).await
}

async fn spawn_shop_with_store(config: ServerConfig, store: Store) -> TestShop {
    let payments = Arc::new(FakePaymentGateway::new());
    let mailer = Arc::new(FakeMailer::new());
    let copy_model = Arc::new(FakeCopyModel::new());
    let state = AppState::new(
        config,
        store,
        payments.clone(),
        mailer.clone(),
        copy_model,
    );
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .expect("serve app")
    });
    TestShop {
        addr,
        state,
        payments,
        mailer,
    }
}

fn seed_product(state: &AppState, slug: &str, price_cents: i64, active: bool) {
    state
        .store
        .upsert_product(&Product {
            slug: ProductSlug::parse(slug).expect("slug"),
            name: format!("Product {slug}"),
            description: "A seeded product.".to_string(),
            price_cents,
            currency: Currency::Usd,
            image_url: None,
            active,
            position: 0,
            created_at_ms: 1,
            updated_at_ms: 1,
        })
        .expect("seed product");
}

async fn send_request(
    addr: std::net::SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (u16, String, String) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (k, v) in headers {
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    if let Some(body) = body {
        if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
            req.push_str("Content-Type: application/json\r\n");
        }
        req.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    } else {
        req.push_str("\r\n");
    }
    stream.write_all(req.as_bytes()).await.expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    (status, head.to_string(), body.to_string())
}

async fn get(addr: std::net::SocketAddr, path: &str) -> (u16, String, String) {
    send_request(addr, "GET", path, &[], None).await
}

async fn post_json(addr: std::net::SocketAddr, path: &str, body: &str) -> (u16, String, String) {
    send_request(addr, "POST", path, &[], Some(body)).await
}

#[tokio::test]
async fn plumbing_routes_answer() {
    let shop = spawn_shop(test_config()).await;

    let (status, headers, body) = get(shop.addr, "/healthz").await;
    assert_eq!(status, 200);
    assert!(headers.contains("x-request-id: "));
    assert_eq!(body, r#"{"status":"ok"}"#);

    let (status, _, body) = get(shop.addr, "/readyz").await;
    assert_eq!(status, 200);
    assert_eq!(body, "ready");

    let (status, _, body) = get(shop.addr, "/version").await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).expect("version json");
    assert_eq!(json["name"], "tradepost-server");

    let (status, _, body) = get(shop.addr, "/v1/openapi.json").await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).expect("openapi json");
    assert!(json["paths"]["/v1/checkout"].is_object());

    let (status, _, body) = get(shop.addr, "/").await;
    assert_eq!(status, 200);
    assert!(body.contains("<h1>Tradepost</h1>"));

    let (status, _, body) = get(shop.addr, "/metrics").await;
    assert_eq!(status, 200);
    assert!(body.contains("tradepost_requests_total"));
}

#[tokio::test]
async fn products_are_public_active_only_with_etag() {
    let shop = spawn_shop(test_config()).await;
    seed_product(&shop.state, "enamel-mug", 1_800, true);
    seed_product(&shop.state, "retired-poster", 900, false);

    let (status, headers, body) = get(shop.addr, "/v1/products").await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).expect("products json");
    assert_eq!(json["total"], 1);
    assert_eq!(json["products"][0]["slug"], "enamel-mug");
    assert!(headers.contains("cache-control: public, max-age="));

    let etag = headers
        .lines()
        .find_map(|line| line.strip_prefix("etag: "))
        .expect("etag header")
        .to_string();
    let (status, _, _) =
        send_request(shop.addr, "GET", "/v1/products", &[("If-None-Match", &etag)], None).await;
    assert_eq!(status, 304);

    // Typoed filters fail loudly.
    let (status, _, _) = get(shop.addr, "/v1/products?limitt=5").await;
    assert_eq!(status, 400);

    let (status, _, _) = get(shop.addr, "/v1/products/enamel-mug").await;
    assert_eq!(status, 200);
    let (status, _, _) = get(shop.addr, "/v1/products/retired-poster").await;
    assert_eq!(status, 404);
    let (status, _, _) = get(shop.addr, "/v1/products/Not%20A%20Slug").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn checkout_creates_an_order_and_replays_on_the_same_key() {
    let shop = spawn_shop(test_config()).await;
    seed_product(&shop.state, "enamel-mug", 1_800, true);

    let body = r#"{"email":"buyer@example.com","items":[{"slug":"enamel-mug","quantity":2}],"idempotency_key":"ck_1"}"#;
    let (status, _, resp) = post_json(shop.addr, "/v1/checkout", body).await;
    assert_eq!(status, 201);
    let json: serde_json::Value = serde_json::from_str(&resp).expect("checkout json");
    assert_eq!(json["status"], "pending");
    assert_eq!(json["total_cents"], 3_600);
    assert_eq!(json["payment_ref"], "pi_fake_0001");
    let order_id = json["order_id"].as_str().expect("order id").to_string();
    assert!(json["checkout_url"]
        .as_str()
        .expect("checkout url")
        .contains(&order_id));

    // Same key: same order, no second payment session.
    let (status, _, resp) = post_json(shop.addr, "/v1/checkout", body).await;
    assert_eq!(status, 200);
    let replay: serde_json::Value = serde_json::from_str(&resp).expect("replay json");
    assert_eq!(replay["order_id"], order_id.as_str());
    assert_eq!(replay["payment_ref"], "pi_fake_0001");
}

#[tokio::test]
async fn checkout_rejects_bad_requests() {
    let shop = spawn_shop(test_config()).await;
    seed_product(&shop.state, "enamel-mug", 1_800, true);
    seed_product(&shop.state, "retired-poster", 900, false);

    for body in [
        r#"{"email":"not-an-email","items":[{"slug":"enamel-mug","quantity":1}]}"#,
        r#"{"email":"a@b.co","items":[]}"#,
        r#"{"email":"a@b.co","items":[{"slug":"no-such-thing","quantity":1}]}"#,
        r#"{"email":"a@b.co","items":[{"slug":"retired-poster","quantity":1}]}"#,
        r#"{"email":"a@b.co","items":[{"slug":"enamel-mug","quantity":0}]}"#,
        r#"{"email":"a@b.co","coupon":"SAVE10","items":[{"slug":"enamel-mug","quantity":1}]}"#,
    ] {
        let (status, _, resp) = post_json(shop.addr, "/v1/checkout", body).await;
        assert_eq!(status, 400, "expected 400 for {body}: {resp}");
        let json: serde_json::Value = serde_json::from_str(&resp).expect("error json");
        assert_eq!(json["code"], "bad_request");
    }
}

#[tokio::test]
async fn checkout_survives_a_gateway_outage() {
    let shop = spawn_shop(test_config()).await;
    seed_product(&shop.state, "enamel-mug", 1_800, true);
    shop.payments.fail_next_call();

    let body = r#"{"email":"buyer@example.com","items":[{"slug":"enamel-mug","quantity":1}],"idempotency_key":"ck_outage"}"#;
    let (status, _, resp) = post_json(shop.addr, "/v1/checkout", body).await;
    assert_eq!(status, 503);
    let json: serde_json::Value = serde_json::from_str(&resp).expect("error json");
    assert_eq!(json["code"], "unavailable");

    // The order exists pending; the retry replays it instead of duplicating.
    let (status, _, resp) = post_json(shop.addr, "/v1/checkout", body).await;
    assert_eq!(status, 200);
    let replay: serde_json::Value = serde_json::from_str(&resp).expect("replay json");
    assert_eq!(replay["status"], "pending");
}

#[tokio::test]
async fn newsletter_double_opt_in_lifecycle() {
    let shop = spawn_shop(test_config()).await;

    let (status, _, resp) =
        post_json(shop.addr, "/v1/newsletter/subscribe", r#"{"email":"reader@example.com"}"#).await;
    assert_eq!(status, 202);
    let json: serde_json::Value = serde_json::from_str(&resp).expect("subscribe json");
    assert_eq!(json["status"], "pending");

    let sent = shop.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.contains("Confirm"));
    let token = sent[0]
        .text
        .split("token=")
        .nth(1)
        .expect("token in mail")
        .split_whitespace()
        .next()
        .expect("token value")
        .to_string();

    let (status, _, resp) =
        get(shop.addr, &format!("/v1/newsletter/confirm?token={token}")).await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&resp).expect("confirm json");
    assert_eq!(json["status"], "confirmed");

    // Confirming again is idempotent.
    let (status, _, _) = get(shop.addr, &format!("/v1/newsletter/confirm?token={token}")).await;
    assert_eq!(status, 200);

    let (status, _, resp) =
        get(shop.addr, &format!("/v1/newsletter/unsubscribe?token={token}")).await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&resp).expect("unsubscribe json");
    assert_eq!(json["status"], "unsubscribed");

    // Unsubscribed addresses never come back through signup, and no new
    // confirmation mail goes out.
    let (status, _, _) =
        post_json(shop.addr, "/v1/newsletter/subscribe", r#"{"email":"reader@example.com"}"#).await;
    assert_eq!(status, 202);
    assert_eq!(shop.mailer.sent().len(), 1);
    let (status, _, _) = get(shop.addr, &format!("/v1/newsletter/confirm?token={token}")).await;
    assert_eq!(status, 409);

    let (status, _, _) = get(shop.addr, "/v1/newsletter/confirm?token=bogus").await;
    assert_eq!(status, 404);
    let (status, _, _) = get(shop.addr, "/v1/newsletter/confirm").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn contact_stores_messages_and_drops_honeypot_hits() {
    let shop = spawn_shop(test_config()).await;

    let (status, _, _) = post_json(
        shop.addr,
        "/v1/contact",
        r#"{"name":"Ada","email":"ada@example.com","message":"Where is my mug?"}"#,
    )
    .await;
    assert_eq!(status, 202);
    let (messages, total) = shop.state.store.list_contact_messages(true, 10, 0).expect("list");
    assert_eq!(total, 1);
    assert_eq!(messages[0].name, "Ada");
    // The shop inbox heard about it.
    assert_eq!(shop.mailer.sent().len(), 1);

    let (status, _, resp) = post_json(
        shop.addr,
        "/v1/contact",
        r#"{"name":"Bot","email":"bot@example.com","message":"spam","website":"spam.example"}"#,
    )
    .await;
    assert_eq!(status, 202);
    let json: serde_json::Value = serde_json::from_str(&resp).expect("contact json");
    assert_eq!(json["received"], true);
    let (_, total) = shop.state.store.list_contact_messages(false, 10, 0).expect("list");
    assert_eq!(total, 1);
}

#[tokio::test]
async fn burst_traffic_gets_rate_limited_with_a_retry_hint() {
    let mut config = test_config();
    config.rate_limit_per_ip.capacity = 2.0;
    config.rate_limit_per_ip.refill_per_sec = 0.5;
    let shop = spawn_shop(config).await;

    let body = r#"{"email":"reader@example.com"}"#;
    for _ in 0..2 {
        let (status, _, _) = post_json(shop.addr, "/v1/newsletter/subscribe", body).await;
        assert_eq!(status, 202);
    }
    let (status, headers, resp) = post_json(shop.addr, "/v1/newsletter/subscribe", body).await;
    assert_eq!(status, 429);
    assert!(headers.contains("retry-after: "));
    let json: serde_json::Value = serde_json::from_str(&resp).expect("error json");
    assert_eq!(json["code"], "rate_limited");
    assert!(json["details"]["retry_after_secs"].as_u64().expect("hint") >= 1);
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_dodge_the_limiter() {
    let mut config = test_config();
    config.rate_limit_per_ip.capacity = 2.0;
    config.rate_limit_per_ip.refill_per_sec = 0.5;
    let shop = spawn_shop(config).await;

    // The header is client-controlled; buckets key on the peer address.
    let body = r#"{"email":"reader@example.com"}"#;
    let mut statuses = Vec::new();
    for n in 0..5 {
        let forged = format!("203.0.113.{n}");
        let (status, _, _) = send_request(
            shop.addr,
            "POST",
            "/v1/newsletter/subscribe",
            &[("x-forwarded-for", &forged)],
            Some(body),
        )
        .await;
        statuses.push(status);
    }
    assert_eq!(&statuses[..2], &[202, 202]);
    assert!(statuses[2..].iter().all(|s| *s == 429));
}

#[tokio::test]
async fn unknown_paths_share_one_metrics_label() {
    let shop = spawn_shop(test_config()).await;

    for n in 0..10 {
        let (status, _, _) = get(shop.addr, &format!("/scanned-path-{n}")).await;
        assert_eq!(status, 404);
    }
    let (status, _, body) = get(shop.addr, "/metrics").await;
    assert_eq!(status, 200);
    assert!(!body.contains("scanned-path"));
    assert!(body.contains("tradepost_requests_total{route=\"unmatched\",status=\"404\"} 10"));
}

async fn checkout_paid_order(shop: &TestShop, key: &str) -> (String, String) {
    let body = format!(
        r#"{{"email":"buyer@example.com","items":[{{"slug":"enamel-mug","quantity":1}}],"idempotency_key":"{key}"}}"#
    );
    let (status, _, resp) = post_json(shop.addr, "/v1/checkout", &body).await;
    assert_eq!(status, 201);
    let json: serde_json::Value = serde_json::from_str(&resp).expect("checkout json");
    (
        json["order_id"].as_str().expect("order id").to_string(),
        json["payment_ref"].as_str().expect("payment ref").to_string(),
    )
}

fn succeeded_event(event_id: &str, payment_ref: &str, amount_cents: i64) -> String {
    serde_json::json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "data": {"object": {"id": payment_ref, "amount": amount_cents}}
    })
    .to_string()
}

async fn post_signed_webhook(
    addr: std::net::SocketAddr,
    body: &str,
) -> (u16, String, String) {
    let header = webhook::sign(WEBHOOK_SECRET, unix_millis() / 1_000, body.as_bytes());
    send_request(
        addr,
        "POST",
        "/v1/webhooks/stripe",
        &[("stripe-signature", &header)],
        Some(body),
    )
    .await
}

#[tokio::test]
async fn webhook_pays_orders_and_dedupes_replays() {
    let shop = spawn_shop(test_config()).await;
    seed_product(&shop.state, "enamel-mug", 1_800, true);
    let (order_id, payment_ref) = checkout_paid_order(&shop, "ck_wh1").await;

    let event = succeeded_event("evt_1", &payment_ref, 1_800);
    let (status, _, resp) = post_signed_webhook(shop.addr, &event).await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&resp).expect("ack json");
    assert_eq!(json["outcome"], "applied");
    assert_eq!(json["duplicate"], false);

    let order = shop
        .state
        .store
        .order_by_public_id(&tradepost_model::OrderId::parse(&order_id).expect("order id"))
        .expect("load order")
        .expect("order exists");
    assert_eq!(order.status.as_str(), "paid");
    assert!(order.paid_at_ms.is_some());
    // The buyer got a receipt.
    let receipts: Vec<_> = shop
        .mailer
        .sent()
        .into_iter()
        .filter(|m| m.subject.contains("Receipt"))
        .collect();
    assert_eq!(receipts.len(), 1);

    // Same event id again: acked as a duplicate, no second receipt.
    let (status, _, resp) = post_signed_webhook(shop.addr, &event).await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&resp).expect("ack json");
    assert_eq!(json["duplicate"], true);
    assert_eq!(json["outcome"], "applied");
    assert_eq!(
        shop.mailer
            .sent()
            .into_iter()
            .filter(|m| m.subject.contains("Receipt"))
            .count(),
        1
    );

    // A different event trying the same transition conflicts but is acked.
    let replayed = succeeded_event("evt_2", &payment_ref, 1_800);
    let (status, _, resp) = post_signed_webhook(shop.addr, &replayed).await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&resp).expect("ack json");
    assert_eq!(json["outcome"], "conflict");

    // Refund event moves the order on.
    let refund = serde_json::json!({
        "id": "evt_3",
        "type": "charge.refunded",
        "data": {"object": {"id": "ch_1", "payment_intent": payment_ref, "amount_refunded": 1_800}}
    })
    .to_string();
    let (status, _, resp) = post_signed_webhook(shop.addr, &refund).await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&resp).expect("ack json");
    assert_eq!(json["outcome"], "applied");
}

#[tokio::test]
async fn webhook_rejects_forgeries_and_acks_noise() {
    let shop = spawn_shop(test_config()).await;

    let event = succeeded_event("evt_x", "pi_unknown", 500);
    let (status, _, _) =
        send_request(shop.addr, "POST", "/v1/webhooks/stripe", &[], Some(&event)).await;
    assert_eq!(status, 400);

    let header = webhook::sign("whsec_wrong", unix_millis() / 1_000, event.as_bytes());
    let (status, _, _) = send_request(
        shop.addr,
        "POST",
        "/v1/webhooks/stripe",
        &[("stripe-signature", &header)],
        Some(&event),
    )
    .await;
    assert_eq!(status, 400);

    // Stale timestamp.
    let header = webhook::sign(WEBHOOK_SECRET, unix_millis() / 1_000 - 4_000, event.as_bytes());
    let (status, _, _) = send_request(
        shop.addr,
        "POST",
        "/v1/webhooks/stripe",
        &[("stripe-signature", &header)],
        Some(&event),
    )
    .await;
    assert_eq!(status, 400);

    // Valid signature, unknown payment ref: acked unmatched.
    let (status, _, resp) = post_signed_webhook(shop.addr, &event).await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&resp).expect("ack json");
    assert_eq!(json["outcome"], "unmatched");

    // Uninteresting event types are acked and ignored.
    let noise = serde_json::json!({
        "id": "evt_noise",
        "type": "customer.created",
        "data": {"object": {"id": "cus_1"}}
    })
    .to_string();
    let (status, _, resp) = post_signed_webhook(shop.addr, &noise).await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&resp).expect("ack json");
    assert_eq!(json["outcome"], "ignored");
}

#[tokio::test]
async fn webhook_route_is_dark_when_disabled() {
    let mut config = test_config();
    config.webhook.enabled = false;
    config.webhook.secret = String::new();
    let shop = spawn_shop(config).await;

    let event = succeeded_event("evt_1", "pi_1", 500);
    let header = webhook::sign(WEBHOOK_SECRET, unix_millis() / 1_000, event.as_bytes());
    let (status, _, _) = send_request(
        shop.addr,
        "POST",
        "/v1/webhooks/stripe",
        &[("stripe-signature", &header)],
        Some(&event),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn orders_survive_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("tradepost.db");

    let store = Store::open(&db_path, unix_millis()).expect("open store");
    let shop = spawn_shop_with_store(test_config(), store).await;
    seed_product(&shop.state, "enamel-mug", 1_800, true);
    let body = r#"{"email":"buyer@example.com","items":[{"slug":"enamel-mug","quantity":1}],"idempotency_key":"ck_restart"}"#;
    let (status, _, resp) = post_json(shop.addr, "/v1/checkout", body).await;
    assert_eq!(status, 201);
    let order_id = serde_json::from_str::<serde_json::Value>(&resp).expect("checkout json")
        ["order_id"]
        .as_str()
        .expect("order id")
        .to_string();

    // A second instance over the same file sees the order book.
    let store = Store::open(&db_path, unix_millis()).expect("reopen store");
    let reopened = spawn_shop_with_store(test_config(), store).await;
    let order = reopened
        .state
        .store
        .order_by_public_id(&tradepost_model::OrderId::parse(&order_id).expect("order id"))
        .expect("load order")
        .expect("order survives");
    assert_eq!(order.total_cents, 1_800);
    let (status, _, body) = get(reopened.addr, "/v1/products").await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).expect("products json");
    assert_eq!(json["total"], 1);
}

#[tokio::test]
async fn oversized_uris_are_rejected() {
    let shop = spawn_shop(test_config()).await;
    let long = "x".repeat(4_096);
    let (status, _, _) = get(shop.addr, &format!("/v1/products?limit={long}")).await;
    assert_eq!(status, 400);
}
