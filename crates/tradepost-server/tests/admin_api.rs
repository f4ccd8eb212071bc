// SPDX-License-Identifier: Apache-2.0

//! The key-guarded admin surface: catalog management, the order book,
//! messages, subscribers, close runs, and ads drafts.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tradepost_core::unix_millis;
use tradepost_gateways::{FakeCopyModel, FakeMailer, FakePaymentGateway};
use tradepost_model::{Currency, EmailAddress, OrderId, OrderStatus, Product, ProductSlug};
use tradepost_server::{build_router, AppState, ServerConfig};
use tradepost_store::Store;

const API_KEY: &str = "ak_test";

struct TestShop {
    addr: std::net::SocketAddr,
    state: AppState,
    payments: Arc<FakePaymentGateway>,
    copy_model: Arc<FakeCopyModel>,
}

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.admin.enabled = true;
    config.admin.api_keys = vec![API_KEY.to_string()];
    config.rate_limit_per_ip.capacity = 1_000.0;
    config.rate_limit_per_ip.refill_per_sec = 1_000.0;
    config
}

async fn spawn_shop(config: ServerConfig) -> TestShop {
    let store = Store::open_in_memory(unix_millis()).expect("open store");
    let payments = Arc::new(FakePaymentGateway::new());
    let mailer = Arc::new(FakeMailer::new());
    let copy_model = Arc::new(FakeCopyModel::new());
    let state = AppState::new(config, store, payments.clone(), mailer, copy_model.clone());
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
        copy_model,
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
        req.push_str("Content-Type: application/json\r\n");
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

async fn admin_get(addr: std::net::SocketAddr, path: &str) -> (u16, String, String) {
    send_request(addr, "GET", path, &[("x-api-key", API_KEY)], None).await
}

async fn admin_send(
    addr: std::net::SocketAddr,
    method: &str,
    path: &str,
    body: &str,
) -> (u16, String, String) {
    send_request(addr, method, path, &[("x-api-key", API_KEY)], Some(body)).await
}

fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).expect("json body")
}

#[tokio::test]
async fn admin_routes_demand_a_valid_key() {
    let shop = spawn_shop(test_config()).await;

    let (status, _, body) = send_request(shop.addr, "GET", "/v1/admin/orders", &[], None).await;
    assert_eq!(status, 401);
    assert_eq!(json(&body)["code"], "unauthorized");

    let (status, _, _) = send_request(
        shop.addr,
        "GET",
        "/v1/admin/orders",
        &[("x-api-key", "ak_wrong")],
        None,
    )
    .await;
    assert_eq!(status, 401);

    let (status, _, _) = admin_get(shop.addr, "/v1/admin/orders").await;
    assert_eq!(status, 200);

    // The key never unlocks anything while admin is switched off.
    let mut config = test_config();
    config.admin.enabled = false;
    config.admin.api_keys.clear();
    let dark = spawn_shop(config).await;
    let (status, _, _) = admin_get(dark.addr, "/v1/admin/orders").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn product_create_update_archive() {
    let shop = spawn_shop(test_config()).await;

    let create = r#"{"slug":"walnut-board","name":"Walnut board","description":"End-grain.","price_cents":6100,"currency":"usd"}"#;
    let (status, _, body) = admin_send(shop.addr, "POST", "/v1/admin/products", create).await;
    assert_eq!(status, 201);
    assert_eq!(json(&body)["slug"], "walnut-board");

    let update = r#"{"slug":"walnut-board","name":"Walnut board","description":"End-grain walnut.","price_cents":6500,"currency":"usd"}"#;
    let (status, _, body) =
        admin_send(shop.addr, "PUT", "/v1/admin/products/walnut-board", update).await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["price_cents"], 6_500);

    // Body and path must agree on the slug.
    let (status, _, _) =
        admin_send(shop.addr, "PUT", "/v1/admin/products/other-slug", update).await;
    assert_eq!(status, 400);

    let (status, _, _) = admin_send(
        shop.addr,
        "POST",
        "/v1/admin/products",
        r#"{"slug":"bad","name":"Bad","price_cents":-5,"currency":"usd"}"#,
    )
    .await;
    assert_eq!(status, 400);

    let (status, _, body) =
        admin_send(shop.addr, "POST", "/v1/admin/products/walnut-board/archive", "{}").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["archived"], true);
    let (status, _, _) =
        admin_send(shop.addr, "POST", "/v1/admin/products/never-was/archive", "{}").await;
    assert_eq!(status, 404);

    // Archived products stay visible to admin, hidden from the public.
    let (status, _, body) = admin_get(shop.addr, "/v1/admin/products").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["total"], 1);
    let (status, _, body) = send_request(shop.addr, "GET", "/v1/products", &[], None).await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["total"], 0);
}

async fn checkout(shop: &TestShop, key: &str) -> String {
    let body = format!(
        r#"{{"email":"buyer@example.com","items":[{{"slug":"enamel-mug","quantity":1}}],"idempotency_key":"{key}"}}"#
    );
    let (status, _, resp) =
        send_request(shop.addr, "POST", "/v1/checkout", &[], Some(&body)).await;
    assert_eq!(status, 201);
    json(&resp)["order_id"]
        .as_str()
        .expect("order id")
        .to_string()
}

fn mark_paid(shop: &TestShop, order_id: &str) {
    shop.state
        .store
        .set_order_status(
            &OrderId::parse(order_id).expect("order id"),
            OrderStatus::Paid,
            unix_millis(),
        )
        .expect("mark paid");
}

#[tokio::test]
async fn order_book_fulfill_and_refund() {
    let shop = spawn_shop(test_config()).await;
    seed_product(&shop.state, "enamel-mug", 1_800, true);
    let first = checkout(&shop, "ck_a").await;
    let second = checkout(&shop, "ck_b").await;

    let (status, _, body) = admin_get(shop.addr, "/v1/admin/orders").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["total"], 2);
    let (status, _, body) = admin_get(shop.addr, "/v1/admin/orders?status=pending").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["total"], 2);
    let (status, _, _) = admin_get(shop.addr, "/v1/admin/orders?status=shipped").await;
    assert_eq!(status, 400);
    let (status, _, _) = admin_get(shop.addr, "/v1/admin/orders?date=not-a-date").await;
    assert_eq!(status, 400);

    let (status, _, body) = admin_get(shop.addr, &format!("/v1/admin/orders/{first}")).await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["lines"][0]["slug"], "enamel-mug");
    let (status, _, _) = admin_get(shop.addr, "/v1/admin/orders/ord_0123456789ab").await;
    assert_eq!(status, 404);
    let (status, _, _) = admin_get(shop.addr, "/v1/admin/orders/ord_nope").await;
    assert_eq!(status, 400);

    // Pending orders cannot ship.
    let (status, _, _) =
        admin_send(shop.addr, "POST", &format!("/v1/admin/orders/{first}/fulfill"), "{}").await;
    assert_eq!(status, 409);
    mark_paid(&shop, &first);
    let (status, _, body) =
        admin_send(shop.addr, "POST", &format!("/v1/admin/orders/{first}/fulfill"), "{}").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["status"], "fulfilled");

    // Refund moves money at the gateway first.
    mark_paid(&shop, &second);
    let (status, _, body) =
        admin_send(shop.addr, "POST", &format!("/v1/admin/orders/{second}/refund"), "{}").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["status"], "refunded");
    assert_eq!(shop.payments.refund_calls().len(), 1);

    // Refunding twice conflicts and does not call the gateway again.
    let (status, _, _) =
        admin_send(shop.addr, "POST", &format!("/v1/admin/orders/{second}/refund"), "{}").await;
    assert_eq!(status, 409);
    assert_eq!(shop.payments.refund_calls().len(), 1);
}

#[tokio::test]
async fn refund_gateway_outage_leaves_the_order_alone() {
    let shop = spawn_shop(test_config()).await;
    seed_product(&shop.state, "enamel-mug", 1_800, true);
    let order_id = checkout(&shop, "ck_r").await;
    mark_paid(&shop, &order_id);

    shop.payments.fail_next_call();
    let (status, _, _) =
        admin_send(shop.addr, "POST", &format!("/v1/admin/orders/{order_id}/refund"), "{}").await;
    assert_eq!(status, 503);
    let (status, _, body) = admin_get(shop.addr, &format!("/v1/admin/orders/{order_id}")).await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["status"], "paid");
}

#[tokio::test]
async fn contact_messages_list_and_resolve() {
    let shop = spawn_shop(test_config()).await;
    let email = EmailAddress::parse("ada@example.com").expect("email");
    let message = shop
        .state
        .store
        .insert_contact_message("Ada", &email, "Where is my mug?", unix_millis())
        .expect("insert message");

    let (status, _, body) = admin_get(shop.addr, "/v1/admin/messages").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["total"], 1);
    assert_eq!(json(&body)["messages"][0]["resolved"], false);

    let (status, _, body) = admin_send(
        shop.addr,
        "POST",
        &format!("/v1/admin/messages/{}/resolve", message.id),
        "{}",
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["resolved"], true);

    let (status, _, body) = admin_get(shop.addr, "/v1/admin/messages?unresolved=true").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["total"], 0);

    let (status, _, _) =
        admin_send(shop.addr, "POST", "/v1/admin/messages/9999/resolve", "{}").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn subscribers_list_filter_and_csv_export() {
    let shop = spawn_shop(test_config()).await;
    let now = unix_millis();
    for (email, confirm) in [("a@example.com", true), ("b@example.com", false)] {
        let email = EmailAddress::parse(email).expect("email");
        let token = format!("tok-{email}");
        shop.state
            .store
            .subscribe_newsletter(&email, &token, now)
            .expect("subscribe");
        if confirm {
            shop.state
                .store
                .confirm_subscriber(&token, now)
                .expect("confirm");
        }
    }

    let (status, _, body) = admin_get(shop.addr, "/v1/admin/subscribers").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["total"], 2);
    let (status, _, body) = admin_get(shop.addr, "/v1/admin/subscribers?status=confirmed").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["total"], 1);
    assert_eq!(json(&body)["subscribers"][0]["email"], "a@example.com");
    let (status, _, _) = admin_get(shop.addr, "/v1/admin/subscribers?status=vip").await;
    assert_eq!(status, 400);

    let (status, headers, body) =
        admin_get(shop.addr, "/v1/admin/subscribers?export=csv").await;
    assert_eq!(status, 200);
    assert!(headers.contains("content-type: text/csv"));
    assert!(body.starts_with("email,status,created_at_ms\n"));
    assert!(body.contains("b@example.com,pending,"));
}

#[tokio::test]
async fn close_runs_trigger_force_and_fetch() {
    let shop = spawn_shop(test_config()).await;

    let (status, _, body) = admin_send(
        shop.addr,
        "POST",
        "/v1/admin/close-runs",
        r#"{"date":"2024-01-15"}"#,
    )
    .await;
    assert_eq!(status, 200);
    let run = json(&body);
    assert_eq!(run["business_date"], "2024-01-15");
    assert_eq!(run["status"], "balanced");
    assert_eq!(run["attempt"], 1);
    assert_eq!(run["source"], "admin");

    // The day is closed; only force reopens it.
    let (status, _, _) = admin_send(
        shop.addr,
        "POST",
        "/v1/admin/close-runs",
        r#"{"date":"2024-01-15"}"#,
    )
    .await;
    assert_eq!(status, 409);
    let (status, _, body) = admin_send(
        shop.addr,
        "POST",
        "/v1/admin/close-runs",
        r#"{"date":"2024-01-15","force":true}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["attempt"], 2);

    let (status, _, body) = admin_get(shop.addr, "/v1/admin/close-runs/2024-01-15").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["attempt"], 2);
    let (status, _, _) = admin_get(shop.addr, "/v1/admin/close-runs/2026-01-01").await;
    assert_eq!(status, 404);
    let (status, _, _) = admin_get(shop.addr, "/v1/admin/close-runs/2026-13-40").await;
    assert_eq!(status, 400);

    // A gateway outage lands a failed run instead of an error.
    shop.payments.fail_next_call();
    let (status, _, body) = admin_send(
        shop.addr,
        "POST",
        "/v1/admin/close-runs",
        r#"{"date":"2024-01-16"}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["status"], "failed");

    let (status, _, body) = admin_get(shop.addr, "/v1/admin/close-runs").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["runs"].as_array().expect("runs").len(), 2);
    let (status, _, body) =
        admin_get(shop.addr, "/v1/admin/close-runs?include_superseded=true").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["runs"].as_array().expect("runs").len(), 3);
}

fn scripted_copy() -> String {
    serde_json::json!({
        "headlines": ["Enamel mug, built to last", "Camp-proof coffee", "Mug for every morning"],
        "body_lines": [
            "350ml enamel mug that shrugs off drops, campfires, and dishwashers.",
            "Classic speckled enamel, ready to ship today."
        ]
    })
    .to_string()
}

#[tokio::test]
async fn ads_drafts_generate_list_and_review() {
    let shop = spawn_shop(test_config()).await;
    seed_product(&shop.state, "enamel-mug", 1_800, true);
    shop.copy_model.script_response(scripted_copy());

    let (status, _, body) = admin_send(
        shop.addr,
        "POST",
        "/v1/admin/ads-drafts",
        r#"{"slug":"enamel-mug","channel":"google","tone":"warm"}"#,
    )
    .await;
    assert_eq!(status, 201);
    let draft = json(&body);
    assert_eq!(draft["status"], "proposed");
    assert_eq!(draft["channel"], "google");
    assert_eq!(draft["model"], "fake-copy-model");
    assert_eq!(draft["headlines"].as_array().expect("headlines").len(), 3);
    let id = draft["id"].as_i64().expect("draft id");

    let (status, _, _) = admin_send(
        shop.addr,
        "POST",
        "/v1/admin/ads-drafts",
        r#"{"slug":"enamel-mug","channel":"billboard"}"#,
    )
    .await;
    assert_eq!(status, 400);
    let (status, _, _) = admin_send(
        shop.addr,
        "POST",
        "/v1/admin/ads-drafts",
        r#"{"slug":"no-such-thing","channel":"google"}"#,
    )
    .await;
    assert_eq!(status, 404);

    // Model outage: nothing stored, caller told to retry later.
    shop.copy_model.fail_next_call();
    let (status, _, _) = admin_send(
        shop.addr,
        "POST",
        "/v1/admin/ads-drafts",
        r#"{"slug":"enamel-mug","channel":"google"}"#,
    )
    .await;
    assert_eq!(status, 503);

    let (status, _, body) = admin_get(shop.addr, "/v1/admin/ads-drafts?status=proposed").await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["total"], 1);

    let (status, _, body) = admin_send(
        shop.addr,
        "POST",
        &format!("/v1/admin/ads-drafts/{id}/review"),
        r#"{"decision":"approved"}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json(&body)["status"], "approved");

    // Review is final.
    let (status, _, _) = admin_send(
        shop.addr,
        "POST",
        &format!("/v1/admin/ads-drafts/{id}/review"),
        r#"{"decision":"rejected"}"#,
    )
    .await;
    assert_eq!(status, 409);
    let (status, _, _) = admin_send(
        shop.addr,
        "POST",
        "/v1/admin/ads-drafts/9999/review",
        r#"{"decision":"approved"}"#,
    )
    .await;
    assert_eq!(status, 404);
}
