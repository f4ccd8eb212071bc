// SPDX-License-Identifier: Apache-2.0

//! Command implementations. Each one opens what it needs, does the
//! work, and emits a single result: json on stdout under `--json`,
//! a human line otherwise, nothing under `--quiet`.

use crate::{CliError, OutputMode};
use serde_json::json;
use std::path::{Path, PathBuf};
use tradepost_api::{CloseRunResponse, DraftResponse};
use tradepost_close::{generate_draft, run_close, CloseJob, CloseOptions};
use tradepost_core::{resolve_tradepost_data_dir, unix_millis, ENV_TRADEPOST_DB_PATH};
use tradepost_gateways::{
    webhook, ChargeRecord, CopyModel, FakeCopyModel, FakePaymentGateway, HttpCopyModel,
    HttpPaymentGateway,
};
use tradepost_model::{AdChannel, BusinessDate, CloseSource, OrderStatus, Product, ProductSlug};
use tradepost_server::{validate_startup_config_contract, ServerConfig};
use tradepost_store::Store;

fn emit(output: OutputMode, payload: &serde_json::Value, human: &str) -> Result<(), CliError> {
    if output.quiet {
        return Ok(());
    }
    if output.json {
        let line = serde_json::to_string(payload)
            .map_err(|e| CliError::internal(format!("serialize output: {e}")))?;
        println!("{line}");
    } else {
        println!("{human}");
    }
    Ok(())
}

fn resolve_db(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Ok(from_env) = std::env::var(ENV_TRADEPOST_DB_PATH) {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    resolve_tradepost_data_dir().join("tradepost.db")
}

fn open_store(path: &Path) -> Result<Store, CliError> {
    Store::open(path, unix_millis())
        .map_err(|e| CliError::internal(format!("open store at {}: {e}", path.display())))
}

fn parse_date(raw: &str) -> Result<BusinessDate, CliError> {
    BusinessDate::parse(raw).map_err(|e| CliError::validation(format!("date {raw:?}: {e}")))
}

pub(crate) fn db_init(db: Option<PathBuf>, output: OutputMode) -> Result<(), CliError> {
    let path = resolve_db(db);
    let store = open_store(&path)?;
    let inspection = store.inspect()?;
    emit(
        output,
        &json!({
            "db": path.display().to_string(),
            "schema_version": inspection.schema_version,
        }),
        &format!(
            "initialized {} at schema version {}",
            path.display(),
            inspection.schema_version
        ),
    )
}

fn demo_catalog(now_ms: u64) -> Result<Vec<Product>, CliError> {
    let rows: [(&str, &str, &str, i64); 4] = [
        (
            "enamel-mug",
            "Enamel mug",
            "A 350ml enamel mug for camp and kitchen.",
            1_800,
        ),
        (
            "walnut-board",
            "Walnut serving board",
            "End-grain walnut, oiled and ready for the table.",
            6_100,
        ),
        (
            "canvas-tote",
            "Canvas tote",
            "Heavy waxed canvas with a flat bottom and brass rivets.",
            2_400,
        ),
        (
            "letterpress-cards",
            "Letterpress cards",
            "A box of ten letterpress greeting cards, blank inside.",
            1_200,
        ),
    ];
    let mut products = Vec::with_capacity(rows.len());
    for (position, (slug, name, description, price_cents)) in rows.into_iter().enumerate() {
        products.push(Product {
            slug: ProductSlug::parse(slug)
                .map_err(|e| CliError::internal(format!("demo slug {slug}: {e}")))?,
            name: name.to_string(),
            description: description.to_string(),
            price_cents,
            currency: tradepost_model::Currency::Usd,
            image_url: None,
            active: true,
            position: position as i64 + 1,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        });
    }
    Ok(products)
}

pub(crate) fn db_seed(db: Option<PathBuf>, output: OutputMode) -> Result<(), CliError> {
    let path = resolve_db(db);
    let store = open_store(&path)?;
    let products = demo_catalog(unix_millis())?;
    for product in &products {
        store.upsert_product(product)?;
    }
    emit(
        output,
        &json!({
            "db": path.display().to_string(),
            "seeded": products.len(),
        }),
        &format!("seeded {} demo products into {}", products.len(), path.display()),
    )
}

pub(crate) fn db_inspect(db: Option<PathBuf>, output: OutputMode) -> Result<(), CliError> {
    let path = resolve_db(db);
    let store = open_store(&path)?;
    let inspection = store.inspect()?;
    let mut human = format!(
        "{} (schema version {})",
        path.display(),
        inspection.schema_version
    );
    for (table, count) in &inspection.row_counts {
        human.push_str(&format!("\n  {table}: {count}"));
    }
    emit(
        output,
        &json!({
            "db": path.display().to_string(),
            "schema_version": inspection.schema_version,
            "row_counts": inspection.row_counts,
        }),
        &human,
    )
}

/// Charges the fake gateway hands back during an offline close: one per
/// settled order, mirroring the order book so the rehearsal balances.
fn offline_charges(orders: &[tradepost_model::Order]) -> Vec<ChargeRecord> {
    orders
        .iter()
        .filter_map(|order| {
            let payment_ref = order.payment_ref.clone()?;
            let created_ms = order.paid_at_ms.unwrap_or(order.created_at_ms);
            Some(ChargeRecord {
                charge_id: format!("ch-offline-{}", order.id),
                payment_ref,
                amount_cents: order.total_cents,
                refunded_cents: if order.status == OrderStatus::Refunded {
                    order.total_cents
                } else {
                    0
                },
                fee_cents: 0,
                created_ms: created_ms as i64,
            })
        })
        .collect()
}

fn close_run_human(resp: &CloseRunResponse) -> String {
    format!(
        "close {} attempt {} {}: {} orders, net {} cents, delta {} cents, {} discrepancies",
        resp.business_date,
        resp.attempt,
        resp.status,
        resp.orders_count,
        resp.net_cents,
        resp.delta_cents,
        resp.discrepancies.len(),
    )
}

pub(crate) async fn close_run(
    db: Option<PathBuf>,
    date: &str,
    force: bool,
    offline: bool,
    output: OutputMode,
) -> Result<(), CliError> {
    let date = parse_date(date)?;
    let config = ServerConfig::from_env();
    let store = open_store(&resolve_db(db))?;
    let job = CloseJob::from_options(
        CloseOptions {
            date,
            source: CloseSource::Cli,
            force,
            utc_offset_minutes: config.close.utc_offset_minutes,
        },
        unix_millis(),
    )?;

    let report = if offline {
        let (start_ms, end_ms) = job.window_ms();
        let orders = store.settled_orders_in_window(start_ms, end_ms)?;
        let gateway = FakePaymentGateway::new();
        gateway.script_charges(offline_charges(&orders));
        run_close(&store, &gateway, None, &job).await?
    } else {
        let g = &config.gateways;
        if g.payment_api_key.trim().is_empty() {
            return Err(CliError::dependency(
                "no payment api key configured; set TRADEPOST_PAYMENT_API_KEY or pass --offline",
            ));
        }
        let gateway =
            HttpPaymentGateway::new(&g.payment_base_url, &g.payment_api_key, g.request_timeout)
                .map_err(|e| CliError::dependency(format!("payment gateway: {e}")))?;
        run_close(&store, &gateway, None, &job).await?
    };

    let resp = CloseRunResponse::from_run(&report.run, &report.discrepancies);
    let payload = serde_json::to_value(&resp)
        .map_err(|e| CliError::internal(format!("serialize close run: {e}")))?;
    emit(output, &payload, &close_run_human(&resp))
}

pub(crate) fn close_list(db: Option<PathBuf>, output: OutputMode) -> Result<(), CliError> {
    let store = open_store(&resolve_db(db))?;
    let runs = store.list_close_runs(false, 50, 0)?;
    let rows: Vec<CloseRunResponse> = runs
        .iter()
        .map(|run| CloseRunResponse::from_run(run, &[]))
        .collect();
    let human = if rows.is_empty() {
        "no close runs yet".to_string()
    } else {
        rows.iter()
            .map(close_run_human)
            .collect::<Vec<_>>()
            .join("\n")
    };
    let payload = serde_json::to_value(&rows)
        .map_err(|e| CliError::internal(format!("serialize close runs: {e}")))?;
    emit(output, &json!({ "runs": payload }), &human)
}

pub(crate) fn close_show(
    db: Option<PathBuf>,
    date: &str,
    output: OutputMode,
) -> Result<(), CliError> {
    let date = parse_date(date)?;
    let store = open_store(&resolve_db(db))?;
    let Some(run) = store.close_run_live(date)? else {
        return Err(CliError::validation(format!("no close run for {date}")));
    };
    let discrepancies = store.close_run_discrepancies(run.id)?;
    let resp = CloseRunResponse::from_run(&run, &discrepancies);
    let mut human = close_run_human(&resp);
    for d in &resp.discrepancies {
        human.push_str(&format!(
            "\n  {}: {} ({} cents)",
            d.kind, d.detail, d.amount_delta_cents
        ));
    }
    let payload = serde_json::to_value(&resp)
        .map_err(|e| CliError::internal(format!("serialize close run: {e}")))?;
    emit(output, &payload, &human)
}

/// Template copy built from the catalog row, shaped to the channel, for
/// drafting without a model account.
fn offline_copy(product: &Product, channel: AdChannel) -> String {
    let price = format!(
        "{}.{:02} {}",
        product.price_cents / 100,
        product.price_cents % 100,
        product.currency.as_str()
    );
    let mut headlines = vec![
        product.name.clone(),
        format!("Now {price}"),
        "Ready to ship today".to_string(),
    ];
    headlines.truncate(channel.headline_count());
    let mut body_lines = Vec::new();
    if !product.description.trim().is_empty() {
        body_lines.push(product.description.clone());
    }
    body_lines.push(format!("{} for {price}, shipped fast.", product.name));
    body_lines.truncate(channel.body_count());
    json!({ "headlines": headlines, "body_lines": body_lines }).to_string()
}

pub(crate) async fn ads_draft(
    db: Option<PathBuf>,
    slug: &str,
    channel: &str,
    tone: Option<&str>,
    offline: bool,
    output: OutputMode,
) -> Result<(), CliError> {
    let slug = ProductSlug::parse(slug)
        .map_err(|e| CliError::validation(format!("slug {slug:?}: {e}")))?;
    let Some(channel) = AdChannel::parse_str(channel) else {
        return Err(CliError::usage(format!(
            "unknown channel {channel:?}; expected google or meta"
        )));
    };
    let store = open_store(&resolve_db(db))?;

    let model: Box<dyn CopyModel> = if offline {
        let product = store
            .product_by_slug(&slug)?
            .ok_or_else(|| CliError::validation(format!("product {slug} not found")))?;
        let fake = FakeCopyModel::new();
        fake.script_response(offline_copy(&product, channel));
        Box::new(fake)
    } else {
        let config = ServerConfig::from_env();
        let g = &config.gateways;
        if g.copy_api_key.trim().is_empty() {
            return Err(CliError::dependency(
                "no copy model api key configured; set TRADEPOST_COPY_API_KEY or pass --offline",
            ));
        }
        Box::new(
            HttpCopyModel::new(&g.copy_base_url, &g.copy_api_key, &g.copy_model, g.request_timeout)
                .map_err(|e| CliError::dependency(format!("copy model: {e}")))?,
        )
    };

    let draft = generate_draft(&store, model.as_ref(), &slug, channel, tone, unix_millis()).await?;
    let resp = DraftResponse::from(&draft);
    let payload = serde_json::to_value(&resp)
        .map_err(|e| CliError::internal(format!("serialize draft: {e}")))?;
    emit(
        output,
        &payload,
        &format!(
            "draft {} for {} on {}: {:?}",
            resp.id, resp.slug, resp.channel, resp.headlines
        ),
    )
}

pub(crate) fn ads_list(db: Option<PathBuf>, output: OutputMode) -> Result<(), CliError> {
    let store = open_store(&resolve_db(db))?;
    let (drafts, total) = store.list_ads_drafts(None, 50, 0)?;
    let rows: Vec<DraftResponse> = drafts.iter().map(DraftResponse::from).collect();
    let human = if rows.is_empty() {
        "no drafts yet".to_string()
    } else {
        rows.iter()
            .map(|d| {
                format!(
                    "draft {} {} {} {}: {}",
                    d.id,
                    d.slug,
                    d.channel,
                    d.status,
                    d.headlines.join(" | ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    let payload = serde_json::to_value(&rows)
        .map_err(|e| CliError::internal(format!("serialize drafts: {e}")))?;
    emit(output, &json!({ "drafts": payload, "total": total }), &human)
}

pub(crate) fn webhook_sign(
    secret: &str,
    body_file: &Path,
    timestamp: Option<u64>,
    output: OutputMode,
) -> Result<(), CliError> {
    if secret.trim().is_empty() {
        return Err(CliError::usage("secret must not be empty"));
    }
    let body = std::fs::read(body_file)
        .map_err(|e| CliError::validation(format!("read {}: {e}", body_file.display())))?;
    let timestamp = timestamp.unwrap_or_else(|| unix_millis() / 1_000);
    let header = webhook::sign(secret, timestamp, &body);
    emit(
        output,
        &json!({
            "header": header,
            "timestamp": timestamp,
            "body_bytes": body.len(),
        }),
        &header,
    )
}

pub(crate) fn config_check(output: OutputMode) -> Result<(), CliError> {
    let config = ServerConfig::from_env();
    validate_startup_config_contract(&config).map_err(CliError::validation)?;
    emit(
        output,
        &json!({
            "status": "ok",
            "bind_addr": config.bind_addr,
            "db_path": config.db_path.display().to_string(),
            "admin_enabled": config.admin.enabled,
            "webhook_enabled": config.webhook.enabled,
            "close_autorun": config.close.autorun,
        }),
        &format!(
            "config ok: bind {}, db {}, admin {}, webhook {}, autorun {}",
            config.bind_addr,
            config.db_path.display(),
            config.admin.enabled,
            config.webhook.enabled,
            config.close.autorun,
        ),
    )
}
