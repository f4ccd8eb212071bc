// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use std::env;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tradepost_core::{unix_millis, ENV_TRADEPOST_LOG_LEVEL};
use tradepost_gateways::{
    CopyModel, FakeCopyModel, FakeMailer, FakePaymentGateway, HttpCopyModel, HttpMailer,
    HttpPaymentGateway, Mailer, PaymentGateway,
};
use tradepost_server::{build_router, run_scheduler, validate_startup_config_contract, AppState, ServerConfig};
use tradepost_store::Store;

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(ENV_TRADEPOST_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("TRADEPOST_LOG_JSON", true) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let sigterm = signal(SignalKind::terminate());
        let sigint = signal(SignalKind::interrupt());
        match (sigterm, sigint) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Real HTTP clients when credentials exist, fakes otherwise so a dev
/// shop runs with no accounts anywhere.
fn build_gateways(
    config: &ServerConfig,
) -> Result<(Arc<dyn PaymentGateway>, Arc<dyn Mailer>, Arc<dyn CopyModel>), String> {
    let g = &config.gateways;
    let payments: Arc<dyn PaymentGateway> = if g.payment_api_key.trim().is_empty() {
        warn!("no payment api key configured, using the in-memory fake gateway");
        Arc::new(FakePaymentGateway::new())
    } else {
        Arc::new(
            HttpPaymentGateway::new(&g.payment_base_url, &g.payment_api_key, g.request_timeout)
                .map_err(|e| format!("payment gateway: {e}"))?,
        )
    };
    let mailer: Arc<dyn Mailer> = if g.mail_api_key.trim().is_empty() {
        warn!("no mail api key configured, outgoing mail goes to the fake mailer");
        Arc::new(FakeMailer::new())
    } else {
        Arc::new(
            HttpMailer::new(
                &g.mail_base_url,
                &g.mail_api_key,
                &config.mail.from,
                g.request_timeout,
            )
            .map_err(|e| format!("mailer: {e}"))?,
        )
    };
    let copy_model: Arc<dyn CopyModel> = if g.copy_api_key.trim().is_empty() {
        warn!("no copy model api key configured, using the fake copy model");
        Arc::new(FakeCopyModel::new())
    } else {
        Arc::new(
            HttpCopyModel::new(&g.copy_base_url, &g.copy_api_key, &g.copy_model, g.request_timeout)
                .map_err(|e| format!("copy model: {e}"))?,
        )
    };
    Ok((payments, mailer, copy_model))
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();

    let config = ServerConfig::from_env();
    validate_startup_config_contract(&config)?;

    if let Some(dir) = config.db_path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| format!("create data dir: {e}"))?;
    }
    let store = Store::open(&config.db_path, unix_millis())
        .map_err(|e| format!("open store at {}: {e}", config.db_path.display()))?;

    let (payments, mailer, copy_model) = build_gateways(&config)?;
    let bind_addr = config.bind_addr.clone();
    let autorun = config.close.autorun;
    let state = AppState::new(config, store, payments, mailer, copy_model);
    let app = build_router(state.clone());

    if autorun {
        tokio::spawn(run_scheduler(state.clone()));
    }

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| format!("bind {bind_addr}: {e}"))?;
    info!("tradepost-server listening on {bind_addr}");
    let accepting = state.accepting_requests.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            accepting.store(false, Ordering::Relaxed);
            let drain_ms = env_u64("TRADEPOST_SHUTDOWN_DRAIN_MS", 5_000);
            tokio::time::sleep(Duration::from_millis(drain_ms)).await;
        })
        .await
        .map_err(|e| format!("server failed: {e}"))
}
