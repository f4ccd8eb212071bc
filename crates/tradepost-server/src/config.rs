// SPDX-License-Identifier: Apache-2.0

//! Server configuration. Everything is env-driven with defaults that make
//! a dev shop run out of the box; `validate_startup_config_contract`
//! rejects combinations that would only fail later at request time.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tradepost_close::MAX_UTC_OFFSET_MINUTES;
use tradepost_core::{resolve_tradepost_data_dir, ENV_TRADEPOST_DB_PATH};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
    /// Key buckets on `x-forwarded-for` instead of the peer address.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10.0,
            refill_per_sec: 2.0,
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpLimitsConfig {
    pub max_body_bytes: usize,
    pub max_uri_bytes: usize,
    pub max_header_bytes: usize,
    pub enable_response_compression: bool,
    pub compression_min_bytes: usize,
    pub products_ttl: Duration,
}

impl Default for HttpLimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 16 * 1024,
            max_uri_bytes: 2048,
            max_header_bytes: 16 * 1024,
            enable_response_compression: true,
            compression_min_bytes: 1024,
            products_ttl: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub secret: String,
    pub tolerance_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret: String::new(),
            tolerance_secs: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CloseConfig {
    pub utc_offset_minutes: i32,
    pub autorun: bool,
    pub autorun_local_hour: u32,
    pub summary_to: Option<String>,
}

impl Default for CloseConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            autorun: false,
            autorun_local_hour: 6,
            summary_to: None,
        }
    }
}

/// Outbound mail identity plus the public base used to build the
/// confirm/unsubscribe links in outgoing text.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from: String,
    pub shop_inbox: String,
    pub public_base_url: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "shop@tradepost.test".to_string(),
            shop_inbox: "owner@tradepost.test".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

/// Credentials and endpoints for the outbound clients. Read here, used
/// by `main` to construct the HTTP gateways.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub payment_base_url: String,
    pub payment_api_key: String,
    pub mail_base_url: String,
    pub mail_api_key: String,
    pub copy_base_url: String,
    pub copy_api_key: String,
    pub copy_model: String,
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            payment_base_url: "https://api.stripe.com".to_string(),
            payment_api_key: String::new(),
            mail_base_url: "https://api.resend.com".to_string(),
            mail_api_key: String::new(),
            copy_base_url: "https://api.openai.com".to_string(),
            copy_api_key: String::new(),
            copy_model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub limits: HttpLimitsConfig,
    pub admin: AdminConfig,
    pub webhook: WebhookConfig,
    pub close: CloseConfig,
    pub mail: MailConfig,
    pub gateways: GatewayConfig,
    pub rate_limit_per_ip: RateLimitConfig,
    pub newsletter_token_secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            db_path: resolve_tradepost_data_dir().join("tradepost.db"),
            limits: HttpLimitsConfig::default(),
            admin: AdminConfig::default(),
            webhook: WebhookConfig::default(),
            close: CloseConfig::default(),
            mail: MailConfig::default(),
            gateways: GatewayConfig::default(),
            rate_limit_per_ip: RateLimitConfig::default(),
            newsletter_token_secret: "tradepost-dev-token-secret".to_string(),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

pub(crate) fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_i32(name: &str, default: i32) -> i32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

fn env_csv(name: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl ServerConfig {
    /// Assembles the config from `TRADEPOST_*` env vars over defaults.
    /// Pair with `validate_startup_config_contract` before serving.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_string("TRADEPOST_BIND", &defaults.bind_addr),
            db_path: env_opt(ENV_TRADEPOST_DB_PATH)
                .map_or(defaults.db_path, PathBuf::from),
            limits: HttpLimitsConfig {
                max_body_bytes: env_usize("TRADEPOST_MAX_BODY_BYTES", 16 * 1024),
                max_uri_bytes: env_usize("TRADEPOST_MAX_URI_BYTES", 2048),
                max_header_bytes: env_usize("TRADEPOST_MAX_HEADER_BYTES", 16 * 1024),
                enable_response_compression: env_bool("TRADEPOST_ENABLE_RESPONSE_COMPRESSION", true),
                compression_min_bytes: env_usize("TRADEPOST_COMPRESSION_MIN_BYTES", 1024),
                products_ttl: Duration::from_secs(env_u64("TRADEPOST_PRODUCTS_TTL_SECS", 30)),
            },
            admin: AdminConfig {
                enabled: env_bool("TRADEPOST_ADMIN_ENABLED", false),
                api_keys: env_csv("TRADEPOST_ADMIN_API_KEYS"),
            },
            webhook: WebhookConfig {
                enabled: env_bool("TRADEPOST_WEBHOOK_ENABLED", false),
                secret: env_string("TRADEPOST_WEBHOOK_SECRET", ""),
                tolerance_secs: env_u64("TRADEPOST_WEBHOOK_TOLERANCE_SECS", 300),
            },
            close: CloseConfig {
                utc_offset_minutes: env_i32("TRADEPOST_UTC_OFFSET_MINUTES", 0),
                autorun: env_bool("TRADEPOST_CLOSE_AUTORUN", false),
                autorun_local_hour: env_u64("TRADEPOST_CLOSE_AUTORUN_HOUR", 6) as u32,
                summary_to: env_opt("TRADEPOST_CLOSE_SUMMARY_TO"),
            },
            mail: MailConfig {
                from: env_string("TRADEPOST_MAIL_FROM", &defaults.mail.from),
                shop_inbox: env_string("TRADEPOST_SHOP_INBOX", &defaults.mail.shop_inbox),
                public_base_url: env_string(
                    "TRADEPOST_PUBLIC_BASE_URL",
                    &defaults.mail.public_base_url,
                ),
            },
            gateways: GatewayConfig {
                payment_base_url: env_string(
                    "TRADEPOST_PAYMENT_BASE_URL",
                    &defaults.gateways.payment_base_url,
                ),
                payment_api_key: env_string("TRADEPOST_PAYMENT_API_KEY", ""),
                mail_base_url: env_string(
                    "TRADEPOST_MAIL_BASE_URL",
                    &defaults.gateways.mail_base_url,
                ),
                mail_api_key: env_string("TRADEPOST_MAIL_API_KEY", ""),
                copy_base_url: env_string(
                    "TRADEPOST_COPY_BASE_URL",
                    &defaults.gateways.copy_base_url,
                ),
                copy_api_key: env_string("TRADEPOST_COPY_API_KEY", ""),
                copy_model: env_string("TRADEPOST_COPY_MODEL", &defaults.gateways.copy_model),
                request_timeout: Duration::from_millis(env_u64(
                    "TRADEPOST_GATEWAY_TIMEOUT_MS",
                    10_000,
                )),
            },
            rate_limit_per_ip: RateLimitConfig {
                capacity: env_f64("TRADEPOST_RATE_LIMIT_CAPACITY", 10.0),
                refill_per_sec: env_f64("TRADEPOST_RATE_LIMIT_REFILL_PER_SEC", 2.0),
                trust_forwarded_for: env_bool("TRADEPOST_TRUST_FORWARDED_FOR", false),
            },
            newsletter_token_secret: env_string(
                "TRADEPOST_NEWSLETTER_TOKEN_SECRET",
                &defaults.newsletter_token_secret,
            ),
        }
    }
}

/// Rejects configs that would serve but misbehave: an admin surface
/// nobody can call, a webhook route that can never verify, an autorun
/// close with no gateway credentials to read charges from.
pub fn validate_startup_config_contract(config: &ServerConfig) -> Result<(), String> {
    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .map_err(|e| format!("bind addr {:?} is invalid: {e}", config.bind_addr))?;
    if addr.port() == 0 {
        return Err("bind addr must name a fixed port".to_string());
    }
    if config.admin.enabled && config.admin.api_keys.is_empty() {
        return Err("admin surface enabled with no TRADEPOST_ADMIN_API_KEYS".to_string());
    }
    if config.webhook.enabled && config.webhook.secret.trim().is_empty() {
        return Err("webhook route enabled with no TRADEPOST_WEBHOOK_SECRET".to_string());
    }
    if config.webhook.enabled && config.webhook.tolerance_secs == 0 {
        return Err("webhook tolerance of zero seconds rejects every delivery".to_string());
    }
    if config.close.autorun && config.gateways.payment_api_key.trim().is_empty() {
        return Err("close autorun enabled with no TRADEPOST_PAYMENT_API_KEY".to_string());
    }
    if config.close.autorun_local_hour > 23 {
        return Err(format!(
            "close autorun hour {} is not an hour of day",
            config.close.autorun_local_hour
        ));
    }
    if config.close.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        return Err(format!(
            "utc offset {} minutes is outside +/-{MAX_UTC_OFFSET_MINUTES}",
            config.close.utc_offset_minutes
        ));
    }
    if config.rate_limit_per_ip.capacity < 1.0 || config.rate_limit_per_ip.refill_per_sec <= 0.0 {
        return Err("per-ip rate limit needs capacity >= 1 and a positive refill".to_string());
    }
    if config.newsletter_token_secret.trim().is_empty() {
        return Err("newsletter token secret must not be empty".to_string());
    }
    if config.limits.max_body_bytes == 0 || config.limits.max_uri_bytes == 0 {
        return Err("request size limits must be positive".to_string());
    }
    Ok(())
}
