// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use tradepost_model::{
    AdsDraft, CloseDiscrepancy, CloseRun, ContactMessage, NewsletterSubscriber, Order, OrderLine,
    Product,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductResponse {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub active: bool,
    pub position: i64,
}

impl From<&Product> for ProductResponse {
    fn from(p: &Product) -> Self {
        Self {
            slug: p.slug.to_string(),
            name: p.name.clone(),
            description: p.description.clone(),
            price_cents: p.price_cents,
            currency: p.currency.to_string(),
            image_url: p.image_url.clone(),
            active: p.active,
            position: p.position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub status: String,
    pub total_cents: i64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderLineResponse {
    pub slug: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub line_total_cents: i64,
}

impl From<&OrderLine> for OrderLineResponse {
    fn from(l: &OrderLine) -> Self {
        Self {
            slug: l.product_slug.to_string(),
            name: l.name.clone(),
            unit_price_cents: l.unit_price_cents,
            quantity: l.quantity,
            line_total_cents: l.line_total_cents,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderResponse {
    pub order_id: String,
    pub email: String,
    pub status: String,
    pub currency: String,
    pub total_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_ref: Option<String>,
    pub lines: Vec<OrderLineResponse>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at_ms: Option<u64>,
}

impl From<&Order> for OrderResponse {
    fn from(o: &Order) -> Self {
        Self {
            order_id: o.id.to_string(),
            email: o.email.to_string(),
            status: o.status.as_str().to_string(),
            currency: o.currency.to_string(),
            total_cents: o.total_cents,
            payment_ref: o.payment_ref.clone(),
            lines: o.lines.iter().map(OrderLineResponse::from).collect(),
            created_at_ms: o.created_at_ms,
            paid_at_ms: o.paid_at_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscribeResponse {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriberResponse {
    pub email: String,
    pub status: String,
    pub created_at_ms: u64,
}

impl From<&NewsletterSubscriber> for SubscriberResponse {
    fn from(s: &NewsletterSubscriber) -> Self {
        Self {
            email: s.email.to_string(),
            status: s.status.as_str().to_string(),
            created_at_ms: s.created_at_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactResponse {
    pub received: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactMessageResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub body: String,
    pub resolved: bool,
    pub created_at_ms: u64,
}

impl From<&ContactMessage> for ContactMessageResponse {
    fn from(m: &ContactMessage) -> Self {
        Self {
            id: m.id,
            name: m.name.clone(),
            email: m.email.to_string(),
            body: m.body.clone(),
            resolved: m.resolved,
            created_at_ms: m.created_at_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
    pub outcome: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseDiscrepancyResponse {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_id: Option<String>,
    pub detail: String,
    pub amount_delta_cents: i64,
}

impl From<&CloseDiscrepancy> for CloseDiscrepancyResponse {
    fn from(d: &CloseDiscrepancy) -> Self {
        Self {
            kind: d.kind.as_str().to_string(),
            order_id: d.order_id.as_ref().map(ToString::to_string),
            charge_id: d.charge_id.clone(),
            detail: d.detail.clone(),
            amount_delta_cents: d.amount_delta_cents,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseRunResponse {
    pub business_date: String,
    pub attempt: u32,
    pub status: String,
    pub superseded: bool,
    pub orders_count: u64,
    pub gross_cents: i64,
    pub refunds_cents: i64,
    pub net_cents: i64,
    pub gateway_gross_cents: i64,
    pub gateway_refunds_cents: i64,
    pub gateway_fees_cents: i64,
    pub delta_cents: i64,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub discrepancies: Vec<CloseDiscrepancyResponse>,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

impl CloseRunResponse {
    #[must_use]
    pub fn from_run(run: &CloseRun, discrepancies: &[CloseDiscrepancy]) -> Self {
        Self {
            business_date: run.business_date.to_string(),
            attempt: run.attempt,
            status: run.status.as_str().to_string(),
            superseded: run.superseded,
            orders_count: run.totals.orders_count,
            gross_cents: run.totals.gross_cents,
            refunds_cents: run.totals.refunds_cents,
            net_cents: run.totals.net_cents,
            gateway_gross_cents: run.totals.gateway_gross_cents,
            gateway_refunds_cents: run.totals.gateway_refunds_cents,
            gateway_fees_cents: run.totals.gateway_fees_cents,
            delta_cents: run.totals.delta_cents,
            source: run.source.as_str().to_string(),
            error: run.error.clone(),
            discrepancies: discrepancies
                .iter()
                .map(CloseDiscrepancyResponse::from)
                .collect(),
            started_at_ms: run.started_at_ms,
            finished_at_ms: run.finished_at_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DraftResponse {
    pub id: i64,
    pub slug: String,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    pub status: String,
    pub headlines: Vec<String>,
    pub body_lines: Vec<String>,
    pub model: String,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at_ms: Option<u64>,
}

impl From<&AdsDraft> for DraftResponse {
    fn from(d: &AdsDraft) -> Self {
        Self {
            id: d.id,
            slug: d.product_slug.to_string(),
            channel: d.channel.as_str().to_string(),
            tone: d.tone.clone(),
            status: d.status.as_str().to_string(),
            headlines: d.copy.headlines.clone(),
            body_lines: d.copy.body_lines.clone(),
            model: d.model.clone(),
            created_at_ms: d.created_at_ms,
            reviewed_at_ms: d.reviewed_at_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionResponse {
    pub name: String,
    pub version: String,
}
