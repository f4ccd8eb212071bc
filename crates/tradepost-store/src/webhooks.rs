// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use crate::store::{ms_from_db, Store};
use rusqlite::{params, OptionalExtension};
use tradepost_model::{EventId, OrderId};

/// What processing an event amounted to. Stored alongside the event id so
/// the log explains itself during incident review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum WebhookOutcome {
    /// The order transition was applied.
    Applied,
    /// Recognized but deliberately skipped (unhandled event type).
    Ignored,
    /// The referenced order could not take the transition.
    Conflict,
    /// No order matches the event's payment reference.
    Unmatched,
}

impl WebhookOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Ignored => "ignored",
            Self::Conflict => "conflict",
            Self::Unmatched => "unmatched",
        }
    }

    #[must_use]
    pub fn parse_str(input: &str) -> Option<Self> {
        match input {
            "applied" => Some(Self::Applied),
            "ignored" => Some(Self::Ignored),
            "conflict" => Some(Self::Conflict),
            "unmatched" => Some(Self::Unmatched),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEventRecord {
    pub event_id: EventId,
    pub event_type: String,
    pub order_public_id: Option<OrderId>,
    pub outcome: WebhookOutcome,
    pub received_at_ms: u64,
}

impl Store {
    /// Appends the event to the log. Returns false when the event id was
    /// already recorded; the caller then acks without reprocessing.
    pub fn record_webhook_event(&self, record: &WebhookEventRecord) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO webhook_events
                   (event_id, event_type, order_public_id, outcome, received_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.event_id.as_str(),
                    record.event_type,
                    record.order_public_id.as_ref().map(OrderId::as_str),
                    record.outcome.as_str(),
                    record.received_at_ms as i64,
                ],
            )
            .map_err(StoreError::from_sqlite)?;
        Ok(inserted == 1)
    }

    pub fn webhook_event(
        &self,
        event_id: &EventId,
    ) -> Result<Option<WebhookEventRecord>, StoreError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT event_id, event_type, order_public_id, outcome, received_at_ms
                 FROM webhook_events WHERE event_id = ?1",
                params![event_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(StoreError::from_sqlite)?;
        let Some((event_id, event_type, order_public_id, outcome, received_at_ms)) = raw else {
            return Ok(None);
        };
        Ok(Some(WebhookEventRecord {
            event_id: EventId::parse(&event_id)
                .map_err(|e| StoreError::corrupt(format!("webhook event_id: {e}")))?,
            event_type,
            order_public_id: order_public_id
                .map(|id| {
                    OrderId::parse(&id)
                        .map_err(|e| StoreError::corrupt(format!("webhook order id: {e}")))
                })
                .transpose()?,
            outcome: WebhookOutcome::parse_str(&outcome)
                .ok_or_else(|| StoreError::corrupt(format!("webhook outcome {outcome:?}")))?,
            received_at_ms: ms_from_db(received_at_ms, "webhook_events.received_at_ms")?,
        }))
    }
}
