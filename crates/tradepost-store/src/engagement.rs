// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use crate::store::{ms_from_db, Store};
use rusqlite::{params, OptionalExtension, Row};
use tradepost_model::{
    validate_contact_fields, ContactMessage, EmailAddress, NewsletterSubscriber, SubscriberStatus,
};

/// What a signup did. The caller only sends a confirmation email for a
/// fresh pending row; everything else is acknowledged without side
/// effects so the endpoint cannot be used to probe addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed(NewsletterSubscriber),
    AlreadyKnown(NewsletterSubscriber),
}

impl SubscribeOutcome {
    #[must_use]
    pub fn subscriber(&self) -> &NewsletterSubscriber {
        match self {
            Self::Subscribed(s) | Self::AlreadyKnown(s) => s,
        }
    }

    #[must_use]
    pub const fn needs_confirmation_email(&self) -> bool {
        matches!(self, Self::Subscribed(_))
    }
}

fn row_to_subscriber(row: &Row<'_>) -> Result<(String, String, String, i64, i64), rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn assemble_subscriber(
    raw: (String, String, String, i64, i64),
) -> Result<NewsletterSubscriber, StoreError> {
    let (email, status, token, created_at_ms, updated_at_ms) = raw;
    Ok(NewsletterSubscriber {
        email: EmailAddress::parse(&email)
            .map_err(|e| StoreError::corrupt(format!("subscriber email: {e}")))?,
        status: SubscriberStatus::parse_str(&status)
            .ok_or_else(|| StoreError::corrupt(format!("subscriber status {status:?}")))?,
        token,
        created_at_ms: ms_from_db(created_at_ms, "newsletter_subscribers.created_at_ms")?,
        updated_at_ms: ms_from_db(updated_at_ms, "newsletter_subscribers.updated_at_ms")?,
    })
}

const SUBSCRIBER_COLUMNS: &str = "email, status, token, created_at_ms, updated_at_ms";

impl Store {
    /// Registers an email for the newsletter. An existing row, in any
    /// state, comes back untouched: unsubscribed addresses never
    /// resurrect through the public form.
    pub fn subscribe_newsletter(
        &self,
        email: &EmailAddress,
        token: &str,
        now_ms: u64,
    ) -> Result<SubscribeOutcome, StoreError> {
        let conn = self.conn()?;
        let existing = conn
            .query_row(
                &format!(
                    "SELECT {SUBSCRIBER_COLUMNS} FROM newsletter_subscribers WHERE email = ?1"
                ),
                params![email.as_str()],
                row_to_subscriber,
            )
            .optional()
            .map_err(StoreError::from_sqlite)?;
        if let Some(raw) = existing {
            return Ok(SubscribeOutcome::AlreadyKnown(assemble_subscriber(raw)?));
        }
        conn.execute(
            "INSERT INTO newsletter_subscribers (email, status, token, created_at_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                email.as_str(),
                SubscriberStatus::Pending.as_str(),
                token,
                now_ms as i64,
            ],
        )
        .map_err(StoreError::from_sqlite)?;
        Ok(SubscribeOutcome::Subscribed(NewsletterSubscriber {
            email: email.clone(),
            status: SubscriberStatus::Pending,
            token: token.to_string(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }))
    }

    pub fn subscriber_by_token(
        &self,
        token: &str,
    ) -> Result<Option<NewsletterSubscriber>, StoreError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {SUBSCRIBER_COLUMNS} FROM newsletter_subscribers WHERE token = ?1"
                ),
                params![token],
                row_to_subscriber,
            )
            .optional()
            .map_err(StoreError::from_sqlite)?;
        raw.map(assemble_subscriber).transpose()
    }

    /// Double-opt-in confirmation. Idempotent for already-confirmed rows
    /// so a re-clicked link stays friendly; unsubscribed rows conflict.
    pub fn confirm_subscriber(
        &self,
        token: &str,
        now_ms: u64,
    ) -> Result<NewsletterSubscriber, StoreError> {
        self.transition_subscriber(token, SubscriberStatus::Confirmed, now_ms)
    }

    /// Idempotent: an already-unsubscribed row is returned as-is, never
    /// an error. Unsubscribe links must always land.
    pub fn unsubscribe_by_token(
        &self,
        token: &str,
        now_ms: u64,
    ) -> Result<NewsletterSubscriber, StoreError> {
        self.transition_subscriber(token, SubscriberStatus::Unsubscribed, now_ms)
    }

    fn transition_subscriber(
        &self,
        token: &str,
        next: SubscriberStatus,
        now_ms: u64,
    ) -> Result<NewsletterSubscriber, StoreError> {
        let mut subscriber = self
            .subscriber_by_token(token)?
            .ok_or_else(|| StoreError::not_found("unknown subscription token"))?;
        if subscriber.status == next {
            return Ok(subscriber);
        }
        if !subscriber.status.can_transition_to(next) {
            return Err(StoreError::conflict(format!(
                "subscriber cannot move {} -> {}",
                subscriber.status.as_str(),
                next.as_str()
            )));
        }
        let conn = self.conn()?;
        conn.execute(
            "UPDATE newsletter_subscribers SET status = ?2, updated_at_ms = ?3 WHERE token = ?1",
            params![token, next.as_str(), now_ms as i64],
        )
        .map_err(StoreError::from_sqlite)?;
        subscriber.status = next;
        subscriber.updated_at_ms = now_ms;
        Ok(subscriber)
    }

    pub fn list_subscribers(
        &self,
        status: Option<SubscriberStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<NewsletterSubscriber>, u64), StoreError> {
        let conn = self.conn()?;
        let (filter, status_value) = match status {
            Some(s) => ("WHERE status = ?1", Some(s.as_str())),
            None => ("", None),
        };
        let total: i64 = match status_value {
            Some(s) => conn.query_row(
                &format!("SELECT COUNT(*) FROM newsletter_subscribers {filter}"),
                params![s],
                |r| r.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM newsletter_subscribers", [], |r| {
                r.get(0)
            }),
        }
        .map_err(StoreError::from_sqlite)?;
        let sql = format!(
            "SELECT {SUBSCRIBER_COLUMNS} FROM newsletter_subscribers {filter}
             ORDER BY created_at_ms, id LIMIT {limit} OFFSET {offset}"
        );
        let mut stmt = conn.prepare(&sql).map_err(StoreError::from_sqlite)?;
        let rows = match status_value {
            Some(s) => stmt.query_map(params![s], row_to_subscriber),
            None => stmt.query_map([], row_to_subscriber),
        }
        .map_err(StoreError::from_sqlite)?;
        let mut subscribers = Vec::new();
        for row in rows {
            subscribers.push(assemble_subscriber(row.map_err(StoreError::from_sqlite)?)?);
        }
        Ok((subscribers, total.max(0) as u64))
    }

    pub fn insert_contact_message(
        &self,
        name: &str,
        email: &EmailAddress,
        body: &str,
        now_ms: u64,
    ) -> Result<ContactMessage, StoreError> {
        validate_contact_fields(name, body).map_err(|e| StoreError::constraint(e.to_string()))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO contact_messages (name, email, body, resolved, created_at_ms)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![name, email.as_str(), body, now_ms as i64],
        )
        .map_err(StoreError::from_sqlite)?;
        Ok(ContactMessage {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            email: email.clone(),
            body: body.to_string(),
            resolved: false,
            created_at_ms: now_ms,
        })
    }

    pub fn list_contact_messages(
        &self,
        unresolved_only: bool,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<ContactMessage>, u64), StoreError> {
        let conn = self.conn()?;
        let filter = if unresolved_only {
            "WHERE resolved = 0"
        } else {
            ""
        };
        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM contact_messages {filter}"),
                [],
                |r| r.get(0),
            )
            .map_err(StoreError::from_sqlite)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, name, email, body, resolved, created_at_ms
                 FROM contact_messages {filter}
                 ORDER BY created_at_ms DESC, id DESC LIMIT ?1 OFFSET ?2"
            ))
            .map_err(StoreError::from_sqlite)?;
        let rows = stmt
            .query_map(params![limit, offset], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })
            .map_err(StoreError::from_sqlite)?;
        let mut messages = Vec::new();
        for row in rows {
            let (id, name, email, body, resolved, created_at_ms) =
                row.map_err(StoreError::from_sqlite)?;
            messages.push(ContactMessage {
                id,
                name,
                email: EmailAddress::parse(&email)
                    .map_err(|e| StoreError::corrupt(format!("contact email: {e}")))?,
                body,
                resolved,
                created_at_ms: ms_from_db(created_at_ms, "contact_messages.created_at_ms")?,
            });
        }
        Ok((messages, total.max(0) as u64))
    }

    /// Returns false when the id is unknown.
    pub fn resolve_contact_message(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE contact_messages SET resolved = 1 WHERE id = ?1",
                params![id],
            )
            .map_err(StoreError::from_sqlite)?;
        Ok(changed == 1)
    }
}
