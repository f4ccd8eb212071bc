// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use crate::store::{ms_from_db, optional_ms_from_db, Store};
use rusqlite::{params, OptionalExtension, Row};
use tradepost_model::{AdChannel, AdsDraft, DraftCopy, DraftStatus, ProductSlug};

const DRAFT_COLUMNS: &str = "id, product_slug, channel, tone, status, headlines_json, \
                             body_json, model, created_at_ms, reviewed_at_ms";

struct DraftRaw {
    id: i64,
    product_slug: String,
    channel: String,
    tone: Option<String>,
    status: String,
    headlines_json: String,
    body_json: String,
    model: String,
    created_at_ms: i64,
    reviewed_at_ms: Option<i64>,
}

fn row_to_draft_raw(row: &Row<'_>) -> Result<DraftRaw, rusqlite::Error> {
    Ok(DraftRaw {
        id: row.get(0)?,
        product_slug: row.get(1)?,
        channel: row.get(2)?,
        tone: row.get(3)?,
        status: row.get(4)?,
        headlines_json: row.get(5)?,
        body_json: row.get(6)?,
        model: row.get(7)?,
        created_at_ms: row.get(8)?,
        reviewed_at_ms: row.get(9)?,
    })
}

fn variants_from_json(json: &str, column: &'static str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(json)
        .map_err(|e| StoreError::corrupt(format!("ads_drafts.{column}: {e}")))
}

impl DraftRaw {
    fn into_draft(self) -> Result<AdsDraft, StoreError> {
        Ok(AdsDraft {
            id: self.id,
            product_slug: ProductSlug::parse(&self.product_slug)
                .map_err(|e| StoreError::corrupt(format!("draft slug: {e}")))?,
            channel: AdChannel::parse_str(&self.channel)
                .ok_or_else(|| StoreError::corrupt(format!("draft channel {:?}", self.channel)))?,
            tone: self.tone,
            status: DraftStatus::parse_str(&self.status)
                .ok_or_else(|| StoreError::corrupt(format!("draft status {:?}", self.status)))?,
            copy: DraftCopy {
                headlines: variants_from_json(&self.headlines_json, "headlines_json")?,
                body_lines: variants_from_json(&self.body_json, "body_json")?,
            },
            model: self.model,
            created_at_ms: ms_from_db(self.created_at_ms, "ads_drafts.created_at_ms")?,
            reviewed_at_ms: optional_ms_from_db(self.reviewed_at_ms, "ads_drafts.reviewed_at_ms")?,
        })
    }
}

impl Store {
    /// Stores generated copy as Proposed. The slug is checked against the
    /// catalog first so the error reads better than a bare FK failure.
    pub fn insert_ads_draft(
        &self,
        slug: &ProductSlug,
        channel: AdChannel,
        tone: Option<&str>,
        copy: &DraftCopy,
        model: &str,
        now_ms: u64,
    ) -> Result<AdsDraft, StoreError> {
        let conn = self.conn()?;
        let known: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM products WHERE slug = ?1",
                params![slug.as_str()],
                |r| r.get(0),
            )
            .map_err(StoreError::from_sqlite)?;
        if known == 0 {
            return Err(StoreError::not_found(format!("product {slug}")));
        }
        let headlines_json = serde_json::to_string(&copy.headlines)
            .map_err(|e| StoreError::internal(format!("serialize headlines: {e}")))?;
        let body_json = serde_json::to_string(&copy.body_lines)
            .map_err(|e| StoreError::internal(format!("serialize body lines: {e}")))?;
        conn.execute(
            "INSERT INTO ads_drafts
               (product_slug, channel, tone, status, headlines_json, body_json, model, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                slug.as_str(),
                channel.as_str(),
                tone,
                DraftStatus::Proposed.as_str(),
                headlines_json,
                body_json,
                model,
                now_ms as i64,
            ],
        )
        .map_err(StoreError::from_sqlite)?;
        Ok(AdsDraft {
            id: conn.last_insert_rowid(),
            product_slug: slug.clone(),
            channel,
            tone: tone.map(str::to_string),
            status: DraftStatus::Proposed,
            copy: copy.clone(),
            model: model.to_string(),
            created_at_ms: now_ms,
            reviewed_at_ms: None,
        })
    }

    pub fn ads_draft(&self, id: i64) -> Result<Option<AdsDraft>, StoreError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {DRAFT_COLUMNS} FROM ads_drafts WHERE id = ?1"),
                params![id],
                row_to_draft_raw,
            )
            .optional()
            .map_err(StoreError::from_sqlite)?;
        raw.map(DraftRaw::into_draft).transpose()
    }

    pub fn list_ads_drafts(
        &self,
        status: Option<DraftStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<AdsDraft>, u64), StoreError> {
        let conn = self.conn()?;
        let (filter, status_value) = match status {
            Some(s) => ("WHERE status = ?1", Some(s.as_str())),
            None => ("", None),
        };
        let total: i64 = match status_value {
            Some(s) => conn.query_row(
                &format!("SELECT COUNT(*) FROM ads_drafts {filter}"),
                params![s],
                |r| r.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM ads_drafts", [], |r| r.get(0)),
        }
        .map_err(StoreError::from_sqlite)?;
        let sql = format!(
            "SELECT {DRAFT_COLUMNS} FROM ads_drafts {filter}
             ORDER BY created_at_ms DESC, id DESC LIMIT {limit} OFFSET {offset}"
        );
        let mut stmt = conn.prepare(&sql).map_err(StoreError::from_sqlite)?;
        let raws = match status_value {
            Some(s) => stmt.query_map(params![s], row_to_draft_raw),
            None => stmt.query_map([], row_to_draft_raw),
        }
        .map_err(StoreError::from_sqlite)?;
        let mut drafts = Vec::new();
        for raw in raws {
            drafts.push(raw.map_err(StoreError::from_sqlite)?.into_draft()?);
        }
        Ok((drafts, total.max(0) as u64))
    }

    /// One review per draft: Proposed moves to Approved or Rejected and
    /// the decision never changes after that.
    pub fn review_ads_draft(
        &self,
        id: i64,
        decision: DraftStatus,
        now_ms: u64,
    ) -> Result<AdsDraft, StoreError> {
        let mut draft = self
            .ads_draft(id)?
            .ok_or_else(|| StoreError::not_found(format!("ads draft {id}")))?;
        if !draft.status.can_transition_to(decision) {
            return Err(StoreError::conflict(format!(
                "ads draft {id} cannot move {} -> {}",
                draft.status.as_str(),
                decision.as_str()
            )));
        }
        let conn = self.conn()?;
        conn.execute(
            "UPDATE ads_drafts SET status = ?2, reviewed_at_ms = ?3 WHERE id = ?1",
            params![id, decision.as_str(), now_ms as i64],
        )
        .map_err(StoreError::from_sqlite)?;
        draft.status = decision;
        draft.reviewed_at_ms = Some(now_ms);
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreErrorCode;
    use tradepost_model::{Currency, Product};

    fn seed_product(store: &Store, slug: &str) {
        store
            .upsert_product(&Product {
                slug: ProductSlug::parse(slug).unwrap(),
                name: format!("Product {slug}"),
                description: "desc".to_string(),
                price_cents: 1800,
                currency: Currency::Usd,
                image_url: None,
                active: true,
                position: 0,
                created_at_ms: 1,
                updated_at_ms: 1,
            })
            .unwrap();
    }

    fn copy() -> DraftCopy {
        DraftCopy {
            headlines: vec!["Enamel mugs, built to last".to_string()],
            body_lines: vec!["Campfire-proof. Dishwasher safe.".to_string()],
        }
    }

    #[test]
    fn insert_and_fetch_round_trips() {
        let store = Store::open_in_memory(1).unwrap();
        seed_product(&store, "enamel-mug");
        let slug = ProductSlug::parse("enamel-mug").unwrap();
        let draft = store
            .insert_ads_draft(&slug, AdChannel::Meta, Some("playful"), &copy(), "gpt-test", 1_000)
            .unwrap();
        assert_eq!(draft.status, DraftStatus::Proposed);
        let got = store.ads_draft(draft.id).unwrap().unwrap();
        assert_eq!(got, draft);
    }

    #[test]
    fn unknown_product_is_rejected_before_insert() {
        let store = Store::open_in_memory(1).unwrap();
        let slug = ProductSlug::parse("ghost").unwrap();
        let err = store
            .insert_ads_draft(&slug, AdChannel::Google, None, &copy(), "gpt-test", 1)
            .unwrap_err();
        assert_eq!(err.code, StoreErrorCode::NotFound);
        assert_eq!(store.inspect().unwrap().row_counts["ads_drafts"], 0);
    }

    #[test]
    fn review_is_single_shot() {
        let store = Store::open_in_memory(1).unwrap();
        seed_product(&store, "enamel-mug");
        let slug = ProductSlug::parse("enamel-mug").unwrap();
        let draft = store
            .insert_ads_draft(&slug, AdChannel::Google, None, &copy(), "gpt-test", 1_000)
            .unwrap();

        let approved = store
            .review_ads_draft(draft.id, DraftStatus::Approved, 2_000)
            .unwrap();
        assert_eq!(approved.status, DraftStatus::Approved);
        assert_eq!(approved.reviewed_at_ms, Some(2_000));

        let err = store
            .review_ads_draft(draft.id, DraftStatus::Rejected, 3_000)
            .unwrap_err();
        assert_eq!(err.code, StoreErrorCode::Conflict);

        let err = store
            .review_ads_draft(999, DraftStatus::Approved, 3_000)
            .unwrap_err();
        assert_eq!(err.code, StoreErrorCode::NotFound);
    }

    #[test]
    fn listing_filters_by_status() {
        let store = Store::open_in_memory(1).unwrap();
        seed_product(&store, "enamel-mug");
        let slug = ProductSlug::parse("enamel-mug").unwrap();
        let a = store
            .insert_ads_draft(&slug, AdChannel::Google, None, &copy(), "gpt-test", 1_000)
            .unwrap();
        store
            .insert_ads_draft(&slug, AdChannel::Meta, None, &copy(), "gpt-test", 2_000)
            .unwrap();
        store
            .review_ads_draft(a.id, DraftStatus::Rejected, 3_000)
            .unwrap();

        let (proposed, total) = store
            .list_ads_drafts(Some(DraftStatus::Proposed), 10, 0)
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(proposed[0].channel, AdChannel::Meta);

        let (all, total_all) = store.list_ads_drafts(None, 10, 0).unwrap();
        assert_eq!(total_all, 2);
        assert_eq!(all.len(), 2);
    }
}
