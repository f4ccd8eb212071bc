// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use rusqlite::Connection;

pub const SCHEMA_VERSION: i64 = 3;

/// Applied on every open. journal_mode persists in the file; the rest are
/// per-connection.
const OPEN_PRAGMAS: &str = "
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;
    PRAGMA foreign_keys=ON;
    PRAGMA busy_timeout=5000;
    PRAGMA temp_store=MEMORY;
    PRAGMA cache_size=-16000;
";

const CREATE_ALL: &str = "
    CREATE TABLE products (
      id INTEGER PRIMARY KEY,
      slug TEXT NOT NULL UNIQUE,
      name TEXT NOT NULL,
      description TEXT NOT NULL,
      price_cents INTEGER NOT NULL,
      currency TEXT NOT NULL,
      image_url TEXT,
      active INTEGER NOT NULL DEFAULT 1,
      position INTEGER NOT NULL DEFAULT 0,
      created_at_ms INTEGER NOT NULL,
      updated_at_ms INTEGER NOT NULL
    );
    CREATE TABLE orders (
      id INTEGER PRIMARY KEY,
      public_id TEXT NOT NULL UNIQUE,
      email TEXT NOT NULL,
      status TEXT NOT NULL,
      currency TEXT NOT NULL,
      total_cents INTEGER NOT NULL,
      payment_ref TEXT UNIQUE,
      idempotency_key TEXT UNIQUE,
      created_at_ms INTEGER NOT NULL,
      updated_at_ms INTEGER NOT NULL,
      paid_at_ms INTEGER
    );
    CREATE TABLE order_lines (
      id INTEGER PRIMARY KEY,
      order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
      product_slug TEXT NOT NULL,
      name TEXT NOT NULL,
      unit_price_cents INTEGER NOT NULL,
      quantity INTEGER NOT NULL,
      line_total_cents INTEGER NOT NULL
    );
    CREATE TABLE newsletter_subscribers (
      id INTEGER PRIMARY KEY,
      email TEXT NOT NULL UNIQUE,
      status TEXT NOT NULL,
      token TEXT NOT NULL UNIQUE,
      created_at_ms INTEGER NOT NULL,
      updated_at_ms INTEGER NOT NULL
    );
    CREATE TABLE contact_messages (
      id INTEGER PRIMARY KEY,
      name TEXT NOT NULL,
      email TEXT NOT NULL,
      body TEXT NOT NULL,
      resolved INTEGER NOT NULL DEFAULT 0,
      created_at_ms INTEGER NOT NULL
    );
    CREATE TABLE webhook_events (
      event_id TEXT PRIMARY KEY,
      event_type TEXT NOT NULL,
      order_public_id TEXT,
      outcome TEXT NOT NULL,
      received_at_ms INTEGER NOT NULL
    ) WITHOUT ROWID;
    CREATE TABLE close_runs (
      id INTEGER PRIMARY KEY,
      business_date TEXT NOT NULL,
      attempt INTEGER NOT NULL,
      status TEXT NOT NULL,
      superseded INTEGER NOT NULL DEFAULT 0,
      orders_count INTEGER NOT NULL DEFAULT 0,
      gross_cents INTEGER NOT NULL DEFAULT 0,
      refunds_cents INTEGER NOT NULL DEFAULT 0,
      net_cents INTEGER NOT NULL DEFAULT 0,
      gateway_gross_cents INTEGER NOT NULL DEFAULT 0,
      gateway_refunds_cents INTEGER NOT NULL DEFAULT 0,
      gateway_fees_cents INTEGER NOT NULL DEFAULT 0,
      delta_cents INTEGER NOT NULL DEFAULT 0,
      discrepancy_count INTEGER NOT NULL DEFAULT 0,
      source TEXT NOT NULL,
      error TEXT,
      started_at_ms INTEGER NOT NULL,
      finished_at_ms INTEGER,
      UNIQUE (business_date, attempt)
    );
    CREATE TABLE close_discrepancies (
      id INTEGER PRIMARY KEY,
      run_id INTEGER NOT NULL REFERENCES close_runs(id) ON DELETE CASCADE,
      kind TEXT NOT NULL,
      order_public_id TEXT,
      charge_id TEXT,
      detail TEXT NOT NULL,
      amount_delta_cents INTEGER NOT NULL
    );
    CREATE TABLE ads_drafts (
      id INTEGER PRIMARY KEY,
      product_slug TEXT NOT NULL REFERENCES products(slug),
      channel TEXT NOT NULL,
      tone TEXT,
      status TEXT NOT NULL,
      headlines_json TEXT NOT NULL,
      body_json TEXT NOT NULL,
      model TEXT NOT NULL,
      created_at_ms INTEGER NOT NULL,
      reviewed_at_ms INTEGER
    );
    CREATE TABLE meta (
      k TEXT PRIMARY KEY,
      v TEXT NOT NULL
    ) WITHOUT ROWID;
    CREATE INDEX idx_products_listing ON products(active, position, id);
    CREATE INDEX idx_orders_status ON orders(status);
    CREATE INDEX idx_orders_created_at ON orders(created_at_ms);
    CREATE INDEX idx_orders_paid_at ON orders(paid_at_ms);
    CREATE INDEX idx_order_lines_order ON order_lines(order_id);
    CREATE UNIQUE INDEX idx_close_runs_live ON close_runs(business_date) WHERE superseded = 0;
    CREATE INDEX idx_close_discrepancies_run ON close_discrepancies(run_id);
    CREATE INDEX idx_ads_drafts_status ON ads_drafts(status, id);
";

const MIGRATE_V1_TO_V2: &str = "
    ALTER TABLE close_runs ADD COLUMN gateway_fees_cents INTEGER NOT NULL DEFAULT 0;
    CREATE TABLE ads_drafts (
      id INTEGER PRIMARY KEY,
      product_slug TEXT NOT NULL REFERENCES products(slug),
      channel TEXT NOT NULL,
      tone TEXT,
      status TEXT NOT NULL,
      headlines_json TEXT NOT NULL,
      body_json TEXT NOT NULL,
      model TEXT NOT NULL,
      created_at_ms INTEGER NOT NULL,
      reviewed_at_ms INTEGER
    );
    CREATE INDEX idx_ads_drafts_status ON ads_drafts(status, id);
";

const MIGRATE_V2_TO_V3: &str = "
    CREATE INDEX idx_orders_paid_at ON orders(paid_at_ms);
";

pub(crate) fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(OPEN_PRAGMAS)
        .map_err(StoreError::from_sqlite)
}

pub(crate) fn migrate(conn: &mut Connection, now_ms: u64) -> Result<(), StoreError> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .map_err(StoreError::from_sqlite)?;
    if version > SCHEMA_VERSION {
        return Err(StoreError::corrupt(format!(
            "database schema version {version} is newer than supported {SCHEMA_VERSION}"
        )));
    }
    if version == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction().map_err(StoreError::from_sqlite)?;
    if version == 0 {
        tx.execute_batch(CREATE_ALL).map_err(StoreError::from_sqlite)?;
        tx.execute(
            "INSERT INTO meta (k, v) VALUES ('created_at_ms', ?1)",
            rusqlite::params![now_ms.to_string()],
        )
        .map_err(StoreError::from_sqlite)?;
    } else {
        if version < 2 {
            tx.execute_batch(MIGRATE_V1_TO_V2)
                .map_err(StoreError::from_sqlite)?;
        }
        if version < 3 {
            tx.execute_batch(MIGRATE_V2_TO_V3)
                .map_err(StoreError::from_sqlite)?;
        }
    }
    tx.execute(
        "INSERT INTO meta (k, v) VALUES ('schema_version', ?1)
         ON CONFLICT(k) DO UPDATE SET v = excluded.v",
        rusqlite::params![SCHEMA_VERSION.to_string()],
    )
    .map_err(StoreError::from_sqlite)?;
    tx.execute_batch(&format!("PRAGMA user_version={SCHEMA_VERSION};"))
        .map_err(StoreError::from_sqlite)?;
    tx.commit().map_err(StoreError::from_sqlite)
}
