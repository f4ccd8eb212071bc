// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use crate::store::{ms_from_db, optional_ms_from_db, Store};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tradepost_model::{
    compute_line_total, compute_order_total, Currency, EmailAddress, Order, OrderDraft, OrderId,
    OrderLine, OrderStatus, ProductSlug,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOrderOutcome {
    Created(Order),
    /// The idempotency key was already spent; this is the original order.
    Replayed(Order),
}

impl CreateOrderOutcome {
    #[must_use]
    pub fn order(&self) -> &Order {
        match self {
            Self::Created(order) | Self::Replayed(order) => order,
        }
    }

    #[must_use]
    pub const fn is_replay(&self) -> bool {
        matches!(self, Self::Replayed(_))
    }
}

const ORDER_COLUMNS: &str = "id, public_id, email, status, currency, total_cents, payment_ref, \
                             idempotency_key, created_at_ms, updated_at_ms, paid_at_ms";

struct OrderRowRaw {
    rowid: i64,
    public_id: String,
    email: String,
    status: String,
    currency: String,
    total_cents: i64,
    payment_ref: Option<String>,
    idempotency_key: Option<String>,
    created_at_ms: i64,
    updated_at_ms: i64,
    paid_at_ms: Option<i64>,
}

fn row_to_order_raw(row: &Row<'_>) -> Result<OrderRowRaw, rusqlite::Error> {
    Ok(OrderRowRaw {
        rowid: row.get(0)?,
        public_id: row.get(1)?,
        email: row.get(2)?,
        status: row.get(3)?,
        currency: row.get(4)?,
        total_cents: row.get(5)?,
        payment_ref: row.get(6)?,
        idempotency_key: row.get(7)?,
        created_at_ms: row.get(8)?,
        updated_at_ms: row.get(9)?,
        paid_at_ms: row.get(10)?,
    })
}

fn load_lines(conn: &Connection, order_rowid: i64) -> Result<Vec<OrderLine>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT product_slug, name, unit_price_cents, quantity, line_total_cents
             FROM order_lines WHERE order_id = ?1 ORDER BY id",
        )
        .map_err(StoreError::from_sqlite)?;
    let rows = stmt
        .query_map(params![order_rowid], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })
        .map_err(StoreError::from_sqlite)?;
    let mut lines = Vec::new();
    for row in rows {
        let (slug, name, unit_price_cents, quantity, line_total_cents) =
            row.map_err(StoreError::from_sqlite)?;
        lines.push(OrderLine {
            product_slug: ProductSlug::parse(&slug)
                .map_err(|e| StoreError::corrupt(format!("order line slug: {e}")))?,
            name,
            unit_price_cents,
            quantity: u32::try_from(quantity)
                .map_err(|_| StoreError::corrupt("order line quantity out of range"))?,
            line_total_cents,
        });
    }
    Ok(lines)
}

fn assemble_order(conn: &Connection, raw: OrderRowRaw) -> Result<Order, StoreError> {
    let lines = load_lines(conn, raw.rowid)?;
    Ok(Order {
        id: OrderId::parse(&raw.public_id)
            .map_err(|e| StoreError::corrupt(format!("order public_id: {e}")))?,
        email: EmailAddress::parse(&raw.email)
            .map_err(|e| StoreError::corrupt(format!("order email: {e}")))?,
        status: OrderStatus::parse_str(&raw.status)
            .ok_or_else(|| StoreError::corrupt(format!("order status {:?}", raw.status)))?,
        currency: Currency::parse_str(&raw.currency)
            .ok_or_else(|| StoreError::corrupt(format!("order currency {:?}", raw.currency)))?,
        total_cents: raw.total_cents,
        payment_ref: raw.payment_ref,
        idempotency_key: raw.idempotency_key,
        lines,
        created_at_ms: ms_from_db(raw.created_at_ms, "orders.created_at_ms")?,
        updated_at_ms: ms_from_db(raw.updated_at_ms, "orders.updated_at_ms")?,
        paid_at_ms: optional_ms_from_db(raw.paid_at_ms, "orders.paid_at_ms")?,
    })
}

fn order_by_where(
    conn: &Connection,
    clause: &str,
    value: &str,
) -> Result<Option<Order>, StoreError> {
    let raw = conn
        .query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {clause} = ?1"),
            params![value],
            row_to_order_raw,
        )
        .optional()
        .map_err(StoreError::from_sqlite)?;
    raw.map(|r| assemble_order(conn, r)).transpose()
}

impl Store {
    /// Creates the order transactionally: catalog lookups, snapshots, and
    /// totals all happen under one write. A spent idempotency key returns
    /// the original order instead of a duplicate.
    pub fn create_order(
        &self,
        draft: &OrderDraft,
        id: &OrderId,
        now_ms: u64,
    ) -> Result<CreateOrderOutcome, StoreError> {
        draft
            .validate()
            .map_err(|e| StoreError::constraint(e.to_string()))?;

        let mut conn = self.conn()?;
        if let Some(key) = &draft.idempotency_key {
            if let Some(existing) = order_by_where(&conn, "idempotency_key", key)? {
                return Ok(CreateOrderOutcome::Replayed(existing));
            }
        }

        let tx = conn.transaction().map_err(StoreError::from_sqlite)?;
        let mut currency: Option<Currency> = None;
        let mut lines: Vec<OrderLine> = Vec::with_capacity(draft.lines.len());
        for item in &draft.lines {
            let found: Option<(String, i64, String, bool)> = tx
                .query_row(
                    "SELECT name, price_cents, currency, active FROM products WHERE slug = ?1",
                    params![item.slug.as_str()],
                    |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    },
                )
                .optional()
                .map_err(StoreError::from_sqlite)?;
            let Some((name, price_cents, currency_str, active)) = found else {
                return Err(StoreError::constraint(format!(
                    "unknown product {}",
                    item.slug
                )));
            };
            if !active {
                return Err(StoreError::constraint(format!(
                    "product {} is not available",
                    item.slug
                )));
            }
            let line_currency = Currency::parse_str(&currency_str)
                .ok_or_else(|| StoreError::corrupt(format!("product currency {currency_str:?}")))?;
            match currency {
                None => currency = Some(line_currency),
                Some(existing) if existing == line_currency => {}
                Some(_) => {
                    return Err(StoreError::constraint(
                        "order mixes catalog currencies".to_string(),
                    ))
                }
            }
            let line_total_cents = compute_line_total(price_cents, line_currency, item.quantity)
                .map_err(|e| StoreError::constraint(e.to_string()))?;
            lines.push(OrderLine {
                product_slug: item.slug.clone(),
                name,
                unit_price_cents: price_cents,
                quantity: item.quantity,
                line_total_cents,
            });
        }
        let currency = currency
            .ok_or_else(|| StoreError::constraint("order has no items".to_string()))?;
        let total_cents = compute_order_total(&lines, currency)
            .map_err(|e| StoreError::constraint(e.to_string()))?;

        let inserted = tx.execute(
            "INSERT INTO orders (public_id, email, status, currency, total_cents,
                                 payment_ref, idempotency_key, created_at_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?7)",
            params![
                id.as_str(),
                draft.email.as_str(),
                OrderStatus::Pending.as_str(),
                currency.as_str(),
                total_cents,
                draft.idempotency_key,
                now_ms as i64,
            ],
        );
        if let Err(err) = inserted {
            let err = StoreError::from_sqlite(err);
            drop(tx);
            // Lost an idempotency race: surface the winner.
            if err.is_constraint() {
                if let Some(key) = &draft.idempotency_key {
                    if let Some(existing) = order_by_where(&conn, "idempotency_key", key)? {
                        return Ok(CreateOrderOutcome::Replayed(existing));
                    }
                }
            }
            return Err(err);
        }
        let order_rowid = tx.last_insert_rowid();
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO order_lines (order_id, product_slug, name, unit_price_cents,
                                              quantity, line_total_cents)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(StoreError::from_sqlite)?;
            for line in &lines {
                stmt.execute(params![
                    order_rowid,
                    line.product_slug.as_str(),
                    line.name,
                    line.unit_price_cents,
                    line.quantity,
                    line.line_total_cents,
                ])
                .map_err(StoreError::from_sqlite)?;
            }
        }
        tx.commit().map_err(StoreError::from_sqlite)?;

        Ok(CreateOrderOutcome::Created(Order {
            id: id.clone(),
            email: draft.email.clone(),
            status: OrderStatus::Pending,
            currency,
            total_cents,
            payment_ref: None,
            idempotency_key: draft.idempotency_key.clone(),
            lines,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            paid_at_ms: None,
        }))
    }

    pub fn set_payment_ref(
        &self,
        id: &OrderId,
        payment_ref: &str,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE orders SET payment_ref = ?2, updated_at_ms = ?3 WHERE public_id = ?1",
                params![id.as_str(), payment_ref, now_ms as i64],
            )
            .map_err(StoreError::from_sqlite)?;
        if changed == 0 {
            return Err(StoreError::not_found(format!("order {id}")));
        }
        Ok(())
    }

    pub fn order_by_public_id(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let conn = self.conn()?;
        order_by_where(&conn, "public_id", id.as_str())
    }

    pub fn order_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>, StoreError> {
        let conn = self.conn()?;
        order_by_where(&conn, "payment_ref", payment_ref)
    }

    /// Moves an order along its lifecycle. Illegal transitions come back
    /// as Conflict with both states named, which is what the webhook log
    /// and admin responses want to show.
    pub fn set_order_status(
        &self,
        id: &OrderId,
        next: OrderStatus,
        now_ms: u64,
    ) -> Result<Order, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(StoreError::from_sqlite)?;
        let current_str: String = tx
            .query_row(
                "SELECT status FROM orders WHERE public_id = ?1",
                params![id.as_str()],
                |r| r.get(0),
            )
            .optional()
            .map_err(StoreError::from_sqlite)?
            .ok_or_else(|| StoreError::not_found(format!("order {id}")))?;
        let current = OrderStatus::parse_str(&current_str)
            .ok_or_else(|| StoreError::corrupt(format!("order status {current_str:?}")))?;
        if !current.can_transition_to(next) {
            return Err(StoreError::conflict(format!(
                "order {id} cannot move {} -> {}",
                current.as_str(),
                next.as_str()
            )));
        }
        if next == OrderStatus::Paid {
            tx.execute(
                "UPDATE orders SET status = ?2, updated_at_ms = ?3, paid_at_ms = ?3
                 WHERE public_id = ?1",
                params![id.as_str(), next.as_str(), now_ms as i64],
            )
            .map_err(StoreError::from_sqlite)?;
        } else {
            tx.execute(
                "UPDATE orders SET status = ?2, updated_at_ms = ?3 WHERE public_id = ?1",
                params![id.as_str(), next.as_str(), now_ms as i64],
            )
            .map_err(StoreError::from_sqlite)?;
        }
        let raw = tx
            .query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE public_id = ?1"),
                params![id.as_str()],
                row_to_order_raw,
            )
            .map_err(StoreError::from_sqlite)?;
        let order = assemble_order(&tx, raw)?;
        tx.commit().map_err(StoreError::from_sqlite)?;
        Ok(order)
    }

    pub fn list_orders(
        &self,
        status: Option<OrderStatus>,
        created_window_ms: Option<(i64, i64)>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Order>, u64), StoreError> {
        let conn = self.conn()?;
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(status) = status {
            clauses.push("status = ?");
            values.push(Value::from(status.as_str().to_string()));
        }
        if let Some((start, end)) = created_window_ms {
            clauses.push("created_at_ms >= ?");
            values.push(Value::from(start));
            clauses.push("created_at_ms < ?");
            values.push(Value::from(end));
        }
        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM orders {filter}"),
                params_from_iter(values.iter()),
                |r| r.get(0),
            )
            .map_err(StoreError::from_sqlite)?;
        values.push(Value::from(i64::from(limit)));
        values.push(Value::from(i64::from(offset)));
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders {filter}
                 ORDER BY created_at_ms DESC, id DESC LIMIT ? OFFSET ?"
            ))
            .map_err(StoreError::from_sqlite)?;
        let raws = stmt
            .query_map(params_from_iter(values.iter()), row_to_order_raw)
            .map_err(StoreError::from_sqlite)?;
        let mut raw_rows = Vec::new();
        for raw in raws {
            raw_rows.push(raw.map_err(StoreError::from_sqlite)?);
        }
        drop(stmt);
        let mut orders = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            orders.push(assemble_order(&conn, raw)?);
        }
        Ok((orders, total.max(0) as u64))
    }

    /// Orders that settled money inside the window, keyed by when they
    /// were paid. This is the close job's order-side input.
    pub fn settled_orders_in_window(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Order>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders
                 WHERE paid_at_ms IS NOT NULL AND paid_at_ms >= ?1 AND paid_at_ms < ?2
                   AND status IN ('paid', 'fulfilled', 'refunded')
                 ORDER BY paid_at_ms, id"
            ))
            .map_err(StoreError::from_sqlite)?;
        let raws = stmt
            .query_map(params![start_ms, end_ms], row_to_order_raw)
            .map_err(StoreError::from_sqlite)?;
        let mut raw_rows = Vec::new();
        for raw in raws {
            raw_rows.push(raw.map_err(StoreError::from_sqlite)?);
        }
        drop(stmt);
        let mut orders = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            orders.push(assemble_order(&conn, raw)?);
        }
        Ok(orders)
    }
}
