// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use crate::store::{ms_from_db, optional_ms_from_db, Store};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tradepost_model::{
    BusinessDate, CloseDiscrepancy, CloseRun, CloseRunStatus, CloseSource, CloseTotals,
    DiscrepancyKind, OrderId,
};

/// The row claimed for a fresh attempt, plus the attempt it displaced
/// when `force` superseded a balanced run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginCloseOutcome {
    pub run: CloseRun,
    pub superseded_attempt: Option<u32>,
}

const CLOSE_RUN_COLUMNS: &str = "id, business_date, attempt, status, superseded, orders_count, \
                                 gross_cents, refunds_cents, net_cents, gateway_gross_cents, \
                                 gateway_refunds_cents, gateway_fees_cents, delta_cents, \
                                 discrepancy_count, source, error, started_at_ms, finished_at_ms";

struct CloseRunRaw {
    id: i64,
    business_date: String,
    attempt: i64,
    status: String,
    superseded: bool,
    orders_count: i64,
    gross_cents: i64,
    refunds_cents: i64,
    net_cents: i64,
    gateway_gross_cents: i64,
    gateway_refunds_cents: i64,
    gateway_fees_cents: i64,
    delta_cents: i64,
    discrepancy_count: i64,
    source: String,
    error: Option<String>,
    started_at_ms: i64,
    finished_at_ms: Option<i64>,
}

fn row_to_close_raw(row: &Row<'_>) -> Result<CloseRunRaw, rusqlite::Error> {
    Ok(CloseRunRaw {
        id: row.get(0)?,
        business_date: row.get(1)?,
        attempt: row.get(2)?,
        status: row.get(3)?,
        superseded: row.get(4)?,
        orders_count: row.get(5)?,
        gross_cents: row.get(6)?,
        refunds_cents: row.get(7)?,
        net_cents: row.get(8)?,
        gateway_gross_cents: row.get(9)?,
        gateway_refunds_cents: row.get(10)?,
        gateway_fees_cents: row.get(11)?,
        delta_cents: row.get(12)?,
        discrepancy_count: row.get(13)?,
        source: row.get(14)?,
        error: row.get(15)?,
        started_at_ms: row.get(16)?,
        finished_at_ms: row.get(17)?,
    })
}

impl CloseRunRaw {
    fn into_run(self) -> Result<CloseRun, StoreError> {
        Ok(CloseRun {
            id: self.id,
            business_date: BusinessDate::parse(&self.business_date)
                .map_err(|e| StoreError::corrupt(format!("close_runs.business_date: {e}")))?,
            attempt: u32::try_from(self.attempt)
                .map_err(|_| StoreError::corrupt("close_runs.attempt out of range"))?,
            status: CloseRunStatus::parse_str(&self.status)
                .ok_or_else(|| StoreError::corrupt(format!("close run status {:?}", self.status)))?,
            superseded: self.superseded,
            totals: CloseTotals {
                orders_count: self.orders_count.max(0) as u64,
                gross_cents: self.gross_cents,
                refunds_cents: self.refunds_cents,
                net_cents: self.net_cents,
                gateway_gross_cents: self.gateway_gross_cents,
                gateway_refunds_cents: self.gateway_refunds_cents,
                gateway_fees_cents: self.gateway_fees_cents,
                delta_cents: self.delta_cents,
            },
            discrepancy_count: self.discrepancy_count.max(0) as u64,
            source: CloseSource::parse_str(&self.source)
                .ok_or_else(|| StoreError::corrupt(format!("close run source {:?}", self.source)))?,
            error: self.error,
            started_at_ms: ms_from_db(self.started_at_ms, "close_runs.started_at_ms")?,
            finished_at_ms: optional_ms_from_db(self.finished_at_ms, "close_runs.finished_at_ms")?,
        })
    }
}

fn live_run(conn: &Connection, date: BusinessDate) -> Result<Option<CloseRunRaw>, StoreError> {
    conn.query_row(
        &format!(
            "SELECT {CLOSE_RUN_COLUMNS} FROM close_runs
             WHERE business_date = ?1 AND superseded = 0"
        ),
        params![date.to_string()],
        row_to_close_raw,
    )
    .optional()
    .map_err(StoreError::from_sqlite)
}

impl Store {
    /// Claims the next attempt for the date and marks displaced runs
    /// superseded in the same transaction. A Balanced live run stops the
    /// claim unless `force`; Failed and Discrepant runs may always be
    /// retried; a Running run always conflicts.
    pub fn begin_close_run(
        &self,
        date: BusinessDate,
        source: CloseSource,
        force: bool,
        now_ms: u64,
    ) -> Result<BeginCloseOutcome, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(StoreError::from_sqlite)?;

        let mut superseded_attempt = None;
        if let Some(raw) = live_run(&tx, date)? {
            let live = raw.into_run()?;
            match live.status {
                CloseRunStatus::Running => {
                    return Err(StoreError::conflict(format!(
                        "close for {date} is already running (attempt {})",
                        live.attempt
                    )));
                }
                CloseRunStatus::Balanced if !force => {
                    return Err(StoreError::conflict(format!(
                        "close for {date} already balanced (attempt {}); re-run requires force",
                        live.attempt
                    )));
                }
                _ => {
                    tx.execute(
                        "UPDATE close_runs SET superseded = 1
                         WHERE business_date = ?1 AND superseded = 0",
                        params![date.to_string()],
                    )
                    .map_err(StoreError::from_sqlite)?;
                    superseded_attempt = Some(live.attempt);
                }
            }
        }

        let attempt: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(attempt), 0) + 1 FROM close_runs WHERE business_date = ?1",
                params![date.to_string()],
                |r| r.get(0),
            )
            .map_err(StoreError::from_sqlite)?;
        tx.execute(
            "INSERT INTO close_runs (business_date, attempt, status, source, started_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                date.to_string(),
                attempt,
                CloseRunStatus::Running.as_str(),
                source.as_str(),
                now_ms as i64,
            ],
        )
        .map_err(StoreError::from_sqlite)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(StoreError::from_sqlite)?;

        Ok(BeginCloseOutcome {
            run: CloseRun {
                id,
                business_date: date,
                attempt: attempt.max(1) as u32,
                status: CloseRunStatus::Running,
                superseded: false,
                totals: CloseTotals::default(),
                discrepancy_count: 0,
                source,
                error: None,
                started_at_ms: now_ms,
                finished_at_ms: None,
            },
            superseded_attempt,
        })
    }

    /// Lands the run in a terminal state with its totals and discrepancy
    /// rows in one transaction. Finishing anything but a Running row is a
    /// conflict; terminal runs are immutable.
    pub fn finish_close_run(
        &self,
        run_id: i64,
        status: CloseRunStatus,
        totals: &CloseTotals,
        discrepancies: &[CloseDiscrepancy],
        error: Option<&str>,
        finished_at_ms: u64,
    ) -> Result<CloseRun, StoreError> {
        if !CloseRunStatus::Running.can_transition_to(status) {
            return Err(StoreError::constraint(format!(
                "close run cannot finish as {}",
                status.as_str()
            )));
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(StoreError::from_sqlite)?;
        let current: String = tx
            .query_row(
                "SELECT status FROM close_runs WHERE id = ?1",
                params![run_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(StoreError::from_sqlite)?
            .ok_or_else(|| StoreError::not_found(format!("close run {run_id}")))?;
        let current = CloseRunStatus::parse_str(&current)
            .ok_or_else(|| StoreError::corrupt(format!("close run status {current:?}")))?;
        if !current.can_transition_to(status) {
            return Err(StoreError::conflict(format!(
                "close run {run_id} cannot move {} -> {}",
                current.as_str(),
                status.as_str()
            )));
        }

        tx.execute(
            "UPDATE close_runs SET
               status = ?2, orders_count = ?3, gross_cents = ?4, refunds_cents = ?5,
               net_cents = ?6, gateway_gross_cents = ?7, gateway_refunds_cents = ?8,
               gateway_fees_cents = ?9, delta_cents = ?10, discrepancy_count = ?11,
               error = ?12, finished_at_ms = ?13
             WHERE id = ?1",
            params![
                run_id,
                status.as_str(),
                totals.orders_count as i64,
                totals.gross_cents,
                totals.refunds_cents,
                totals.net_cents,
                totals.gateway_gross_cents,
                totals.gateway_refunds_cents,
                totals.gateway_fees_cents,
                totals.delta_cents,
                discrepancies.len() as i64,
                error,
                finished_at_ms as i64,
            ],
        )
        .map_err(StoreError::from_sqlite)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO close_discrepancies
                       (run_id, kind, order_public_id, charge_id, detail, amount_delta_cents)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(StoreError::from_sqlite)?;
            for d in discrepancies {
                stmt.execute(params![
                    run_id,
                    d.kind.as_str(),
                    d.order_id.as_ref().map(OrderId::as_str),
                    d.charge_id,
                    d.detail,
                    d.amount_delta_cents,
                ])
                .map_err(StoreError::from_sqlite)?;
            }
        }
        let raw = tx
            .query_row(
                &format!("SELECT {CLOSE_RUN_COLUMNS} FROM close_runs WHERE id = ?1"),
                params![run_id],
                row_to_close_raw,
            )
            .map_err(StoreError::from_sqlite)?;
        let run = raw.into_run()?;
        tx.commit().map_err(StoreError::from_sqlite)?;
        Ok(run)
    }

    /// The date's non-superseded run, if any.
    pub fn close_run_live(&self, date: BusinessDate) -> Result<Option<CloseRun>, StoreError> {
        let conn = self.conn()?;
        live_run(&conn, date)?.map(CloseRunRaw::into_run).transpose()
    }

    pub fn list_close_runs(
        &self,
        include_superseded: bool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CloseRun>, StoreError> {
        let conn = self.conn()?;
        let filter = if include_superseded {
            ""
        } else {
            "WHERE superseded = 0"
        };
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CLOSE_RUN_COLUMNS} FROM close_runs {filter}
                 ORDER BY business_date DESC, attempt DESC LIMIT ?1 OFFSET ?2"
            ))
            .map_err(StoreError::from_sqlite)?;
        let raws = stmt
            .query_map(params![limit, offset], row_to_close_raw)
            .map_err(StoreError::from_sqlite)?;
        let mut runs = Vec::new();
        for raw in raws {
            runs.push(raw.map_err(StoreError::from_sqlite)?.into_run()?);
        }
        Ok(runs)
    }

    pub fn close_run_discrepancies(
        &self,
        run_id: i64,
    ) -> Result<Vec<CloseDiscrepancy>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT kind, order_public_id, charge_id, detail, amount_delta_cents
                 FROM close_discrepancies WHERE run_id = ?1 ORDER BY id",
            )
            .map_err(StoreError::from_sqlite)?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(StoreError::from_sqlite)?;
        let mut discrepancies = Vec::new();
        for row in rows {
            let (kind, order_id, charge_id, detail, amount_delta_cents) =
                row.map_err(StoreError::from_sqlite)?;
            discrepancies.push(CloseDiscrepancy {
                kind: DiscrepancyKind::parse_str(&kind)
                    .ok_or_else(|| StoreError::corrupt(format!("discrepancy kind {kind:?}")))?,
                order_id: order_id
                    .map(|id| {
                        OrderId::parse(&id)
                            .map_err(|e| StoreError::corrupt(format!("discrepancy order id: {e}")))
                    })
                    .transpose()?,
                charge_id,
                detail,
                amount_delta_cents,
            });
        }
        Ok(discrepancies)
    }
}
