// SPDX-License-Identifier: Apache-2.0

use crate::error::{CloseError, CloseErrorCode};
use crate::job::CloseJob;
use crate::reconcile::{order_totals, reconcile};
use tracing::{info, warn};
use tradepost_core::unix_millis;
use tradepost_gateways::{Email, Mailer, PaymentGateway};
use tradepost_model::{
    CloseDiscrepancy, CloseRun, CloseRunStatus, CloseTotals, EmailAddress,
};
use tradepost_store::{Store, StoreErrorCode};

/// Where the end-of-run summary goes when ops wants one.
pub struct SummaryMail<'a> {
    pub mailer: &'a dyn Mailer,
    pub to: EmailAddress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReport {
    pub run: CloseRun,
    pub discrepancies: Vec<CloseDiscrepancy>,
    pub superseded_attempt: Option<u32>,
}

/// Runs the close for the job's date. The run row is claimed up front
/// and always lands terminal: Balanced, Discrepant, or Failed when the
/// gateway cannot be read. Only claim and bookkeeping failures surface
/// as errors.
pub async fn run_close(
    store: &Store,
    gateway: &dyn PaymentGateway,
    summary: Option<&SummaryMail<'_>>,
    job: &CloseJob,
) -> Result<CloseReport, CloseError> {
    let date = job.date();
    let begun = store
        .begin_close_run(date, job.options.source, job.options.force, unix_millis())
        .map_err(|e| {
            if e.code == StoreErrorCode::Conflict {
                CloseError::already_closed(e.message)
            } else {
                e.into()
            }
        })?;
    let run_id = begun.run.id;
    info!(
        date = %date,
        attempt = begun.run.attempt,
        source = job.options.source.as_str(),
        superseded_attempt = begun.superseded_attempt,
        "close run claimed"
    );

    let (start_ms, end_ms) = job.window_ms();
    let orders = match store.settled_orders_in_window(start_ms, end_ms) {
        Ok(orders) => orders,
        Err(e) => {
            fail_run(store, run_id, &CloseTotals::default(), &e.to_string());
            return Err(e.into());
        }
    };

    let charges = match gateway.charges_on(start_ms, end_ms).await {
        Ok(charges) => charges,
        Err(e) => {
            // Order-side money is already known; record it with the failure.
            let (orders_count, gross_cents, refunds_cents) = order_totals(&orders);
            let net_cents = gross_cents - refunds_cents;
            let totals = CloseTotals {
                orders_count,
                gross_cents,
                refunds_cents,
                net_cents,
                delta_cents: net_cents,
                ..CloseTotals::default()
            };
            warn!(date = %date, error = %e, "close run failed reading gateway charges");
            let run = store.finish_close_run(
                run_id,
                CloseRunStatus::Failed,
                &totals,
                &[],
                Some(&e.to_string()),
                unix_millis(),
            )?;
            let report = CloseReport {
                run,
                discrepancies: Vec::new(),
                superseded_attempt: begun.superseded_attempt,
            };
            send_summary(summary, &report).await;
            return Ok(report);
        }
    };

    let outcome = reconcile(&orders, &charges);
    let status = if outcome.discrepancies.is_empty() {
        CloseRunStatus::Balanced
    } else {
        CloseRunStatus::Discrepant
    };
    let run = store.finish_close_run(
        run_id,
        status,
        &outcome.totals,
        &outcome.discrepancies,
        None,
        unix_millis(),
    )?;
    info!(
        date = %date,
        status = status.as_str(),
        orders = outcome.totals.orders_count,
        net_cents = outcome.totals.net_cents,
        delta_cents = outcome.totals.delta_cents,
        discrepancies = outcome.discrepancies.len(),
        "close run finished"
    );
    let report = CloseReport {
        run,
        discrepancies: outcome.discrepancies,
        superseded_attempt: begun.superseded_attempt,
    };
    send_summary(summary, &report).await;
    Ok(report)
}

fn fail_run(store: &Store, run_id: i64, totals: &CloseTotals, error: &str) {
    // Best effort; the original failure is the one worth returning.
    if let Err(e) = store.finish_close_run(
        run_id,
        CloseRunStatus::Failed,
        totals,
        &[],
        Some(error),
        unix_millis(),
    ) {
        warn!(run_id, error = %e, "could not mark close run failed");
    }
}

async fn send_summary(summary: Option<&SummaryMail<'_>>, report: &CloseReport) {
    let Some(summary) = summary else { return };
    let email = Email {
        to: summary.to.clone(),
        subject: format!(
            "Daily close {}: {}",
            report.run.business_date,
            report.run.status.as_str()
        ),
        text: summary_text(report),
    };
    if let Err(e) = summary.mailer.send(&email).await {
        warn!(date = %report.run.business_date, error = %e, "close summary mail not sent");
    }
}

fn summary_text(report: &CloseReport) -> String {
    let t = &report.run.totals;
    let mut text = format!(
        "Close {} attempt {} finished {}.\n\norders: {}\ngross: {} cents\nrefunds: {} cents\n\
         net: {} cents\ngateway net: {} cents\ndelta: {} cents\ndiscrepancies: {}\n",
        report.run.business_date,
        report.run.attempt,
        report.run.status.as_str(),
        t.orders_count,
        t.gross_cents,
        t.refunds_cents,
        t.net_cents,
        t.gateway_gross_cents - t.gateway_refunds_cents,
        t.delta_cents,
        report.discrepancies.len(),
    );
    if let Some(error) = &report.run.error {
        text.push_str(&format!("error: {error}\n"));
    }
    for d in &report.discrepancies {
        text.push_str(&format!(
            "- {} {} ({} cents)\n",
            d.kind.as_str(),
            d.detail,
            d.amount_delta_cents
        ));
    }
    text
}
