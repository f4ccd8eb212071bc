// SPDX-License-Identifier: Apache-2.0

//! Background close scheduler. Once the local clock passes the
//! configured hour it closes yesterday if nobody else has. Discrepant
//! runs are left for a human; only missing or failed runs are picked up.

use crate::AppState;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};
use tradepost_close::{run_close, CloseJob, CloseOptions, SummaryMail};
use tradepost_core::unix_millis;
use tradepost_model::{BusinessDate, CloseRunStatus, CloseSource, EmailAddress};

const TICK: Duration = Duration::from_secs(60);
const FAILED_RETRY_AFTER_MS: u64 = 3_600_000;

pub async fn run_scheduler(state: AppState) {
    let mut tick = interval(TICK);
    loop {
        tick.tick().await;
        if let Err(e) = maybe_close_yesterday(&state).await {
            warn!(error = %e, "scheduled close attempt failed");
        }
    }
}

fn local_hour(now_ms: u64, utc_offset_minutes: i32) -> u32 {
    let local_ms = now_ms as i64 + i64::from(utc_offset_minutes) * 60_000;
    ((local_ms.rem_euclid(86_400_000)) / 3_600_000) as u32
}

async fn maybe_close_yesterday(state: &AppState) -> Result<(), String> {
    let close = &state.config.close;
    let now_ms = unix_millis();
    if local_hour(now_ms, close.utc_offset_minutes) < close.autorun_local_hour {
        return Ok(());
    }
    let yesterday = BusinessDate::from_utc_millis(now_ms as i64, close.utc_offset_minutes)
        .and_then(|d| d.pred())
        .ok_or_else(|| "cannot derive yesterday".to_string())?;

    match state.store.close_run_live(yesterday) {
        Ok(None) => {}
        Ok(Some(run)) => {
            if run.status != CloseRunStatus::Failed {
                return Ok(());
            }
            // Failed runs retry hourly, not every tick.
            let finished = run.finished_at_ms.unwrap_or(run.started_at_ms);
            if now_ms.saturating_sub(finished) < FAILED_RETRY_AFTER_MS {
                return Ok(());
            }
        }
        Err(e) => return Err(e.to_string()),
    }

    let job = CloseJob::from_options(
        CloseOptions {
            date: yesterday,
            source: CloseSource::Scheduler,
            force: false,
            utc_offset_minutes: close.utc_offset_minutes,
        },
        now_ms,
    )
    .map_err(|e| e.to_string())?;
    let summary_to = close
        .summary_to
        .as_deref()
        .and_then(|raw| EmailAddress::parse(raw).ok());
    let summary = summary_to.map(|to| SummaryMail {
        mailer: state.mailer.as_ref(),
        to,
    });
    let report = run_close(
        state.store.as_ref(),
        state.payments.as_ref(),
        summary.as_ref(),
        &job,
    )
    .await
    .map_err(|e| e.to_string())?;
    state
        .metrics
        .observe_close(report.run.status.as_str())
        .await;
    info!(
        date = %yesterday,
        status = report.run.status.as_str(),
        attempt = report.run.attempt,
        "scheduled close finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_hour_respects_the_offset() {
        // 2026-08-22 23:30 UTC.
        let now_ms = 1_787_441_400_000;
        assert_eq!(local_hour(now_ms, 0), 23);
        assert_eq!(local_hour(now_ms, 60), 0);
        assert_eq!(local_hour(now_ms, -120), 21);
        assert_eq!(local_hour(now_ms, 30), 0);
    }
}
