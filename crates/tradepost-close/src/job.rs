// SPDX-License-Identifier: Apache-2.0

use crate::error::CloseError;
use tradepost_model::{BusinessDate, CloseSource};

/// Offsets past +-18h do not exist on the real clock face.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseOptions {
    pub date: BusinessDate,
    pub source: CloseSource,
    pub force: bool,
    pub utc_offset_minutes: i32,
}

/// Validated close work order: the options plus the utc window the
/// local day maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseJob {
    pub options: CloseOptions,
    window_ms: (i64, i64),
}

impl CloseJob {
    /// Rejects dates the shop has not lived through yet and offsets no
    /// timezone uses. `now_ms` anchors "today" so callers and tests agree
    /// on what the future is.
    pub fn from_options(options: CloseOptions, now_ms: u64) -> Result<Self, CloseError> {
        if options.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(CloseError::options(format!(
                "utc offset {} minutes is outside +-{MAX_UTC_OFFSET_MINUTES}",
                options.utc_offset_minutes
            )));
        }
        let today = BusinessDate::from_utc_millis(now_ms as i64, options.utc_offset_minutes)
            .ok_or_else(|| CloseError::options("clock is outside representable range"))?;
        if options.date > today {
            return Err(CloseError::options(format!(
                "close date {} is in the future (today is {today})",
                options.date
            )));
        }
        let window_ms = options
            .date
            .day_window_utc_ms(options.utc_offset_minutes)
            .ok_or_else(|| {
                CloseError::options(format!("date {} has no utc window", options.date))
            })?;
        Ok(Self { options, window_ms })
    }

    /// Utc `[start, end)` in milliseconds for the job's local day.
    #[must_use]
    pub const fn window_ms(&self) -> (i64, i64) {
        self.window_ms
    }

    #[must_use]
    pub const fn date(&self) -> BusinessDate {
        self.options.date
    }
}
