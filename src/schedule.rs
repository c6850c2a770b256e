//! Schedule evaluation: next fire time and lease duration.
//!
//! Pure functions over the `cron` crate's 6/7-field expression parser
//! (sec min hour dom month dow [year]). Safe to call concurrently.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::CronError;

/// Earliest fire time strictly after `after`.
pub fn next_fire(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, CronError> {
    let schedule = parse(expr)?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| CronError::ScheduleExhausted {
            expr: expr.to_string(),
        })
}

/// Lease duration for a lock acquired at `now`:
/// `(next fire − now) × (1 + lag_factor)`.
///
/// The base is the job's own inter-fire interval, so the lock self-expires
/// just past the point it would be needed again; the lag factor absorbs
/// clock skew and tick jitter between replicas.
pub fn lease_duration(
    expr: &str,
    now: DateTime<Utc>,
    lag_factor: f64,
) -> Result<Duration, CronError> {
    let fire = next_fire(expr, now)?;
    // `fire` is strictly after `now`, so the conversion cannot underflow.
    let until = (fire - now).to_std().unwrap_or(Duration::ZERO);
    Ok(until.mul_f64(1.0 + lag_factor))
}

pub(crate) fn parse(expr: &str) -> Result<cron::Schedule, CronError> {
    cron::Schedule::from_str(expr).map_err(|e| CronError::InvalidCronExpression {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}
