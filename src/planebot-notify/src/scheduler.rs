//! Cron-driven daily runs.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::BridgeResult;

/// A cron schedule evaluated in one timezone.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    schedule: Schedule,
    timezone: Tz,
}

impl DailySchedule {
    pub fn new(schedule: Schedule, timezone: Tz) -> Self {
        Self { schedule, timezone }
    }

    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        Ok(Self::new(config.schedule()?, config.timezone()?))
    }

    /// First fire time strictly after `after`, in the schedule's timezone.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Tz>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
    }
}

/// Run `job` at every fire time until shutdown is signalled.
///
/// The job gets the fire date in the schedule's timezone and runs to
/// completion before the next fire time is computed; a fire time missed
/// while it ran is skipped.
pub async fn run_schedule<F, Fut>(
    schedule: DailySchedule,
    mut shutdown: watch::Receiver<bool>,
    mut job: F,
) where
    F: FnMut(NaiveDate) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut last_fire: Option<DateTime<Utc>> = None;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let now = Utc::now();
        let from = last_fire.map_or(now, |last| last.max(now));
        let Some(next) = schedule.next_after(from) else {
            warn!("Schedule has no future fire time, stopping scheduler");
            break;
        };

        let wait = (next.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        debug!(next = %next, ?wait, "Waiting for next scheduled run");

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(wait) => {
                info!(fire_time = %next, "Running scheduled job");
                last_fire = Some(next.with_timezone(&Utc));
                job(next.date_naive()).await;
            }
        }
    }

    info!("Scheduler stopped");
}
