//! # Retention Housekeeper
//!
//! Periodically deletes old execution records. One sweep computes a single
//! global cutoff, the oldest of all per-function retention cutoffs, and
//! deletes every execution created before it. A function with a short
//! retention therefore keeps records for as long as the longest retention
//! in the system.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use croner::Cron;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::errors::{FunctionError, FunctionResult};
use super::function::{Pagination, DEFAULT_RETENTION_DAYS, SECONDS_PER_DAY};
use super::store::ExecutionStore;

/// Top of every hour
pub const DEFAULT_SCHEDULE: &str = "0 * * * *";

/// Page size used while scanning functions for their retention
const SCAN_PAGE: usize = 500;

/// Execution retention sweeper
#[derive(Debug, Clone)]
pub struct RetentionHousekeeper {
    store: Arc<dyn ExecutionStore>,
}

impl RetentionHousekeeper {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }

    /// The global cutoff at `now` (unix seconds)
    pub fn cutoff(&self, now: i64) -> FunctionResult<i64> {
        let mut cutoff = now - i64::from(DEFAULT_RETENTION_DAYS) * SECONDS_PER_DAY;
        let mut page = Pagination::new(SCAN_PAGE, 0);

        loop {
            let (functions, total) = self.store.list_functions(page)?;
            for function in &functions {
                let function_cutoff = function.retention_cutoff(now);
                debug!(
                    function_id = %function.id,
                    retention_days = function.effective_retention_days(),
                    cutoff = function_cutoff,
                    "checked function retention"
                );
                cutoff = cutoff.min(function_cutoff);
            }

            page = page.next();
            if functions.is_empty() || page.offset >= total {
                break;
            }
        }

        Ok(cutoff)
    }

    /// Run one sweep; returns the number of deleted executions
    pub fn sweep(&self, now: i64) -> FunctionResult<u64> {
        let cutoff = self.cutoff(now)?;
        let deleted = self.store.delete_old_executions(cutoff)?;
        info!(deleted, cutoff, "old executions cleanup completed");
        Ok(deleted)
    }

    /// Sweep on every tick of `schedule` until `shutdown` flips to true
    ///
    /// A failed sweep is logged and the loop keeps going.
    pub async fn run(
        self,
        schedule: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> FunctionResult<()> {
        let cron = parse_schedule(schedule)?;
        info!(schedule, "housekeeping scheduler started");

        loop {
            let next = next_tick(&cron, Utc::now())?;
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            debug!(next = %next, "next housekeeping sweep scheduled");

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.sweep(Utc::now().timestamp()) {
                        error!(error = %e, "failed to cleanup old executions");
                    }
                }
            }
        }

        info!("housekeeping scheduler stopped");
        Ok(())
    }
}

/// Parse a five-field cron expression
pub fn parse_schedule(schedule: &str) -> FunctionResult<Cron> {
    Cron::new(schedule)
        .parse()
        .map_err(|e| FunctionError::InvalidCron(format!("{}: {}", schedule, e)))
}

fn next_tick(cron: &Cron, after: DateTime<Utc>) -> FunctionResult<DateTime<Utc>> {
    cron.find_next_occurrence(&after, false)
        .map_err(|e| FunctionError::InvalidCron(e.to_string()))
}
