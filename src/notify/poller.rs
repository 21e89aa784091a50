use super::hours::BusinessHours;
use super::{Notifier, NotifyOutcome};
use crate::api::jira::JiraClient;
use crate::errors::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckSummary {
    pub found: usize,
    pub sent: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Closed,
    Checked(CheckSummary),
}

/// Periodically asks Jira for fresh assignments and notifies assignees.
pub struct Poller {
    jira: JiraClient,
    notifier: Arc<Notifier>,
    hours: BusinessHours,
    interval: Duration,
    lookback_minutes: u64,
}

impl Poller {
    pub fn new(
        jira: JiraClient,
        notifier: Arc<Notifier>,
        hours: BusinessHours,
        interval_minutes: u64,
        lookback_minutes: u64,
    ) -> Self {
        Self {
            jira,
            notifier,
            hours,
            interval: Duration::from_secs(interval_minutes.saturating_mul(60)),
            lookback_minutes,
        }
    }

    pub async fn check_once(&self, now: DateTime<Utc>) -> Result<CheckOutcome> {
        if !self.hours.is_open(now) {
            return Ok(CheckOutcome::Closed);
        }

        debug!("checking for new assignments");
        let tickets = self.jira.recent_assignments(self.lookback_minutes).await?;

        let mut summary = CheckSummary {
            found: tickets.len(),
            ..Default::default()
        };

        for ticket in tickets.iter().filter(|t| t.fields.assignee.is_some()) {
            match self.notifier.notify(ticket, now).await {
                Ok(NotifyOutcome::Sent) => summary.sent += 1,
                Ok(NotifyOutcome::Duplicate) => summary.duplicates += 1,
                Ok(NotifyOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(ticket = %ticket.key, error = %e, "failed to notify assignee");
                }
            }
        }

        Ok(CheckOutcome::Checked(summary))
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            every_secs = self.interval.as_secs(),
            window = %self.hours,
            "assignment monitoring started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.check_once(Utc::now()).await {
                        Ok(CheckOutcome::Closed) => debug!("outside business hours, skipping check"),
                        Ok(CheckOutcome::Checked(summary)) if summary.found > 0 => {
                            info!(
                                found = summary.found,
                                sent = summary.sent,
                                duplicates = summary.duplicates,
                                skipped = summary.skipped,
                                failed = summary.failed,
                                "processed assignments"
                            );
                        }
                        Ok(CheckOutcome::Checked(_)) => {}
                        Err(e) => warn!(error = %e, "assignment check failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("assignment monitoring stopped");
                        break;
                    }
                }
            }
        }
    }
}
