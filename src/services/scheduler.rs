// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Backup scheduler loop.
//!
//! Wakes every poll interval, asks the user store for users whose backup
//! time falls on the minutes that became due since the last poll, and
//! dispatches one orchestration run per eligible user. Runs are:
//! - bounded by a semaphore so a busy minute cannot flood the external APIs
//! - de-duplicated per username through an in-flight set
//! - tracked so shutdown can wait for them (or cancel them after a grace period)

use crate::config::Config;
use crate::db::UserStore;
use crate::error::Result;
use crate::models::User;
use crate::services::backup::BackupOrchestrator;
use crate::time_utils::{due_minutes, MatchKey};
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use validator::Validate;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Users returned by the store for the due minutes
    pub matched: usize,
    /// Runs started
    pub dispatched: usize,
    /// Skipped: no linked cloud account or no category to back up
    pub ineligible: usize,
    /// Skipped: user record could not be decoded or failed validation
    pub invalid: usize,
    /// Skipped: a run for the same user is still going
    pub in_flight: usize,
}

/// Removes a username from the in-flight set when its run ends.
struct InFlightGuard {
    set: Arc<DashSet<String>>,
    username: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.username);
    }
}

/// The long-lived polling loop.
pub struct Scheduler {
    store: Arc<dyn UserStore>,
    orchestrator: Arc<BackupOrchestrator>,
    permits: Arc<Semaphore>,
    in_flight: Arc<DashSet<String>>,
    tracker: TaskTracker,
    poll_interval: Duration,
    max_catch_up_minutes: u32,
    shutdown_grace: Duration,
    /// Most recent minute whose store query succeeded.
    last_queried: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn UserStore>,
        orchestrator: Arc<BackupOrchestrator>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            orchestrator,
            permits: Arc::new(Semaphore::new(config.max_concurrent_backups.max(1))),
            in_flight: Arc::new(DashSet::new()),
            tracker: TaskTracker::new(),
            poll_interval: config.poll_interval,
            max_catch_up_minutes: config.max_catch_up_minutes,
            shutdown_grace: config.shutdown_grace,
            last_queried: None,
            consecutive_failures: 0,
        }
    }

    /// Number of runs currently dispatched and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Poll until `shutdown` fires, then wind down in-flight runs.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            max_concurrent = self.permits.available_permits(),
            "Scheduler started"
        );

        loop {
            match self.tick(Utc::now()).await {
                Ok(summary) => {
                    self.consecutive_failures = 0;
                    if summary.matched > 0 {
                        tracing::info!(
                            matched = summary.matched,
                            dispatched = summary.dispatched,
                            ineligible = summary.ineligible,
                            invalid = summary.invalid,
                            in_flight = summary.in_flight,
                            "Tick dispatched backups"
                        );
                    }
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    tracing::error!(
                        error = %e,
                        consecutive_failures = self.consecutive_failures,
                        "Polling user store failed, skipping tick"
                    );
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        self.shutdown().await;
    }

    /// Run one poll at `now`: query every due minute and dispatch matches.
    ///
    /// A store failure aborts the tick; the failed minute stays due and is
    /// retried by the next tick within the catch-up window.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickSummary> {
        let mut summary = TickSummary::default();

        for minute in due_minutes(self.last_queried, now, self.max_catch_up_minutes) {
            let key = MatchKey::of(minute);
            tracing::debug!(hour = key.hour, minute = key.minute, "Polling user store");

            let scheduled = match self.store.find_users_matching(key.hour, key.minute).await {
                Ok(scheduled) => scheduled,
                Err(e) => {
                    // Keep the very first minute due as well.
                    if self.last_queried.is_none() {
                        self.last_queried = Some(minute - chrono::Duration::minutes(1));
                    }
                    return Err(e);
                }
            };
            self.last_queried = Some(minute);
            summary.matched += scheduled.users.len() + scheduled.undecodable;
            summary.invalid += scheduled.undecodable;

            for user in scheduled.users {
                self.dispatch(user, &mut summary);
            }
        }

        Ok(summary)
    }

    /// Wait until every dispatched run has finished.
    ///
    /// For callers that drive [`Scheduler::tick`] themselves; [`Scheduler::run`]
    /// takes the scheduler by value and winds down its own runs.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn dispatch(&self, user: User, summary: &mut TickSummary) {
        if let Err(e) = user.validate() {
            tracing::warn!(username = %user.username, error = %e, "Skipping invalid user record");
            summary.invalid += 1;
            return;
        }

        if !user.is_backup_eligible() {
            tracing::debug!(username = %user.username, "User has nothing to back up or nowhere to send it");
            summary.ineligible += 1;
            return;
        }

        if !self.in_flight.insert(user.username.clone()) {
            tracing::warn!(username = %user.username, "Previous backup still running, skipping");
            summary.in_flight += 1;
            return;
        }

        let guard = InFlightGuard {
            set: self.in_flight.clone(),
            username: user.username.clone(),
        };
        let permits = self.permits.clone();
        let orchestrator = self.orchestrator.clone();

        self.tracker.spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            // Outcome is logged by the orchestrator.
            let _ = orchestrator.run(user).await;
        });

        summary.dispatched += 1;
    }

    async fn shutdown(&self) {
        self.tracker.close();
        tracing::info!(in_flight = self.tracker.len(), "Scheduler stopping");

        if tokio::time::timeout(self.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = self.tracker.len(),
                "Grace period elapsed, cancelling in-flight backups"
            );
            self.orchestrator.cancel_all();
            self.tracker.wait().await;
        }

        tracing::info!("Scheduler stopped");
    }
}
