//! Per-client season countdown.
//!
//! Each observing client runs its own monitor: it keeps the latest Group document from
//! the store subscription, recomputes the remaining time on every tick, activates an
//! awaiting season when its start arrives and tries to finalize once the end passes.
//! Any number of monitors may watch the same Group; finalization itself decides which
//! of them wins.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::{EngineError, FinalizeOutcome, SeasonEngine};
use crate::models::{GroupDocument, GroupId, SeasonScope, SeasonStatus};

/// What a client shows for a Group's season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownState {
    pub season_name: Option<String>,
    pub scope: Option<SeasonScope>,
    pub status: Option<SeasonStatus>,
    pub end_time: Option<DateTime<Utc>>,
    /// Whole seconds left, clamped at zero. `None` without a running season.
    /// Display only: it reads zero during the final second.
    pub remaining_seconds: Option<i64>,
    /// The running season's end time has passed.
    pub expired: bool,
}

impl CountdownState {
    /// Countdown derived from a document snapshot at `now`.
    pub fn observe(doc: Option<&GroupDocument>, now: DateTime<Utc>) -> Self {
        let Some(season) = doc.and_then(|d| d.season.as_ref()) else {
            return Self::idle();
        };
        let remaining_seconds = season
            .is_running()
            .then(|| season.remaining(now).num_seconds().max(0));
        Self {
            season_name: Some(season.name.clone()),
            scope: Some(season.scope),
            status: Some(season.status),
            end_time: Some(season.end_time),
            remaining_seconds,
            expired: season.is_running() && season.is_expired(now),
        }
    }

    fn idle() -> Self {
        Self {
            season_name: None,
            scope: None,
            status: None,
            end_time: None,
            remaining_seconds: None,
            expired: false,
        }
    }

    /// Running and out of time.
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Remaining time as `HH:MM:SS`, or days plus that for long seasons.
    pub fn display(&self) -> String {
        let Some(total) = self.remaining_seconds else {
            return match self.status {
                Some(SeasonStatus::Ended) => "ended".to_string(),
                _ => "no season".to_string(),
            };
        };
        let days = total / 86_400;
        let hours = (total % 86_400) / 3_600;
        let minutes = (total % 3_600) / 60;
        let seconds = total % 60;
        if days > 0 {
            format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        }
    }
}

/// Builder for a countdown monitor task.
pub struct CountdownMonitor {
    engine: Arc<SeasonEngine>,
    group_id: GroupId,
    tick: Duration,
}

impl CountdownMonitor {
    pub fn new(engine: Arc<SeasonEngine>, group_id: GroupId) -> Self {
        Self {
            engine,
            group_id,
            tick: Duration::from_secs(1),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Subscribe to the Group and start ticking.
    pub async fn spawn(self) -> Result<CountdownHandle, EngineError> {
        let doc_rx = self.engine.store().subscribe(&self.group_id).await?;
        if doc_rx.borrow().is_none() {
            return Err(EngineError::GroupNotFound(self.group_id));
        }

        let initial = CountdownState::observe(doc_rx.borrow().as_ref(), self.engine.clock().now());
        let (state_tx, state_rx) = watch::channel(initial);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        info!(
            "Watching season of group {} every {:?}",
            self.group_id, self.tick
        );
        let task = tokio::spawn(self.run(doc_rx, state_tx, cancel_rx));

        Ok(CountdownHandle {
            state: state_rx,
            cancel: cancel_tx,
            task: Some(task),
        })
    }

    async fn run(
        self,
        doc_rx: watch::Receiver<Option<GroupDocument>>,
        state_tx: watch::Sender<CountdownState>,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // End time this monitor has already tried to finalize.
        let mut fired_for: Option<DateTime<Utc>> = None;

        loop {
            tokio::select! {
                changed = cancel_rx.changed() => {
                    if changed.is_err() || *cancel_rx.borrow() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            let doc = doc_rx.borrow().clone();
            let now = self.engine.clock().now();
            state_tx.send_replace(CountdownState::observe(doc.as_ref(), now));

            let Some(season) = doc.and_then(|d| d.season) else {
                continue;
            };

            if season.should_activate(now) {
                if let Err(e) = self.engine.activate_season(&self.group_id).await {
                    warn!("Could not activate season in group {}: {}", self.group_id, e);
                }
            }

            if season.status == SeasonStatus::Ended
                || !season.is_expired(now)
                || fired_for == Some(season.end_time)
            {
                continue;
            }

            fired_for = Some(season.end_time);
            match self.engine.finalize_season(&self.group_id).await {
                Ok(FinalizeOutcome::Finalized(report)) => info!(
                    "Monitor finalized season {:?} in group {} ({} notified)",
                    report.season_name, self.group_id, report.notifications.delivered
                ),
                Ok(FinalizeOutcome::AlreadyEnded) => {
                    debug!("Season in group {} ended elsewhere", self.group_id)
                }
                Ok(FinalizeOutcome::NotExpired { remaining_seconds }) => {
                    // Extended between our snapshot and the write
                    debug!(
                        "Season in group {} still has {}s left",
                        self.group_id, remaining_seconds
                    );
                    fired_for = None;
                }
                Err(e) => error!(
                    "Finalization of group {} failed, not retrying from this monitor: {}",
                    self.group_id, e
                ),
            }
        }

        debug!("Countdown monitor for group {} stopped", self.group_id);
    }
}

/// Handle to a running monitor. Dropping it stops the monitor.
pub struct CountdownHandle {
    state: watch::Receiver<CountdownState>,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl CountdownHandle {
    /// Latest countdown.
    pub fn state(&self) -> CountdownState {
        self.state.borrow().clone()
    }

    /// A receiver notified on every tick.
    pub fn subscribe(&self) -> watch::Receiver<CountdownState> {
        self.state.clone()
    }

    /// Ask the monitor to stop after its current tick.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Cancel and wait for the monitor to exit.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Countdown monitor panicked: {}", e);
                }
            }
        }
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::engine::test_support::*;
    use crate::models::{MatchSide, MatchSubmission, RosterEntry};

    async fn wait_for<F>(handle: &CountdownHandle, mut done: F)
    where
        F: FnMut(&CountdownState) -> bool,
    {
        let mut rx = handle.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if done(&*rx.borrow_and_update()) {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await
        .expect("countdown did not reach the expected state");
    }

    #[test]
    fn test_countdown_display() {
        let mut state = CountdownState::idle();
        assert_eq!(state.display(), "no season");

        state.status = Some(SeasonStatus::Active);
        state.remaining_seconds = Some(3_725);
        assert_eq!(state.display(), "01:02:05");

        state.remaining_seconds = Some(2 * 86_400 + 61);
        assert_eq!(state.display(), "2d 00:01:01");

        state.remaining_seconds = None;
        state.status = Some(SeasonStatus::Ended);
        assert_eq!(state.display(), "ended");
    }

    #[tokio::test]
    async fn test_observe_clamps_at_zero() {
        let h = harness();
        let id = group(&h, &[]).await;
        h.engine
            .start_season(&id, SeasonScope::Group, "S", None, Some(t0() + ChronoDuration::seconds(30)))
            .await
            .unwrap();
        let doc = h.engine.get_group(&id).await.unwrap();

        let state = CountdownState::observe(Some(&doc), t0() + ChronoDuration::seconds(10));
        assert_eq!(state.remaining_seconds, Some(20));
        assert!(!state.is_expired());

        let state = CountdownState::observe(
            Some(&doc),
            t0() + ChronoDuration::seconds(29) + ChronoDuration::milliseconds(500),
        );
        assert_eq!(state.remaining_seconds, Some(0));
        assert!(!state.is_expired());

        let state = CountdownState::observe(Some(&doc), t0() + ChronoDuration::seconds(30));
        assert!(state.is_expired());

        let state = CountdownState::observe(Some(&doc), t0() + ChronoDuration::seconds(90));
        assert_eq!(state.remaining_seconds, Some(0));
        assert!(state.is_expired());
    }

    #[tokio::test]
    async fn test_monitors_finalize_once() {
        let h = harness();
        let id = group(&h, &["p1", "p2"]).await;
        h.engine
            .start_season(&id, SeasonScope::Group, "S", None, Some(t0() + ChronoDuration::seconds(30)))
            .await
            .unwrap();
        h.engine
            .record_match(
                &id,
                MatchSubmission::new(
                    MatchSide::new(vec![RosterEntry::new("p1", 1, 0)]),
                    MatchSide::new(vec![RosterEntry::new("p2", 0, 0)]),
                ),
            )
            .await
            .unwrap();

        let first = CountdownMonitor::new(h.engine.clone(), id.clone())
            .with_tick(Duration::from_millis(10))
            .spawn()
            .await
            .unwrap();
        let second = CountdownMonitor::new(h.engine.clone(), id.clone())
            .with_tick(Duration::from_millis(10))
            .spawn()
            .await
            .unwrap();
        assert_eq!(first.state().remaining_seconds, Some(30));

        h.clock.advance(ChronoDuration::seconds(31));
        wait_for(&first, |s| s.status == Some(SeasonStatus::Ended)).await;
        wait_for(&second, |s| s.status == Some(SeasonStatus::Ended)).await;

        assert_eq!(h.notifier.sent().len(), 1);
        let doc = h.engine.get_group(&id).await.unwrap();
        assert_eq!(doc.season.unwrap().champion.unwrap().id.as_str(), "p1");

        first.shutdown().await;
        second.shutdown().await;
    }

    #[tokio::test]
    async fn test_monitor_activates_awaiting_season() {
        let h = harness();
        let id = group(&h, &[]).await;
        h.engine
            .start_season(
                &id,
                SeasonScope::Team,
                "Later",
                Some(t0() + ChronoDuration::minutes(1)),
                Some(t0() + ChronoDuration::minutes(10)),
            )
            .await
            .unwrap();

        let handle = CountdownMonitor::new(h.engine.clone(), id.clone())
            .with_tick(Duration::from_millis(10))
            .spawn()
            .await
            .unwrap();
        assert_eq!(handle.state().status, Some(SeasonStatus::Awaiting));

        h.clock.advance(ChronoDuration::minutes(2));
        wait_for(&handle, |s| s.status == Some(SeasonStatus::Active)).await;
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_stops_monitor() {
        let h = harness();
        let id = group(&h, &[]).await;
        let handle = CountdownMonitor::new(h.engine.clone(), id)
            .with_tick(Duration::from_millis(10))
            .spawn()
            .await
            .unwrap();
        assert_eq!(handle.state(), CountdownState::idle());

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_spawn_for_missing_group() {
        let h = harness();
        let result = CountdownMonitor::new(h.engine.clone(), GroupId::from("missing"))
            .spawn()
            .await;
        assert!(matches!(result, Err(EngineError::GroupNotFound(_))));
    }
}
