use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::time::error::Elapsed;
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::session::{is_urgent, percent_left, remaining_secs};
use super::{ConnectionApi, PollSession, PollView, COUNTDOWN_PERIOD, MAX_POLLS, POLL_PERIOD, SESSION_WINDOW};
use crate::client::ClientError;
use crate::gateway::ConnectionState;
use crate::services::StatusOutcome;
use crate::store::ConnectionStatus;

type Slot = Arc<Mutex<Option<PollSession>>>;

/// What `load_status` (or a provisioning call) ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A session was already running; only the countdown was repainted
    Refreshed,
    NotFound,
    Connected(String),
    SessionStarted(String),
    ProvisionFailed(String),
}

/// Owns at most one poll session at a time
pub struct PollDriver {
    api: Arc<dyn ConnectionApi>,
    view: Arc<dyn PollView>,
    active: Slot,
    next_id: AtomicU64,
}

impl PollDriver {
    pub fn new(api: Arc<dyn ConnectionApi>, view: Arc<dyn PollView>) -> Self {
        Self {
            api,
            view,
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Show the tenant's current state, provisioning a QR when not connected
    pub async fn load_status(&self) -> Result<LoadOutcome, ClientError> {
        let remaining = lock(&self.active).as_ref().map(PollSession::remaining_secs);
        if let Some(remaining) = remaining.filter(|r| *r > 0) {
            self.view
                .render_countdown(remaining, percent_left(remaining), is_urgent(remaining));
            return Ok(LoadOutcome::Refreshed);
        }

        match self.api.status().await? {
            StatusOutcome::NotFound => {
                self.view.render_not_found();
                Ok(LoadOutcome::NotFound)
            }
            StatusOutcome::Account(account) if account.is_connected() => {
                self.view.render_connected(&account.instance_name);
                Ok(LoadOutcome::Connected(account.instance_name))
            }
            StatusOutcome::Account(account) => Ok(self.provision(&account.instance_name).await),
        }
    }

    /// Ask the server for a QR and start polling for the scan
    pub async fn provision(&self, instance_name: &str) -> LoadOutcome {
        let result = match self.api.create_instance(instance_name).await {
            Ok(Some(qr)) => Ok(qr),
            Ok(None) => Err(ClientError::NoQrCode),
            Err(e) => Err(e),
        };

        match result {
            Ok(qr) => {
                self.view.render_qr(instance_name, &qr);
                self.start_session(instance_name);
                LoadOutcome::SessionStarted(instance_name.to_string())
            }
            Err(e) => {
                warn!("Provisioning '{}' failed: {}", instance_name, e);
                self.view.render_provision_failed(instance_name, &e);
                LoadOutcome::ProvisionFailed(instance_name.to_string())
            }
        }
    }

    /// Drop the current session and its QR, then provision a fresh one
    pub async fn regenerate(&self, instance_name: &str) -> LoadOutcome {
        self.cancel();
        self.provision(instance_name).await
    }

    /// Start polling `instance_name`, replacing any running session
    pub fn start_session(&self, instance_name: &str) {
        let mut slot = lock(&self.active);
        if let Some(previous) = slot.take() {
            debug!("Replacing poll session {} for '{}'", previous.id(), previous.instance_name());
            previous.cancel();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let started_at = Instant::now();
        let task = tokio::spawn(run_session(
            id,
            instance_name.to_string(),
            started_at,
            self.api.clone(),
            self.view.clone(),
            self.active.clone(),
        ));

        info!("Poll session {} started for '{}'", id, instance_name);
        *slot = Some(PollSession::new(id, instance_name.to_string(), started_at, task));
    }

    pub fn cancel(&self) {
        if let Some(session) = lock(&self.active).take() {
            info!("Poll session {} for '{}' cancelled", session.id(), session.instance_name());
            session.cancel();
        }
    }
}

fn lock(slot: &Mutex<Option<PollSession>>) -> MutexGuard<'_, Option<PollSession>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clear the slot if it still holds session `id`; a newer session may have replaced it
fn release(slot: &Slot, id: u64) {
    let mut slot = lock(slot);
    if slot.as_ref().map(PollSession::id) == Some(id) {
        slot.take();
    }
}

async fn run_session(
    id: u64,
    instance_name: String,
    started_at: Instant,
    api: Arc<dyn ConnectionApi>,
    view: Arc<dyn PollView>,
    slot: Slot,
) {
    let mut countdown = interval_at(started_at + COUNTDOWN_PERIOD, COUNTDOWN_PERIOD);
    countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut poll = interval_at(started_at + POLL_PERIOD, POLL_PERIOD);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let deadline = sleep_until(started_at + SESSION_WINDOW);
    tokio::pin!(deadline);

    let mut counting = true;
    let mut polls = 0u32;
    let mut in_flight: Option<CheckFuture> = None;

    loop {
        tokio::select! {
            biased;

            _ = countdown.tick(), if counting => {
                let remaining = remaining_secs(started_at.elapsed());
                view.render_countdown(remaining, percent_left(remaining), is_urgent(remaining));
                counting = remaining > 0;
            }

            _ = poll.tick(), if in_flight.is_none() => {
                polls += 1;
                in_flight = Some(start_check(api.clone(), instance_name.clone()));
            }

            result = next_check(&mut in_flight), if in_flight.is_some() => {
                in_flight = None;
                let open = match result {
                    Ok(Ok(payload)) => ConnectionState::from_payload(&payload).is_open(),
                    Ok(Err(e)) => {
                        warn!("Connection check {} for '{}' failed: {}", polls, instance_name, e);
                        false
                    }
                    Err(_) => {
                        warn!("Connection check {} for '{}' timed out", polls, instance_name);
                        false
                    }
                };

                if open {
                    release(&slot, id);
                    info!("Instance '{}' connected after {} checks", instance_name, polls);
                    if let Err(e) = api.update_status(ConnectionStatus::Connected, &instance_name).await {
                        warn!("Could not record connection of '{}': {}", instance_name, e);
                    }
                    view.render_connected(&instance_name);
                    return;
                }

                if polls >= MAX_POLLS {
                    release(&slot, id);
                    info!("QR for '{}' expired after {} checks", instance_name, polls);
                    view.render_expired(&instance_name);
                    return;
                }
            }

            _ = &mut deadline => {
                release(&slot, id);
                info!("QR for '{}' expired at the end of its window after {} checks", instance_name, polls);
                view.render_expired(&instance_name);
                return;
            }
        }
    }
}

type CheckFuture = Pin<Box<dyn Future<Output = Result<Result<Value, ClientError>, Elapsed>> + Send>>;

/// One connection check, cut off when the next one is due
fn start_check(api: Arc<dyn ConnectionApi>, instance_name: String) -> CheckFuture {
    Box::pin(timeout(POLL_PERIOD, async move { api.check_connection(&instance_name).await }))
}

async fn next_check(in_flight: &mut Option<CheckFuture>) -> Result<Result<Value, ClientError>, Elapsed> {
    match in_flight {
        Some(check) => check.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingView, ScriptedApi, ViewEvent};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::sleep;

    fn driver(api: &Arc<ScriptedApi>, view: &Arc<RecordingView>) -> PollDriver {
        PollDriver::new(api.clone(), view.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn open_on_third_check_stops_everything() {
        let api = Arc::new(ScriptedApi::new());
        api.script("demo-1", vec![json!({"state": "close"}), json!({"state": "close"}), json!({"state": "open"})]);
        let view = Arc::new(RecordingView::new());
        let driver = driver(&api, &view);

        driver.start_session("demo-1");
        sleep(Duration::from_secs(61)).await;

        assert_eq!(api.checks("demo-1"), 3);
        assert_eq!(api.updates(), vec![(ConnectionStatus::Connected, "demo-1".to_string())]);
        assert!(!driver.is_active());
        assert_eq!(view.last(), Some(ViewEvent::Connected("demo-1".to_string())));
        // countdown stopped with the session at t=15
        assert_eq!(view.countdowns().len(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn never_open_expires_after_twelve_checks() {
        let api = Arc::new(ScriptedApi::new());
        let view = Arc::new(RecordingView::new());
        let driver = driver(&api, &view);

        driver.start_session("demo-1");
        sleep(Duration::from_secs(90)).await;

        assert_eq!(api.checks("demo-1"), 12);
        assert!(api.updates().is_empty());
        assert!(!driver.is_active());
        assert_eq!(view.last(), Some(ViewEvent::Expired("demo-1".to_string())));

        let countdowns = view.countdowns();
        assert_eq!(countdowns.first(), Some(&(59, 98, false)));
        assert_eq!(countdowns.last(), Some(&(0, 0, true)));
    }

    #[tokio::test(start_paused = true)]
    async fn new_session_cancels_the_previous_one() {
        let api = Arc::new(ScriptedApi::new());
        let view = Arc::new(RecordingView::new());
        let driver = driver(&api, &view);

        driver.start_session("demo-1");
        sleep(Duration::from_secs(7)).await;
        driver.start_session("demo-2");
        sleep(Duration::from_secs(90)).await;

        assert_eq!(api.checks("demo-1"), 1);
        assert_eq!(api.checks("demo-2"), 12);
        assert_eq!(view.expired(), vec!["demo-2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_checks_keep_countdown_running_and_expire_on_time() {
        let api = Arc::new(ScriptedApi::new());
        api.delay_checks(Duration::from_secs(20));
        let view = Arc::new(RecordingView::new());
        let driver = driver(&api, &view);

        driver.start_session("demo-1");
        sleep(Duration::from_millis(24_500)).await;
        assert_eq!(view.countdowns().len(), 24);
        assert!(driver.is_active());

        sleep(Duration::from_secs(36)).await;
        assert!(!driver.is_active());
        assert_eq!(view.expired(), vec!["demo-1".to_string()]);
        assert_eq!(view.countdowns().last(), Some(&(0, 0, true)));
        assert_eq!(api.checks("demo-1"), 12);
        assert!(api.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_open_check_within_period_connects() {
        let api = Arc::new(ScriptedApi::new());
        api.delay_checks(Duration::from_secs(3));
        api.script("demo-1", vec![json!({"state": "open"})]);
        let view = Arc::new(RecordingView::new());
        let driver = driver(&api, &view);

        driver.start_session("demo-1");
        sleep(Duration::from_millis(8_500)).await;

        assert_eq!(api.checks("demo-1"), 1);
        assert!(!driver.is_active());
        assert_eq!(view.last(), Some(ViewEvent::Connected("demo-1".to_string())));
        assert_eq!(view.countdowns().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn check_errors_are_swallowed() {
        let api = Arc::new(ScriptedApi::new());
        api.fail_checks_for("demo-1", 2);
        api.script("demo-1", vec![json!({"instance": {"state": "open"}})]);
        let view = Arc::new(RecordingView::new());
        let driver = driver(&api, &view);

        driver.start_session("demo-1");
        sleep(Duration::from_secs(61)).await;

        assert_eq!(api.checks("demo-1"), 3);
        assert_eq!(view.last(), Some(ViewEvent::Connected("demo-1".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_update_still_renders_connected() {
        let api = Arc::new(ScriptedApi::new());
        api.script("demo-1", vec![json!({"status": "connected"})]);
        api.fail_updates();
        let view = Arc::new(RecordingView::new());
        let driver = driver(&api, &view);

        driver.start_session("demo-1");
        sleep(Duration::from_secs(61)).await;

        assert_eq!(api.checks("demo-1"), 1);
        assert_eq!(view.last(), Some(ViewEvent::Connected("demo-1".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn load_status_provisions_and_connects_demo_instance() {
        let api = Arc::new(ScriptedApi::new());
        api.set_account("demo-1", ConnectionStatus::Disconnected);
        api.script("demo-1", vec![json!({"state": "close"}), json!({"state": "close"}), json!({"state": "open"})]);
        let view = Arc::new(RecordingView::new());
        let driver = driver(&api, &view);

        let outcome = driver.load_status().await.unwrap();
        assert_eq!(outcome, LoadOutcome::SessionStarted("demo-1".to_string()));
        assert!(matches!(view.events().first(), Some(ViewEvent::Qr(name)) if name == "demo-1"));

        sleep(Duration::from_secs(61)).await;
        assert_eq!(api.updates(), vec![(ConnectionStatus::Connected, "demo-1".to_string())]);
        assert_eq!(view.last(), Some(ViewEvent::Connected("demo-1".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn load_status_during_session_only_refreshes() {
        let api = Arc::new(ScriptedApi::new());
        api.set_account("demo-1", ConnectionStatus::Disconnected);
        let view = Arc::new(RecordingView::new());
        let driver = driver(&api, &view);

        driver.load_status().await.unwrap();
        sleep(Duration::from_millis(20_500)).await;

        let outcome = driver.load_status().await.unwrap();
        assert_eq!(outcome, LoadOutcome::Refreshed);
        assert_eq!(api.status_calls(), 1);
        assert_eq!(api.creates(), 1);
        assert_eq!(view.countdowns().last(), Some(&(40, 66, false)));
    }

    #[tokio::test(start_paused = true)]
    async fn connected_and_missing_accounts_start_nothing() {
        let api = Arc::new(ScriptedApi::new());
        let view = Arc::new(RecordingView::new());
        let driver = driver(&api, &view);

        assert_eq!(driver.load_status().await.unwrap(), LoadOutcome::NotFound);

        api.set_account("demo-1", ConnectionStatus::Connected);
        assert_eq!(driver.load_status().await.unwrap(), LoadOutcome::Connected("demo-1".to_string()));
        assert!(!driver.is_active());
        assert_eq!(api.creates(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn provisioning_without_qr_offers_retry() {
        let api = Arc::new(ScriptedApi::new());
        api.set_account("demo-1", ConnectionStatus::Disconnected);
        api.withhold_qr();
        let view = Arc::new(RecordingView::new());
        let driver = driver(&api, &view);

        let outcome = driver.load_status().await.unwrap();
        assert_eq!(outcome, LoadOutcome::ProvisionFailed("demo-1".to_string()));
        assert!(!driver.is_active());
        assert_eq!(view.last(), Some(ViewEvent::ProvisionFailed("demo-1".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_polling() {
        let api = Arc::new(ScriptedApi::new());
        let view = Arc::new(RecordingView::new());
        let driver = driver(&api, &view);

        driver.start_session("demo-1");
        sleep(Duration::from_secs(11)).await;
        driver.cancel();
        sleep(Duration::from_secs(60)).await;

        assert_eq!(api.checks("demo-1"), 2);
        assert!(!driver.is_active());
        assert!(view.expired().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn regenerate_replaces_session() {
        let api = Arc::new(ScriptedApi::new());
        let view = Arc::new(RecordingView::new());
        let driver = driver(&api, &view);

        driver.start_session("demo-1");
        sleep(Duration::from_secs(6)).await;
        assert_eq!(driver.regenerate("demo-1").await, LoadOutcome::SessionStarted("demo-1".to_string()));
        sleep(Duration::from_secs(4)).await;

        // old session would have checked at t=10; the new one first checks at t=11
        assert_eq!(api.checks("demo-1"), 1);
        assert!(driver.is_active());
    }
}
