//! In-process fakes for unit tests: a scripted gateway, a scripted dashboard
//! API for the poll driver, and a view that records what it was asked to draw.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::ClientError;
use crate::gateway::{CreateInstanceRequest, Gateway, GatewayError, QrPayload};
use crate::poll::{ConnectionApi, PollView};
use crate::services::StatusOutcome;
use crate::store::{AccountRecord, ConnectionStatus};

fn sample_qr() -> Value {
    json!({
        "base64": "data:image/png;base64,iVBORw0KGgo=",
        "code": "2@fake-pairing-ref",
        "count": 1
    })
}

/// Gateway double keeping instance state in memory
#[derive(Default)]
pub struct FakeGateway {
    states: Mutex<HashMap<String, Value>>,
    fail_state: AtomicBool,
    reject_status: AtomicU16,
    state_checks: AtomicUsize,
    creates: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing instance whose connection state is `payload`
    pub fn set_state(&self, name: &str, payload: Value) {
        self.states.lock().unwrap().insert(name.to_string(), payload);
    }

    pub fn fail_state_checks(&self) {
        self.fail_state.store(true, Ordering::SeqCst);
    }

    pub fn reject_creates(&self, status: u16) {
        self.reject_status.store(status, Ordering::SeqCst);
    }

    pub fn state_checks(&self) -> usize {
        self.state_checks.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn fetch_instance(&self, name: &str) -> Result<Option<Value>, GatewayError> {
        let exists = self.states.lock().unwrap().contains_key(name);
        Ok(exists.then(|| json!([{ "name": name }])))
    }

    async fn connection_state(&self, name: &str) -> Result<Value, GatewayError> {
        self.state_checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_state.load(Ordering::SeqCst) {
            return Err(GatewayError::Unreachable("connection refused".to_string()));
        }
        self.states
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected {
                status: 404,
                body: json!({ "error": "Not Found", "response": { "message": ["instance does not exist"] } }),
            })
    }

    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<Value, GatewayError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let reject = self.reject_status.load(Ordering::SeqCst);
        if reject != 0 {
            return Err(GatewayError::Rejected {
                status: reject,
                body: json!({ "error": "Forbidden", "response": { "message": ["name already in use"] } }),
            });
        }

        let name = &request.instance_name;
        self.set_state(
            name,
            json!({ "instance": { "instanceName": name, "state": "connecting" }, "qrcode": sample_qr() }),
        );
        Ok(json!({
            "instance": { "instanceName": name, "status": "created" },
            "qrcode": sample_qr()
        }))
    }
}

/// Dashboard API double for the poll driver; each instance has a queue of check replies
#[derive(Default)]
pub struct ScriptedApi {
    account: Mutex<Option<AccountRecord>>,
    scripts: Mutex<HashMap<String, VecDeque<Value>>>,
    check_failures: Mutex<HashMap<String, u32>>,
    check_delay: Mutex<Option<Duration>>,
    checks: Mutex<HashMap<String, usize>>,
    updates: Mutex<Vec<(ConnectionStatus, String)>>,
    fail_updates: AtomicBool,
    withhold_qr: AtomicBool,
    status_calls: AtomicUsize,
    creates: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_account(&self, instance_name: &str, status: ConnectionStatus) {
        let mut record = AccountRecord::new("tenant-1", instance_name);
        record.connection_status = status;
        *self.account.lock().unwrap() = Some(record);
    }

    /// Queue check replies; once drained every check answers `close`
    pub fn script(&self, instance_name: &str, replies: Vec<Value>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(instance_name.to_string())
            .or_default()
            .extend(replies);
    }

    /// Fail the next `count` checks before consuming the script
    pub fn fail_checks_for(&self, instance_name: &str, count: u32) {
        self.check_failures
            .lock()
            .unwrap()
            .insert(instance_name.to_string(), count);
    }

    /// Every check takes this long to answer
    pub fn delay_checks(&self, delay: Duration) {
        *self.check_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    pub fn withhold_qr(&self) {
        self.withhold_qr.store(true, Ordering::SeqCst);
    }

    pub fn checks(&self, instance_name: &str) -> usize {
        self.checks.lock().unwrap().get(instance_name).copied().unwrap_or(0)
    }

    pub fn updates(&self) -> Vec<(ConnectionStatus, String)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionApi for ScriptedApi {
    async fn status(&self) -> Result<StatusOutcome, ClientError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.account.lock().unwrap().clone() {
            Some(account) => StatusOutcome::Account(account),
            None => StatusOutcome::NotFound,
        })
    }

    async fn create_instance(&self, _instance_name: &str) -> Result<Option<QrPayload>, ClientError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.withhold_qr.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(QrPayload::from_value(&sample_qr()))
    }

    async fn check_connection(&self, instance_name: &str) -> Result<Value, ClientError> {
        *self
            .checks
            .lock()
            .unwrap()
            .entry(instance_name.to_string())
            .or_default() += 1;

        let delay = *self.check_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(remaining) = self.check_failures.lock().unwrap().get_mut(instance_name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ClientError::InvalidResponse("gateway hiccup".to_string()));
            }
        }

        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(instance_name)
            .and_then(VecDeque::pop_front);
        Ok(reply.unwrap_or_else(|| json!({ "instance": { "instanceName": instance_name, "state": "close" } })))
    }

    async fn update_status(&self, status: ConnectionStatus, instance_name: &str) -> Result<(), ClientError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(ClientError::NotAuthenticated);
        }
        self.updates.lock().unwrap().push((status, instance_name.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Qr(String),
    Countdown(u64, u8, bool),
    Connected(String),
    Expired(String),
    NotFound,
    ProvisionFailed(String),
}

#[derive(Default)]
pub struct RecordingView {
    events: Mutex<Vec<ViewEvent>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ViewEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Most recent event that is not a countdown repaint
    pub fn last(&self) -> Option<ViewEvent> {
        self.events()
            .into_iter()
            .rev()
            .find(|e| !matches!(e, ViewEvent::Countdown(..)))
    }

    pub fn countdowns(&self) -> Vec<(u64, u8, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ViewEvent::Countdown(remaining, percent, urgent) => Some((remaining, percent, urgent)),
                _ => None,
            })
            .collect()
    }

    pub fn expired(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ViewEvent::Expired(name) => Some(name),
                _ => None,
            })
            .collect()
    }
}

impl PollView for RecordingView {
    fn render_qr(&self, instance_name: &str, _qr: &QrPayload) {
        self.push(ViewEvent::Qr(instance_name.to_string()));
    }

    fn render_countdown(&self, remaining_secs: u64, percent: u8, urgent: bool) {
        self.push(ViewEvent::Countdown(remaining_secs, percent, urgent));
    }

    fn render_connected(&self, instance_name: &str) {
        self.push(ViewEvent::Connected(instance_name.to_string()));
    }

    fn render_expired(&self, instance_name: &str) {
        self.push(ViewEvent::Expired(instance_name.to_string()));
    }

    fn render_not_found(&self) {
        self.push(ViewEvent::NotFound);
    }

    fn render_provision_failed(&self, instance_name: &str, _error: &ClientError) {
        self.push(ViewEvent::ProvisionFailed(instance_name.to_string()));
    }
}
