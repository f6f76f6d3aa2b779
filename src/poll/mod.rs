//! Client half of the QR connection lifecycle.
//!
//! After a QR is shown, a [`PollDriver`] runs one session: a countdown that
//! repaints once a second and a connection check every five seconds, both
//! owned by a single task. A check in flight never holds up the countdown and
//! is abandoned once the next one is due. The session ends on the first open
//! check, after the last allowed check, when the window closes, or when
//! cancelled.

pub mod driver;
pub mod session;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::ClientError;
use crate::gateway::QrPayload;
use crate::services::StatusOutcome;
use crate::store::ConnectionStatus;

pub use driver::{LoadOutcome, PollDriver};
pub use session::PollSession;

/// Lifetime of one QR code
pub const SESSION_WINDOW: Duration = Duration::from_secs(60);
pub const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);
pub const POLL_PERIOD: Duration = Duration::from_secs(5);
pub const MAX_POLLS: u32 = 12;
/// Countdown turns urgent at or below this many seconds
pub const URGENT_SECS: u64 = 10;

/// Server calls the driver needs
#[async_trait]
pub trait ConnectionApi: Send + Sync {
    async fn status(&self) -> Result<StatusOutcome, ClientError>;

    async fn create_instance(&self, instance_name: &str) -> Result<Option<QrPayload>, ClientError>;

    /// Raw gateway state payload for the instance
    async fn check_connection(&self, instance_name: &str) -> Result<Value, ClientError>;

    async fn update_status(&self, status: ConnectionStatus, instance_name: &str) -> Result<(), ClientError>;
}

/// Rendering surface; implementations must not block
pub trait PollView: Send + Sync {
    fn render_qr(&self, instance_name: &str, qr: &QrPayload);

    /// `percent` is the share of the window left, 0..=100
    fn render_countdown(&self, remaining_secs: u64, percent: u8, urgent: bool);

    fn render_connected(&self, instance_name: &str);

    /// The window closed without a scan; the view should offer regeneration
    fn render_expired(&self, instance_name: &str);

    fn render_not_found(&self);

    fn render_provision_failed(&self, instance_name: &str, error: &ClientError);
}
