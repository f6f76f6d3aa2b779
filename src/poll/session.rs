use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{SESSION_WINDOW, URGENT_SECS};

/// Handle to a running poll session.
///
/// Both timers live inside the session task, so aborting the task stops them
/// together; there is no way to stop one without the other.
#[derive(Debug)]
pub struct PollSession {
    id: u64,
    instance_name: String,
    started_at: Instant,
    task: JoinHandle<()>,
}

impl PollSession {
    pub(crate) fn new(id: u64, instance_name: String, started_at: Instant, task: JoinHandle<()>) -> Self {
        Self {
            id,
            instance_name,
            started_at,
            task,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn remaining_secs(&self) -> u64 {
        remaining_secs(self.started_at.elapsed())
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

pub(crate) fn remaining_secs(elapsed: Duration) -> u64 {
    SESSION_WINDOW.as_secs().saturating_sub(elapsed.as_secs())
}

pub(crate) fn percent_left(remaining_secs: u64) -> u8 {
    (remaining_secs.min(SESSION_WINDOW.as_secs()) * 100 / SESSION_WINDOW.as_secs()) as u8
}

pub(crate) fn is_urgent(remaining_secs: u64) -> bool {
    remaining_secs <= URGENT_SECS
}
