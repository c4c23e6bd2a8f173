//! Pending-shutdown lifecycle as seen by clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownState {
    Idle,
    Scheduled,
    Cancelled,
    Executed,
}

impl ShutdownState {
    /// `Cancelled` and `Executed` only leave through a reset to `Idle`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShutdownState::Cancelled | ShutdownState::Executed)
    }
}

/// Read-only view of the tracker for `GET /api/shutdown/state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownSnapshot {
    pub state: ShutdownState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}
