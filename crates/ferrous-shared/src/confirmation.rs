//! Confirmation request surfaced to the local UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Pending,
    Approved,
    Rejected,
}

impl ConfirmationOutcome {
    pub fn from_approval(approved: bool) -> Self {
        if approved {
            ConfirmationOutcome::Approved
        } else {
            ConfirmationOutcome::Rejected
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, ConfirmationOutcome::Approved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub outcome: ConfirmationOutcome,
    pub requested_at: DateTime<Utc>,
}

impl ConfirmationRequest {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            message: message.into(),
            outcome: ConfirmationOutcome::Pending,
            requested_at: Utc::now(),
        }
    }
}
