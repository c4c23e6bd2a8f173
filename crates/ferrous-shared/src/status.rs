//! Transient status shown by each front end.

use crate::command::CommandResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Severity {
    pub fn for_result(result: &CommandResult) -> Self {
        if result.success {
            Severity::Success
        } else {
            Severity::Error
        }
    }
}

/// Live status as rendered by a front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    pub message: String,
    pub severity: Severity,
    /// Milliseconds until the status disappears.
    pub expires_in_ms: u64,
}
