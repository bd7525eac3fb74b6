use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of one step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created, not yet started
    Pending,
    /// Operator is working the step (or retrying after a blocking failure)
    InProgress,
    /// Result recorded; validation passed or the defect was non-blocking
    Completed,
    /// Step was conditionally inapplicable and bypassed
    Skipped,
}

impl ExecutionStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Invalid execution status: {s}")),
        }
    }
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Outcome of validating a recorded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One attempt of one unit at one step.
///
/// Executions are append-only audit records: a rewind never deletes them,
/// it marks them with `superseded_by` pointing at the replacement attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: Uuid,
    pub unit_id: Uuid,
    pub step_number: u32,
    pub status: ExecutionStatus,
    pub retry_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub value_recorded: Option<String>,
    #[serde(default)]
    pub measurement_values: HashMap<String, serde_json::Value>,
    pub validation_status: Option<ValidationStatus>,
    pub barcode_scanned: Option<String>,
    pub batch_number: Option<String>,
    pub skip_reason: Option<String>,
    pub superseded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepExecution {
    /// New execution in `pending` for a unit arriving at a step.
    pub fn create(unit_id: Uuid, step_number: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            unit_id,
            step_number,
            status: ExecutionStatus::Pending,
            retry_count: 0,
            started_at: None,
            completed_at: None,
            value_recorded: None,
            measurement_values: HashMap::new(),
            validation_status: None,
            barcode_scanned: None,
            batch_number: None,
            skip_reason: None,
            superseded_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// An execution counts toward unit history only while not superseded.
    pub fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Skipped.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::InProgress,
            ExecutionStatus::Completed,
            ExecutionStatus::Skipped,
        ] {
            assert_eq!(status.to_string().parse::<ExecutionStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_create_is_pending() {
        let exec = StepExecution::create(Uuid::new_v4(), 10);
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert_eq!(exec.retry_count, 0);
        assert!(exec.started_at.is_none());
        assert!(!exec.is_superseded());
    }
}
