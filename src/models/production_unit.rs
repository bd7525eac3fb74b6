use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate status of a production unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Created but no step started yet
    Planned,
    /// At least one step execution is underway
    InProgress,
    /// A blocking step failed; waiting on operator intervention
    OnHold,
    /// All applicable steps are terminal
    Completed,
    /// Withdrawn from production
    Cancelled,
}

impl UnitStatus {
    /// Terminal statuses admit no further progression.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress | Self::OnHold)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planned => write!(f, "planned"),
            Self::InProgress => write!(f, "in_progress"),
            Self::OnHold => write!(f, "on_hold"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for UnitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "in_progress" => Ok(Self::InProgress),
            "on_hold" => Ok(Self::OnHold),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid unit status: {s}")),
        }
    }
}

impl Default for UnitStatus {
    fn default() -> Self {
        Self::Planned
    }
}

/// One physical item being manufactured, tracked by serial number.
///
/// `current_step` is maintained exclusively by the progression controller; no
/// other component writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionUnit {
    pub id: Uuid,
    pub serial_number: String,
    pub work_order_id: Uuid,
    pub position_in_batch: u32,
    pub product_type: String,
    pub current_step: Option<u32>,
    pub status: UnitStatus,
    pub batch_number: Option<String>,
    pub label_printed: bool,
    pub certificate_generated: bool,
    pub quality_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New production unit for creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProductionUnit {
    pub serial_number: String,
    pub work_order_id: Uuid,
    pub position_in_batch: u32,
    pub product_type: String,
    pub batch_number: Option<String>,
}

impl ProductionUnit {
    pub fn create(new_unit: NewProductionUnit) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            serial_number: new_unit.serial_number,
            work_order_id: new_unit.work_order_id,
            position_in_batch: new_unit.position_in_batch,
            product_type: new_unit.product_type,
            current_step: None,
            status: UnitStatus::Planned,
            batch_number: new_unit.batch_number,
            label_printed: false,
            certificate_generated: false,
            quality_approved: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
