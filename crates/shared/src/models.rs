//! Manufacturing entities as they travel over the live-update channel and the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Entity kinds ---

/// Entity classes that can be subscribed to and carry a status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    WorkOrder,
    ManufacturingOrder,
}

impl EntityKind {
    /// Channel name for a single entity of this kind (`work_order`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::WorkOrder => "work_order",
            EntityKind::ManufacturingOrder => "manufacturing_order",
        }
    }

    /// Channel name covering every entity of this kind (`work_orders`).
    pub fn plural(&self) -> &'static str {
        match self {
            EntityKind::WorkOrder => "work_orders",
            EntityKind::ManufacturingOrder => "manufacturing_orders",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "work_order" => Some(EntityKind::WorkOrder),
            "manufacturing_order" => Some(EntityKind::ManufacturingOrder),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Work orders ---

/// Operator-facing lifecycle of a work order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WorkOrderStatus {
    #[default]
    Ready,
    Started,
    Paused,
    Completed,
}

impl WorkOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Ready => "Ready",
            WorkOrderStatus::Started => "Started",
            WorkOrderStatus::Paused => "Paused",
            WorkOrderStatus::Completed => "Completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Ready" => Some(WorkOrderStatus::Ready),
            "Started" => Some(WorkOrderStatus::Started),
            "Paused" => Some(WorkOrderStatus::Paused),
            "Completed" => Some(WorkOrderStatus::Completed),
            _ => None,
        }
    }

    /// Whether an operator may move a work order from `self` to `next`.
    pub fn can_transition_to(&self, next: WorkOrderStatus) -> bool {
        use WorkOrderStatus::*;
        matches!(
            (self, next),
            (Ready, Started) | (Started, Paused) | (Paused, Started) | (Started, Completed) | (Paused, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkOrderStatus::Completed)
    }
}

impl std::fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single operator-executable manufacturing step.
///
/// Only `id` is required; everything else is filled in as far as the sender knows it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrder {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_order_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturing_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_center: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub status: WorkOrderStatus,
    /// Planned duration in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_duration: Option<u32>,
    /// Actual duration in minutes, known once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<u32>,
    /// Seconds of work recorded so far.
    #[serde(default)]
    pub elapsed_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl WorkOrder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Body of `PUT /work-orders/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderStatusChange {
    pub status: WorkOrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl WorkOrderStatusChange {
    pub fn new(status: WorkOrderStatus) -> Self {
        Self {
            status,
            actual_start_date: None,
            actual_end_date: None,
            actual_duration: None,
            notes: None,
        }
    }
}

// --- Manufacturing orders ---

/// A production batch request for a product against a bill of materials.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManufacturingOrder {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bom_id: Option<String>,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_end_date: Option<DateTime<Utc>>,
    /// Free-form status label, e.g. "Planned", "In Progress", "Done".
    #[serde(default)]
    pub status: String,
}

impl ManufacturingOrder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: "Planned".to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn entity_kind_channel_names() {
        assert_eq!(EntityKind::WorkOrder.as_str(), "work_order");
        assert_eq!(EntityKind::WorkOrder.plural(), "work_orders");
        assert_eq!(EntityKind::ManufacturingOrder.plural(), "manufacturing_orders");
        assert_eq!(EntityKind::parse("manufacturing_order"), Some(EntityKind::ManufacturingOrder));
        assert_eq!(EntityKind::parse("bom"), None);
    }

    #[test]
    fn work_order_status_lifecycle() {
        use WorkOrderStatus::*;
        assert!(Ready.can_transition_to(Started));
        assert!(Started.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Started));
        assert!(Paused.can_transition_to(Completed));
        assert!(!Ready.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Started));
        assert!(Completed.is_terminal());
    }

    #[test]
    fn work_order_tolerates_sparse_payloads() {
        let wo: WorkOrder = serde_json::from_str(r#"{"id":"wo-1","status":"Paused","elapsedTime":42,"extra":true}"#).unwrap();
        assert_eq!(wo.id, "wo-1");
        assert_eq!(wo.status, WorkOrderStatus::Paused);
        assert_eq!(wo.elapsed_time, 42);
        assert_eq!(wo.work_center, None);
    }

    #[test]
    fn status_change_body_is_camel_case() {
        let mut change = WorkOrderStatusChange::new(WorkOrderStatus::Completed);
        change.actual_duration = Some(35);
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json, serde_json::json!({"status": "Completed", "actualDuration": 35}));
    }
}
