//! Live timer card for one work order.
//!
//! Holds what the card shows (status, elapsed clock, enabled actions) and
//! issues the command sequence behind each button. Status changes are applied
//! optimistically; server updates reconcile them later.

use thiserror::Error;
use trackmint_shared::{EntityKind, WorkOrder, WorkOrderStatus};

use crate::ws::{Transport, UpdateCoordinator};

/// Buttons a timer card can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerAction {
    Start,
    Pause,
    Resume,
    Complete,
}

impl TimerAction {
    pub fn label(&self) -> &'static str {
        match self {
            TimerAction::Start => "Start",
            TimerAction::Pause => "Pause",
            TimerAction::Resume => "Resume",
            TimerAction::Complete => "Complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Some(TimerAction::Start),
            "pause" => Some(TimerAction::Pause),
            "resume" => Some(TimerAction::Resume),
            "complete" => Some(TimerAction::Complete),
            _ => None,
        }
    }

    /// Status the work order moves to when this action is taken.
    pub fn target_status(&self) -> WorkOrderStatus {
        match self {
            TimerAction::Start | TimerAction::Resume => WorkOrderStatus::Started,
            TimerAction::Pause => WorkOrderStatus::Paused,
            TimerAction::Complete => WorkOrderStatus::Completed,
        }
    }
}

impl std::fmt::Display for TimerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("not connected to the live-update server")]
    Disconnected,
    #[error("{action} is not available while the work order is {status}")]
    NotAvailable {
        action: TimerAction,
        status: WorkOrderStatus,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimerDisplay {
    work_order_id: String,
    status: WorkOrderStatus,
    elapsed_seconds: u64,
    mounted: bool,
}

impl TimerDisplay {
    pub fn new(work_order_id: impl Into<String>, status: WorkOrderStatus, elapsed_seconds: u64) -> Self {
        Self {
            work_order_id: work_order_id.into(),
            status,
            elapsed_seconds,
            mounted: false,
        }
    }

    pub fn from_work_order(work_order: &WorkOrder) -> Self {
        Self::new(work_order.id.clone(), work_order.status, work_order.elapsed_time)
    }

    pub fn work_order_id(&self) -> &str {
        &self.work_order_id
    }

    pub fn status(&self) -> WorkOrderStatus {
        self.status
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Subscribe to this work order. Call again after a reconnect to
    /// re-establish the subscription.
    pub fn mount<T: Transport>(&mut self, coordinator: &UpdateCoordinator<T>) {
        coordinator.subscribe_to_entity(EntityKind::WorkOrder, &self.work_order_id);
        self.mounted = true;
    }

    pub fn unmount<T: Transport>(&mut self, coordinator: &UpdateCoordinator<T>) {
        if !self.mounted {
            return;
        }
        coordinator.unsubscribe_from_entity(EntityKind::WorkOrder, &self.work_order_id);
        self.mounted = false;
    }

    /// Buttons shown for the current status.
    pub fn available_actions(&self) -> &'static [TimerAction] {
        match self.status {
            WorkOrderStatus::Ready => &[TimerAction::Start],
            WorkOrderStatus::Started => &[TimerAction::Pause, TimerAction::Complete],
            WorkOrderStatus::Paused => &[TimerAction::Resume, TimerAction::Complete],
            WorkOrderStatus::Completed => &[],
        }
    }

    /// Buttons that can actually be pressed; none while disconnected.
    pub fn enabled_actions(&self, connected: bool) -> &'static [TimerAction] {
        if connected {
            self.available_actions()
        } else {
            &[]
        }
    }

    /// Press a button: send the timer command, then the status update, and
    /// move to the new status without waiting for confirmation.
    pub fn perform<T: Transport>(
        &mut self,
        action: TimerAction,
        coordinator: &UpdateCoordinator<T>,
    ) -> Result<WorkOrderStatus, ActionError> {
        if !coordinator.is_connected() {
            return Err(ActionError::Disconnected);
        }
        if !self.available_actions().contains(&action) {
            return Err(ActionError::NotAvailable {
                action,
                status: self.status,
            });
        }

        let id = self.work_order_id.as_str();
        match action {
            TimerAction::Start | TimerAction::Resume => coordinator.start_timer(id),
            TimerAction::Pause => coordinator.pause_timer(id),
            TimerAction::Complete => coordinator.stop_timer(id),
        }
        let next = action.target_status();
        coordinator.update_work_order_status(id, next);

        tracing::debug!("{} {}: {} -> {}", action, id, self.status, next);
        self.status = next;
        Ok(next)
    }

    /// Advance the local clock by one second while running.
    pub fn tick(&mut self) {
        if self.status == WorkOrderStatus::Started {
            self.elapsed_seconds = self.elapsed_seconds.saturating_add(1);
        }
    }

    /// Reconcile the clock with the server's figure.
    pub fn apply_timer_update(&mut self, elapsed_seconds: u64) {
        self.elapsed_seconds = elapsed_seconds;
    }

    pub fn apply_status(&mut self, status: WorkOrderStatus) {
        self.status = status;
    }

    /// Reconcile from a full work-order update. Returns false if the update
    /// is for a different work order.
    pub fn apply_work_order(&mut self, work_order: &WorkOrder) -> bool {
        if work_order.id != self.work_order_id {
            return false;
        }
        self.status = work_order.status;
        self.elapsed_seconds = work_order.elapsed_time;
        true
    }

    /// Elapsed time as `HH:MM:SS`; hours grow past two digits if needed.
    pub fn elapsed_label(&self) -> String {
        let secs = self.elapsed_seconds;
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
