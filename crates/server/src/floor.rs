//! In-memory shop-floor model driven by client commands.
//!
//! Applying a command mutates the model and returns the events that should
//! be broadcast. Nothing here touches the network, so the relay's behaviour
//! can be tested directly.

use std::collections::HashMap;

use chrono::DateTime;
use serde::Deserialize;
use trackmint_shared::{
    ClientCommand, EntityKind, ManufacturingOrder, ServerEvent, WorkOrder, WorkOrderStatus,
};

/// A work order plus its live timer.
#[derive(Debug, Clone)]
struct TrackedWorkOrder {
    order: WorkOrder,
    /// Time recorded by finished runs.
    accumulated_ms: u64,
    /// Start of the current run, if the timer is running.
    running_since: Option<i64>,
}

impl TrackedWorkOrder {
    fn new(id: &str) -> Self {
        Self::from_order(WorkOrder::new(id))
    }

    /// Recorded `elapsed_time` carries over as accumulated work.
    fn from_order(order: WorkOrder) -> Self {
        Self {
            accumulated_ms: order.elapsed_time.saturating_mul(1000),
            order,
            running_since: None,
        }
    }

    fn elapsed_secs(&self, now_ms: i64) -> u64 {
        let running = self
            .running_since
            .map(|since| (now_ms - since).max(0) as u64)
            .unwrap_or(0);
        (self.accumulated_ms + running) / 1000
    }

    fn start(&mut self, now_ms: i64) {
        if self.running_since.is_none() {
            self.running_since = Some(now_ms);
        }
        self.order.start_time = self.order.start_time.or(DateTime::from_timestamp_millis(now_ms));
    }

    fn stop(&mut self, now_ms: i64) {
        if let Some(since) = self.running_since.take() {
            self.accumulated_ms += (now_ms - since).max(0) as u64;
        }
    }

    fn snapshot(&self, now_ms: i64) -> WorkOrder {
        WorkOrder {
            elapsed_time: self.elapsed_secs(now_ms),
            ..self.order.clone()
        }
    }

    fn timer_update(&self, now_ms: i64) -> ServerEvent {
        ServerEvent::TimerUpdate {
            work_order_id: self.order.id.clone(),
            elapsed_time: self.elapsed_secs(now_ms),
        }
    }
}

/// Orders to preload, in the REST API's JSON shape.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    #[serde(default)]
    pub work_orders: Vec<WorkOrder>,
    #[serde(default)]
    pub manufacturing_orders: Vec<ManufacturingOrder>,
}

/// Status a manufacturing order takes once all of its work orders complete.
pub const MANUFACTURING_ORDER_DONE: &str = "Done";

/// Work orders, their timers, and manufacturing orders known to the relay.
#[derive(Debug, Default)]
pub struct Floor {
    work_orders: HashMap<String, TrackedWorkOrder>,
    manufacturing_orders: HashMap<String, ManufacturingOrder>,
}

impl Floor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload orders. Seeded timers start stopped.
    pub fn seed(&mut self, seed: Seed) {
        tracing::info!(
            "Seeding {} work orders and {} manufacturing orders",
            seed.work_orders.len(),
            seed.manufacturing_orders.len()
        );
        for order in seed.work_orders {
            self.work_orders.insert(order.id.clone(), TrackedWorkOrder::from_order(order));
        }
        for mo in seed.manufacturing_orders {
            self.manufacturing_orders.insert(mo.id.clone(), mo);
        }
    }

    pub fn work_order(&self, id: &str, now_ms: i64) -> Option<WorkOrder> {
        self.work_orders.get(id).map(|wo| wo.snapshot(now_ms))
    }

    pub fn manufacturing_order(&self, id: &str) -> Option<&ManufacturingOrder> {
        self.manufacturing_orders.get(id)
    }

    /// Unknown work orders are created in `Ready` on first mention.
    fn tracked(&mut self, id: &str) -> &mut TrackedWorkOrder {
        self.work_orders.entry(id.to_string()).or_insert_with(|| {
            tracing::debug!("Tracking new work order {}", id);
            TrackedWorkOrder::new(id)
        })
    }

    /// Apply one command at `now_ms` and return the events it produces.
    pub fn apply(&mut self, command: &ClientCommand, now_ms: i64) -> Vec<ServerEvent> {
        match command {
            ClientCommand::Subscribe { .. } | ClientCommand::Unsubscribe { .. } => Vec::new(),

            ClientCommand::StartTimer { work_order_id, .. } => {
                let wo = self.tracked(work_order_id);
                if wo.order.status.is_terminal() {
                    tracing::warn!("Ignoring start_timer for completed work order {}", work_order_id);
                    return Vec::new();
                }
                wo.start(now_ms);
                vec![wo.timer_update(now_ms)]
            }

            ClientCommand::PauseTimer { work_order_id, .. } => {
                let wo = self.tracked(work_order_id);
                wo.stop(now_ms);
                vec![wo.timer_update(now_ms)]
            }

            ClientCommand::StopTimer { work_order_id, .. } => {
                let wo = self.tracked(work_order_id);
                wo.stop(now_ms);
                wo.order.end_time = DateTime::from_timestamp_millis(now_ms);
                vec![wo.timer_update(now_ms)]
            }

            ClientCommand::WorkOrderStatusUpdate {
                work_order_id,
                status,
                ..
            } => {
                let Some(next) = WorkOrderStatus::parse(status) else {
                    tracing::warn!("Unknown work order status {:?} for {}", status, work_order_id);
                    return Vec::new();
                };

                let wo = self.tracked(work_order_id);
                let current = wo.order.status;
                if current.is_terminal() && next != current {
                    tracing::warn!("Refusing to reopen completed work order {} as {}", work_order_id, next);
                    return Vec::new();
                }
                if current != next && !current.can_transition_to(next) {
                    tracing::debug!("Out-of-order transition {} -> {} for {}", current, next, work_order_id);
                }
                wo.order.status = next;
                match next {
                    WorkOrderStatus::Started => wo.start(now_ms),
                    WorkOrderStatus::Paused => wo.stop(now_ms),
                    WorkOrderStatus::Completed => {
                        wo.stop(now_ms);
                        wo.order.actual_duration = Some((wo.elapsed_secs(now_ms) / 60) as u32);
                        wo.order.end_time = wo.order.end_time.or(DateTime::from_timestamp_millis(now_ms));
                    }
                    WorkOrderStatus::Ready => {}
                }

                let mut events = vec![
                    ServerEvent::StatusChange {
                        id: work_order_id.clone(),
                        entity_type: EntityKind::WorkOrder,
                        status: next.to_string(),
                    },
                    ServerEvent::WorkOrderUpdate(wo.snapshot(now_ms)),
                ];
                if next == WorkOrderStatus::Completed {
                    if let Some(mo_id) = wo.order.manufacturing_order_id.clone() {
                        events.extend(self.finish_manufacturing_order(&mo_id));
                    }
                }
                events
            }

            ClientCommand::ManufacturingOrderStatusUpdate {
                manufacturing_order_id,
                status,
                ..
            } => {
                let mo = self
                    .manufacturing_orders
                    .entry(manufacturing_order_id.clone())
                    .or_insert_with(|| ManufacturingOrder::new(manufacturing_order_id.as_str()));
                mo.status = status.clone();

                vec![
                    ServerEvent::StatusChange {
                        id: manufacturing_order_id.clone(),
                        entity_type: EntityKind::ManufacturingOrder,
                        status: status.clone(),
                    },
                    ServerEvent::ManufacturingOrderUpdate(mo.clone()),
                ]
            }
        }
    }

    /// Mark a known manufacturing order done once every work order linked to
    /// it has completed.
    fn finish_manufacturing_order(&mut self, mo_id: &str) -> Vec<ServerEvent> {
        let pending = self
            .work_orders
            .values()
            .filter(|wo| wo.order.manufacturing_order_id.as_deref() == Some(mo_id))
            .any(|wo| !wo.order.status.is_terminal());
        if pending {
            return Vec::new();
        }
        let Some(mo) = self.manufacturing_orders.get_mut(mo_id) else {
            return Vec::new();
        };
        if mo.status == MANUFACTURING_ORDER_DONE {
            return Vec::new();
        }

        tracing::info!("All work orders of {} completed, marking it {}", mo_id, MANUFACTURING_ORDER_DONE);
        mo.status = MANUFACTURING_ORDER_DONE.to_string();
        vec![
            ServerEvent::StatusChange {
                id: mo_id.to_string(),
                entity_type: EntityKind::ManufacturingOrder,
                status: MANUFACTURING_ORDER_DONE.to_string(),
            },
            ServerEvent::ManufacturingOrderUpdate(mo.clone()),
        ]
    }

    /// A `timer_update` for every running timer, for periodic reconciliation.
    pub fn running_timers(&self, now_ms: i64) -> Vec<ServerEvent> {
        let mut running: Vec<_> = self
            .work_orders
            .values()
            .filter(|wo| wo.running_since.is_some())
            .collect();
        running.sort_by(|a, b| a.order.id.cmp(&b.order.id));
        running.into_iter().map(|wo| wo.timer_update(now_ms)).collect()
    }
}
