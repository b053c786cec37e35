//! Trackmint operator console
//!
//! Follows work orders over the live-update channel and lets an operator
//! start, pause, resume and complete them from the terminal. Without ids it
//! follows every work order the API lists as not yet completed.
//!
//! ```text
//! trackmint-client wo-1 wo-2
//! > start wo-1
//! > status
//! ```

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use trackmint_client::components::{TimerAction, TimerDisplay};
use trackmint_client::{ApiClient, ClientConfig, Transport, UpdateCallbacks, UpdateCoordinator, WsTransport};
use trackmint_shared::{EntityKind, WorkOrder, WorkOrderStatus, WorkOrderStatusChange};

const HELP: &str = "commands: start|pause|resume|complete <id>, status, updates, quit";

/// Live updates forwarded from coordinator callbacks to the console loop.
enum ConsoleUpdate {
    Connection(bool),
    Timer { work_order_id: String, elapsed: u64 },
    Status { work_order_id: String, status: WorkOrderStatus },
    WorkOrder(WorkOrder),
}

fn console_callbacks(tx: mpsc::UnboundedSender<ConsoleUpdate>) -> UpdateCallbacks {
    let (conn_tx, timer_tx, status_tx, wo_tx) = (tx.clone(), tx.clone(), tx.clone(), tx);

    UpdateCallbacks::default()
        .on_connection_change(move |up| {
            let _ = conn_tx.send(ConsoleUpdate::Connection(up));
        })
        .on_timer_update(move |id, elapsed| {
            let _ = timer_tx.send(ConsoleUpdate::Timer {
                work_order_id: id.to_string(),
                elapsed,
            });
        })
        .on_status_change(move |id, entity_type, status| {
            if EntityKind::parse(entity_type) != Some(EntityKind::WorkOrder) {
                tracing::info!("{} {} is now {}", entity_type, id, status);
                return;
            }
            match WorkOrderStatus::parse(status) {
                Some(status) => {
                    let _ = status_tx.send(ConsoleUpdate::Status {
                        work_order_id: id.to_string(),
                        status,
                    });
                }
                None => tracing::warn!("Unknown work order status {:?} for {}", status, id),
            }
        })
        .on_work_order_update(move |payload| {
            match serde_json::from_value::<WorkOrder>(payload.clone()) {
                Ok(work_order) => {
                    let _ = wo_tx.send(ConsoleUpdate::WorkOrder(work_order));
                }
                Err(e) => tracing::warn!("Unreadable work order update: {}", e),
            }
        })
        .on_manufacturing_order_update(|payload| {
            tracing::info!("Manufacturing order update: {}", payload);
        })
}

/// Displays for every listed work order that can still be worked on.
fn open_displays(work_orders: &[WorkOrder]) -> HashMap<String, TimerDisplay> {
    work_orders
        .iter()
        .filter(|wo| !wo.status.is_terminal())
        .map(|wo| (wo.id.clone(), TimerDisplay::from_work_order(wo)))
        .collect()
}

async fn load_display(api: &ApiClient, id: &str) -> TimerDisplay {
    match api.get_work_order(id).await {
        Ok(work_order) => TimerDisplay::from_work_order(&work_order),
        Err(e) => {
            tracing::warn!("Could not load work order {}: {}", id, e.user_message());
            TimerDisplay::new(id, WorkOrderStatus::Ready, 0)
        }
    }
}

/// Persist a status transition over REST in the background.
fn persist_status(api: &ApiClient, display: &TimerDisplay, previous: WorkOrderStatus) {
    let mut change = WorkOrderStatusChange::new(display.status());
    let now = chrono::Utc::now();
    match display.status() {
        WorkOrderStatus::Started if previous == WorkOrderStatus::Ready => {
            change.actual_start_date = Some(now);
        }
        WorkOrderStatus::Completed => {
            change.actual_end_date = Some(now);
            change.actual_duration = Some((display.elapsed_seconds() / 60) as u32);
        }
        _ => {}
    }

    let api = api.clone();
    let id = display.work_order_id().to_string();
    tokio::spawn(async move {
        if let Err(e) = api.update_work_order_status(&id, &change).await {
            tracing::warn!("Failed to persist status of {}: {}", id, e.user_message());
        }
    });
}

fn apply_update<T: Transport>(
    update: ConsoleUpdate,
    displays: &mut HashMap<String, TimerDisplay>,
    coordinator: &UpdateCoordinator<T>,
) {
    match update {
        ConsoleUpdate::Connection(true) => {
            println!("connected");
            for display in displays.values_mut() {
                display.mount(coordinator);
            }
        }
        ConsoleUpdate::Connection(false) => println!("disconnected"),
        ConsoleUpdate::Timer { work_order_id, elapsed } => {
            if let Some(display) = displays.get_mut(&work_order_id) {
                display.apply_timer_update(elapsed);
            }
        }
        ConsoleUpdate::Status { work_order_id, status } => {
            if let Some(display) = displays.get_mut(&work_order_id) {
                display.apply_status(status);
                println!("{} is now {}", work_order_id, status);
            }
        }
        ConsoleUpdate::WorkOrder(work_order) => {
            if let Some(display) = displays.get_mut(&work_order.id) {
                display.apply_work_order(&work_order);
            }
        }
    }
}

/// Returns false when the operator asked to quit.
fn handle_command<T: Transport>(
    line: &str,
    displays: &mut HashMap<String, TimerDisplay>,
    coordinator: &UpdateCoordinator<T>,
    api: &ApiClient,
) -> bool {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (None, _) => {}
        (Some("quit" | "exit"), _) => return false,
        (Some("status"), _) => {
            let connected = coordinator.is_connected();
            let mut ids: Vec<_> = displays.keys().cloned().collect();
            ids.sort();
            for id in ids {
                let display = &displays[&id];
                let actions: Vec<_> = display
                    .enabled_actions(connected)
                    .iter()
                    .map(TimerAction::label)
                    .collect();
                println!(
                    "{:<12} {:<10} {}  [{}]",
                    id,
                    display.status(),
                    display.elapsed_label(),
                    actions.join(", ")
                );
            }
        }
        (Some("updates"), _) => {
            for update in coordinator.updates().iter().take(10) {
                println!("{} {:<28} {}", update.received_at, update.kind, update.id);
            }
        }
        (Some(command), Some(id)) => match TimerAction::parse(command) {
            Some(action) => match displays.get_mut(id) {
                Some(display) => {
                    let previous = display.status();
                    match display.perform(action, coordinator) {
                        Ok(status) => {
                            println!("{} -> {}", id, status);
                            persist_status(api, display, previous);
                        }
                        Err(e) => println!("{}: {}", id, e),
                    }
                }
                None => println!("not following work order {}", id),
            },
            None => println!("{}", HELP),
        },
        _ => println!("{}", HELP),
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trackmint_client=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let work_order_ids: Vec<String> = std::env::args().skip(1).collect();

    let config = ClientConfig::from_env();
    let api = ApiClient::new()
        .with_base_url(config.api_url.clone())
        .with_token(config.api_token.clone());

    let mut displays = HashMap::new();
    if work_order_ids.is_empty() {
        let work_orders = api
            .list_work_orders()
            .await
            .map_err(|e| anyhow!("could not list work orders: {}", e.user_message()))?;
        displays = open_displays(&work_orders);
        if displays.is_empty() {
            bail!("no open work orders; usage: trackmint-client [<work-order-id>...]");
        }
    }
    for id in &work_order_ids {
        displays.insert(id.clone(), load_display(&api, id).await);
    }

    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let (transport, mut events) = WsTransport::new(config.ws_url.clone(), config.reconnect.clone());
    let mut coordinator = UpdateCoordinator::new(transport.clone(), console_callbacks(update_tx));

    tracing::info!("Connecting to {}", transport.url());
    transport.connect();
    println!("{}", HELP);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = events.next() => coordinator.handle_event(event),
            Some(update) = update_rx.recv() => apply_update(update, &mut displays, &coordinator),
            _ = ticker.tick() => displays.values_mut().for_each(TimerDisplay::tick),
            line = stdin.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle_command(&line, &mut displays, &coordinator, &api) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = &mut shutdown => break,
        }
    }

    for display in displays.values_mut() {
        display.unmount(&coordinator);
    }
    transport.disconnect();
    Ok(())
}
