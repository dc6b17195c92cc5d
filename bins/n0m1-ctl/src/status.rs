use anyhow::Result;
use n0m1_common::ComponentId;
use n0m1_pid_file::{HandleStatus, PidDirectory};
use n0m1_store::{ComponentOverview, EventRecord};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::context::Context;

const RECENT_WINDOW: Duration = Duration::from_secs(3600);
const RECENT_ERRORS: usize = 5;
const HISTORY_LENGTH: usize = 5;

pub async fn show(ctx: &Context, detailed: bool) -> Result<()> {
    let boot = match ctx.boot_pid().await {
        Some(pid) if ctx.platform.is_running(pid) => HandleStatus::Running { pid },
        Some(pid) => HandleStatus::StalePid { pid },
        None => HandleStatus::Stopped,
    };
    println!("Boot system: {}", boot);

    if !ctx.database_path().is_file() {
        println!("Database: not found at {}", ctx.database_path().display());
        return Ok(());
    }
    let store = ctx.open_store().await?;
    let events = store.lifecycle();

    println!();
    println!("Supervisors:");
    let supervisors = events.latest_with_prefix("boot_", RECENT_WINDOW).await?;
    if supervisors.is_empty() {
        println!("  (no recent supervisor events)");
    }
    for event in &supervisors {
        let name = event
            .component_id
            .strip_prefix("boot_")
            .unwrap_or(&event.component_id);
        println!(
            "  {:<24} {:<28} {}{}",
            name,
            event.kind,
            event.timestamp,
            pid_suffix(event.pid)
        );
    }

    println!();
    println!("Components:");
    let mut by_owner: BTreeMap<String, Vec<ComponentOverview>> = BTreeMap::new();
    for row in events.component_overview(RECENT_WINDOW).await? {
        by_owner.entry(row.supervisor.clone()).or_default().push(row);
    }
    if by_owner.is_empty() {
        println!("  (registry is empty)");
    }

    let pids = PidDirectory::new(ctx.supervisor.supervisor.pid_path());
    for (owner, rows) in &by_owner {
        println!("  [{}]", owner);
        for row in rows {
            let last = row
                .last_event
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "NO_RECENT_EVENTS".to_string());
            println!(
                "    {:<24} {:<9} {:<24} {}",
                row.component_id,
                row.desired_state,
                last,
                row.last_event_time.as_deref().unwrap_or("-")
            );

            if detailed {
                let id = ComponentId::from(row.component_id.as_str());
                let handle = pids.status(&id, ctx.platform.as_ref()).await;
                println!("      handle: {}", handle);
                let history = events.events_for(&id).await?;
                for event in history.iter().rev().take(HISTORY_LENGTH) {
                    println!("      {}", describe(event));
                }
            }
        }
    }

    let errors = events.recent_errors(RECENT_WINDOW, RECENT_ERRORS).await?;
    if !errors.is_empty() {
        println!();
        println!("Recent errors:");
        for event in &errors {
            println!("  {} {}", event.component_id, describe(event));
        }
    }

    Ok(())
}

fn describe(event: &EventRecord) -> String {
    format!(
        "{} {}{}: {}",
        event.timestamp,
        event.kind,
        pid_suffix(event.pid),
        event.message.as_deref().unwrap_or("")
    )
}

fn pid_suffix(pid: Option<u32>) -> String {
    pid.map(|pid| format!(" (PID {})", pid)).unwrap_or_default()
}
