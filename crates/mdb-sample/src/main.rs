use mdb_runtime::setup_tracing;
use mdb_runtime::ContainerConfig;
use mdb_sample::lifecycle::{MessagingSystem, ORDERS_QUEUE};
use mdb_sample::model::TextMessage;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), String> {
    // Setup tracing once for the entire application
    setup_tracing();

    let config = ContainerConfig::from_env().map_err(|e| e.to_string())?;
    info!(container_id = %config.container_id, "Starting order audit service");

    let system = MessagingSystem::start(config).await.map_err(|e| e.to_string())?;

    let bodies = ["order:A-100:1250", "order:A-101:990", "not an order", "poison", "order:A-102:4500"];
    for body in bodies {
        system.send(TextMessage::new(ORDERS_QUEUE, body));
    }

    if !system.audit_log().wait_for(3, Duration::from_secs(5)).await {
        warn!(audited = system.audit_log().len(), "Timed out waiting for audits");
    }
    // Failing messages are retried before they are dead-lettered.
    tokio::time::sleep(Duration::from_millis(200)).await;

    for entry in system.audit_log().entries() {
        info!(order_id = %entry.order_id, amount_cents = entry.amount_cents, handled_by = entry.handled_by, "Audited");
    }
    for message in system.adapter.dead_letters() {
        warn!(message_id = %message.id, body = %message.body, "Dead-lettered");
    }
    if let Ok(stats) = system.container.instance_stats(&system.order_audit_id()) {
        info!(live = stats.live, idle = stats.idle, limit = ?stats.limit, "Instance pool");
    }

    system.shutdown().await;
    info!("Application completed successfully");
    Ok(())
}
