//! `cutover status` — report slot roles and instance health.

use std::path::Path;
use std::time::Duration;

use cutover_core::{CutoverConfig, Environment, Role, Slot};
use cutover_health::{HttpProbe, Probe, ProbeResult};
use cutover_runtime::{ContainerCli, ContainerRuntime};

pub async fn status(config_path: &Path) -> anyhow::Result<()> {
    let config = CutoverConfig::load_or_default(config_path)?;
    let runtime = ContainerCli::detect()?;

    let names: Vec<String> = Slot::both()
        .iter()
        .map(|slot| config.instance_name(*slot))
        .collect();
    let running = runtime.list_running(&names).await?;
    let probe = HttpProbe::new(Duration::from_secs(config.health.timeout_secs));

    for slot in Slot::both() {
        let environment = Environment {
            slot,
            instance: config.instance_name(slot),
            port: config.slot_port(slot),
            role: if running.contains(&config.instance_name(slot)) {
                Role::Active
            } else {
                Role::Standby
            },
        };

        let health = if environment.role == Role::Active {
            let address = format!("127.0.0.1:{}", environment.port);
            match probe.check(&address, &config.service.health_path).await {
                ProbeResult::Healthy => "healthy",
                ProbeResult::Unhealthy => "unhealthy",
                ProbeResult::Failed => "unreachable",
            }
        } else {
            "-"
        };

        println!(
            "slot {}  {}  port {}  {}  {}",
            environment.slot, environment.instance, environment.port, environment.role, health
        );
    }

    match running.len() {
        1 => {}
        0 => eprintln!("warning: no slot instance is running; deploys will refuse to guess"),
        _ => eprintln!("warning: both slot instances are running; manual intervention required"),
    }

    Ok(())
}
