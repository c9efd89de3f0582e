//! topoverify -- topology discovery and routing verification for emulated
//! mobile networks.
//!
//! The crate discovers every component of a running emulated network (UEs,
//! radio nodes, user-plane and control-plane functions, edge server), then
//! checks reachability, bandwidth and the actual routing path by running
//! probes while packet captures are active on the intermediate hops.

pub mod capture;
pub mod config;
pub mod correlate;
pub mod exec;
pub mod inventory;
pub mod probes;
pub mod report;
pub mod topology;
pub mod verify;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{Config, TransportConfig, TransportKind};
use crate::exec::docker::DockerExecutor;
use crate::exec::local::LocalExecutor;
use crate::exec::SharedExecutor;
use crate::inventory::Inventory;
use crate::topology::{Topology, TopologyError};
use crate::verify::{Check, Rows, Verifier};

/// Executor for the configured transport.
pub fn executor(transport: &TransportConfig, kill_after: std::time::Duration) -> SharedExecutor {
    match transport.kind {
        TransportKind::Docker => Arc::new(DockerExecutor::new(&transport.docker_binary, kill_after)),
        TransportKind::Local => Arc::new(LocalExecutor),
    }
}

/// Discover the topology described by `config`.
pub async fn discover(executor: SharedExecutor, config: &Config) -> Result<Topology, TopologyError> {
    let inventory = Inventory::new(
        executor,
        config.topology.excluded_interfaces.clone(),
        config.probes.command_timeout(),
    );
    Topology::build(
        &inventory,
        &config.naming,
        config.topology.ue_count,
        config.topology.radio_nodes(),
    )
    .await
}

/// Discover the topology and run one check against it.
pub async fn run(config: Config, check: Check) -> Result<Rows> {
    let executor = executor(&config.transport, config.capture.stop_grace());
    run_with(executor, config, check).await
}

/// [`run`] over a caller-supplied executor.
pub async fn run_with(executor: SharedExecutor, config: Config, check: Check) -> Result<Rows> {
    tracing::info!(%check, transport = ?config.transport.kind, "starting verification");

    let topology = discover(executor.clone(), &config)
        .await
        .context("topology discovery failed")?;

    let verifier = Verifier::new(executor, config);
    let rows = verifier.run(check, &topology).await;

    tracing::info!(%check, rows = rows.len(), "verification complete");
    Ok(rows)
}
