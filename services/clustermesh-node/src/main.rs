use anyhow::{bail, Context};
use clustermesh_core::logging::{self, LogFormat};
use clustermesh_core::Config;
use clustermesh_mesh::{
    ClusterNode, InMemoryMedium, NetworkTotals, NodeRuntime, NodeSettings, RngIndices,
    RuntimeClock, RuntimeSettings, Topology,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

mod results;

const NODE_PROTOCOL_VERSION: u32 = 1;
const NODE_RUNTIME_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    runtime_version: u32,
    protocol_version: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            runtime_version: NODE_RUNTIME_VERSION,
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let format = if args.iter().any(|arg| arg == "--json-logs") {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init(format);

    let config = match parse_config_path(&args)? {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            warn!("no --config given, running with defaults");
            let config = Config::default_config();
            config.validate()?;
            config
        }
    };

    run(&config).await
}

async fn run(config: &Config) -> anyhow::Result<()> {
    let sim = &config.simulation;
    let topology = Topology::from_config(&sim.topology, sim.node_count);
    let medium = InMemoryMedium::new(topology, sim.loss_rate, sim.seed);
    let clock = RuntimeClock::start();
    let settings = RuntimeSettings::from_config(config);

    info!(
        nodes = sim.node_count,
        topology = ?sim.topology,
        loss_rate = sim.loss_rate,
        duration_ms = sim.duration_ms,
        "starting simulation"
    );

    let mut handles = Vec::with_capacity(sim.node_count as usize);
    for node_id in 0..sim.node_count {
        let inbox = medium.attach(node_id)?;
        let node = ClusterNode::new(
            node_id,
            NodeSettings::from_config(config),
            RngIndices::seeded(sim.seed.wrapping_add(u64::from(node_id))),
        );
        handles.push(NodeRuntime::spawn(
            node,
            inbox,
            medium.clone(),
            settings.clone(),
            clock,
        ));
    }

    tokio::select! {
        _ = tokio::time::sleep(sim.duration()) => info!("simulation time elapsed"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for ctrl-c")?;
            info!("interrupted, stopping nodes");
        }
    }

    let mut summaries = Vec::with_capacity(handles.len());
    for handle in handles {
        let node_id = handle.node_id();
        let report = handle.stop().await?;
        info!(
            node_id,
            role = ?report.final_status.role,
            cluster_head = ?report.final_status.cluster_head,
            class = ?report.final_status.display_class,
            tenures = report.tenures.len(),
            "final state"
        );
        summaries.push(report.summary);
    }

    results::append(&sim.results_path, &summaries)?;

    let totals = NetworkTotals::from_summaries(&summaries);
    info!(
        delivery_ratio = totals.delivery_ratio,
        average_latency_ms = totals.average_latency_ms,
        throughput_bps = totals.total_throughput_bps,
        control_overhead = totals.control_overhead,
        average_role_changes = totals.average_role_changes,
        results = %sim.results_path.display(),
        "simulation finished"
    );
    Ok(())
}

fn parse_config_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            if let Some(path) = args_iter.next() {
                return Ok(Some(PathBuf::from(path)));
            }
            bail!("--config was provided without a path");
        }
    }
    Ok(None)
}
