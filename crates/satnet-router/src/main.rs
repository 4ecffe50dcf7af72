//! Satnet DTN router node
//!
//! Wires a bundle store, a routing policy and the TCP transport into a
//! [`DtnNode`], announces the configured neighbors and runs until Ctrl-C.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use satnet_core::{Bundle, Neighbor, NeighborSnapshot, Priority, Transport};
use satnet_logging::SatnetSubscriberBuilder;
use satnet_node::{DtnNode, StaticContactFeed};
use satnet_routing::{LearnedRouter, RoutingPolicy};
use satnet_storage::{BundleStore, InMemoryBundleStore, RedbBundleStore, RedbStoreConfig};
use satnet_transport::{TcpTransport, TcpTransportConfig, TcpTransportHandle};
use tracing::{info, warn};

use crate::config::{Cli, Command, FileConfig, RouterSettings, RunArgs, StorageBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Verify { rl_model } => verify(&rl_model),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = RouterSettings::resolve(&args, file)?;

    let _log_guard = SatnetSubscriberBuilder::new()
        .with_config(settings.logging.clone())
        .init()
        .context("initializing logging")?;

    info!(
        node = %settings.node.node_id,
        eid = %settings.node.local_eid,
        listen = %settings.listen,
        router = settings.routing.name(),
        storage = ?settings.storage.backend,
        "Starting Satnet router"
    );

    let store = build_store(&settings)?;
    let router = settings
        .routing
        .build()
        .context("building routing policy")?;

    let transport = TcpTransport::bind(TcpTransportConfig::new(
        settings.node.node_id.clone(),
        settings.listen,
    ))
    .await
    .context("binding TCP transport")?;

    for neighbor in &settings.neighbors {
        if let Some(address) = &neighbor.address {
            transport.set_address(neighbor.id.as_str(), address.as_str());
        }
        info!(neighbor = %neighbor.id, eid = %neighbor.eid, address = ?neighbor.address, "Configured neighbor");
    }
    if settings.neighbors.is_empty() {
        warn!("No neighbors configured; bundles will wait for contacts");
    }

    let handle = Arc::new(TcpTransportHandle(transport.clone()));
    let feed = StaticContactFeed::new(settings.neighbors.iter().map(|n| n.to_update()).collect())
        .with_refresh(settings.neighbor_refresh);

    let node = Arc::new(
        DtnNode::new(settings.node.clone(), store, router, handle.clone())
            .with_contact_feed(Box::new(feed)),
    );
    node.start().await?;

    let telemetry = tokio::spawn(report_telemetry(
        node.clone(),
        handle,
        settings.telemetry_interval,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutting down");

    telemetry.abort();
    node.stop().await?;
    transport.shutdown();

    info!("Satnet router stopped");
    Ok(())
}

fn build_store(settings: &RouterSettings) -> anyhow::Result<Arc<dyn BundleStore>> {
    let capacity = settings.storage.capacity;
    let store: Arc<dyn BundleStore> = match settings.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryBundleStore::new(capacity)),
        StorageBackend::Redb => {
            let path = &settings.storage.db_path;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let store = RedbBundleStore::open(RedbStoreConfig::at(path).with_capacity(capacity))
                .with_context(|| format!("opening bundle store {}", path.display()))?;
            Arc::new(store)
        }
    };
    Ok(store)
}

/// Log a stats line every `interval`
async fn report_telemetry(node: Arc<DtnNode>, transport: Arc<TcpTransportHandle>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match node.stats().await {
            Ok(stats) => {
                let counters = stats.counters;
                info!(
                    received = counters.received,
                    forwarded = counters.forwarded,
                    delivered_locally = counters.delivered_locally,
                    dropped = counters.dropped_malformed + counters.rejected_invalid + counters.store_full_drops,
                    expired = counters.expired_purged,
                    pending = stats.pending,
                    failed = stats.failed,
                    neighbors = stats.active_neighbor_count,
                    connections = transport.connection_count(),
                    "Telemetry"
                );
            }
            Err(e) => warn!(error = %e, "Telemetry snapshot failed"),
        }
    }
}

/// Route a sample bundle with the learned model, then again with the
/// chosen hop down, and check the reroute avoids it
fn verify(model_path: &std::path::Path) -> anyhow::Result<()> {
    let router = LearnedRouter::from_path(model_path)
        .with_context(|| format!("loading model {}", model_path.display()))?;
    println!("Loaded learned model v{} from {}", router.version(), model_path.display());

    let neighbors = vec![
        Neighbor::new("ground_earth_1", "dtn://earth/ground001")
            .with_link_quality(0.95)
            .with_latency(Duration::from_millis(50))
            .with_bandwidth(10_000_000)
            .with_battery(0.80),
        Neighbor::new("ground_earth_2", "dtn://earth/ground002")
            .with_link_quality(0.9)
            .with_latency(Duration::from_millis(75))
            .with_bandwidth(8_000_000)
            .with_battery(0.75),
        Neighbor::new("sat_leo_001", "dtn://leo/sat001")
            .with_link_quality(0.85)
            .with_latency(Duration::from_millis(25))
            .with_bandwidth(5_000_000)
            .with_battery(0.55),
    ];
    let sample = Bundle::new(
        "dtn://earth/nysus",
        "dtn://earth/ground001",
        b"verification payload".to_vec(),
        Priority::Normal,
        Duration::from_secs(3600),
    );

    let first = router
        .select_next_hop(&sample, &NeighborSnapshot::new(neighbors.clone(), Utc::now()))
        .context("initial routing failed")?;
    println!("Initial next hop: {first}");

    let degraded: Vec<_> = neighbors
        .into_iter()
        .map(|n| {
            let down = n.id == first;
            n.with_contact_active(!down)
        })
        .collect();
    let reroute = router
        .select_next_hop(&sample, &NeighborSnapshot::new(degraded, Utc::now()))
        .context("reroute after outage failed")?;
    if reroute == first {
        anyhow::bail!("reroute selected the inactive neighbor {first}");
    }

    println!("Reroute next hop after outage: {reroute}");
    println!("Verification passed");
    Ok(())
}
