//! Router configuration: CLI flags merged over an optional TOML file
//!
//! Every flag overrides the matching file setting. The node ID and EID must
//! come from one of the two.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use satnet_core::{Neighbor, NeighborUpdate};
use satnet_logging::LogConfig;
use satnet_node::NodeConfig;
use satnet_routing::{ContactGraphConfig, EnergyAwareConfig, RouterKind};
use serde::{Deserialize, Serialize};

/// Default TCP listen address
pub const DEFAULT_LISTEN: &str = "0.0.0.0:4556";

/// Default learned model location
pub const DEFAULT_RL_MODEL: &str = "models/rl_router.json";

#[derive(Parser)]
#[command(name = "satnet-router", about = "Store-and-forward DTN router node", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a router node until interrupted
    Run(RunArgs),
    /// Load a learned model and check that it reroutes around an outage
    Verify {
        /// Path to the learned routing model
        #[arg(long, default_value = DEFAULT_RL_MODEL)]
        rl_model: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Unique node identifier
    #[arg(long)]
    pub id: Option<String>,
    /// Endpoint identifier delivered locally (e.g. dtn://earth/ground001)
    #[arg(long)]
    pub eid: Option<String>,
    /// Address to listen on for neighbor connections
    #[arg(long)]
    pub listen: Option<SocketAddr>,
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Routing strategy
    #[arg(long, value_enum)]
    pub router: Option<RouterChoice>,
    /// Path to the learned routing model
    #[arg(long)]
    pub rl_model: Option<PathBuf>,
    /// Bundle store backend
    #[arg(long, value_enum)]
    pub storage: Option<StorageBackend>,
    /// Database file for the redb backend
    #[arg(long)]
    pub db_path: Option<PathBuf>,
    /// Bundle store capacity
    #[arg(long)]
    pub buffer: Option<usize>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Extra neighbors as `id@eid@address`, separated by `;`
    #[arg(long, env = "DTN_NEIGHBORS")]
    pub neighbors: Option<String>,
}

/// Routing strategy selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RouterChoice {
    Static,
    ContactGraph,
    EnergyAware,
    Learned,
}

/// Bundle store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Redb,
}

/// Contents of the TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub node: NodeSection,
    pub storage: StorageSection,
    pub routing: Option<RouterKind>,
    pub logging: LogConfig,
    pub neighbors: Vec<NeighborEntry>,
}

/// `[node]` section; durations are in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub id: Option<String>,
    pub eid: Option<String>,
    pub listen: Option<SocketAddr>,
    pub send_timeout_secs: u64,
    pub egress_interval_secs: u64,
    pub purge_interval_secs: u64,
    pub liveness_timeout_secs: u64,
    pub telemetry_interval_secs: u64,
    /// How often configured neighbors are re-announced
    pub neighbor_refresh_secs: u64,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            id: None,
            eid: None,
            listen: None,
            send_timeout_secs: 30,
            egress_interval_secs: 5,
            purge_interval_secs: 300,
            liveness_timeout_secs: 120,
            telemetry_interval_secs: 30,
            neighbor_refresh_secs: 30,
        }
    }
}

/// `[storage]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
    pub db_path: PathBuf,
    pub capacity: usize,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            db_path: PathBuf::from("./data/satnet.redb"),
            capacity: satnet_storage::DEFAULT_CAPACITY,
        }
    }
}

/// One `[[neighbors]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborEntry {
    pub id: String,
    pub eid: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_link_quality")]
    pub link_quality: f64,
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    #[serde(default = "default_bandwidth")]
    pub bandwidth: u64,
    #[serde(default)]
    pub battery: Option<f64>,
}

fn default_link_quality() -> f64 {
    0.9
}

fn default_latency_ms() -> u64 {
    50
}

fn default_bandwidth() -> u64 {
    5_000_000
}

impl NeighborEntry {
    /// Parse one `id@eid@address` entry
    pub fn parse_short(entry: &str) -> Option<Self> {
        let mut parts = entry.trim().splitn(3, '@');
        let id = parts.next().filter(|s| !s.is_empty())?;
        let eid = parts.next().filter(|s| !s.is_empty())?;
        let address = parts.next().filter(|s| !s.is_empty())?;
        Some(Self {
            id: id.to_string(),
            eid: eid.to_string(),
            address: Some(address.to_string()),
            link_quality: default_link_quality(),
            latency_ms: default_latency_ms(),
            bandwidth: default_bandwidth(),
            battery: None,
        })
    }

    /// Contact feed report for this neighbor
    pub fn to_update(&self) -> NeighborUpdate {
        let mut neighbor = Neighbor::new(self.id.as_str(), self.eid.as_str())
            .with_link_quality(self.link_quality)
            .with_latency(Duration::from_millis(self.latency_ms))
            .with_bandwidth(self.bandwidth);
        if let Some(battery) = self.battery {
            neighbor = neighbor.with_battery(battery);
        }
        if let Some(address) = &self.address {
            neighbor = neighbor.with_address(address.as_str());
        }
        NeighborUpdate::from(&neighbor)
    }
}

/// Parse a `;`-separated neighbor list, skipping malformed entries
pub fn parse_neighbor_list(raw: &str) -> Vec<NeighborEntry> {
    raw.split(';')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(NeighborEntry::parse_short)
        .collect()
}

impl FileConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Fully resolved settings for one router process
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub node: NodeConfig,
    pub listen: SocketAddr,
    pub storage: StorageSection,
    pub routing: RouterKind,
    pub logging: LogConfig,
    pub neighbors: Vec<NeighborEntry>,
    pub telemetry_interval: Duration,
    pub neighbor_refresh: Duration,
}

impl RouterSettings {
    /// Merge command-line flags over the file configuration
    pub fn resolve(args: &RunArgs, file: FileConfig) -> anyhow::Result<Self> {
        let Some(id) = args.id.clone().or(file.node.id.clone()) else {
            bail!("node ID is required (--id or [node].id)");
        };
        let Some(eid) = args.eid.clone().or(file.node.eid.clone()) else {
            bail!("node EID is required (--eid or [node].eid)");
        };
        let listen = match args.listen.or(file.node.listen) {
            Some(addr) => addr,
            None => DEFAULT_LISTEN.parse()?,
        };

        let mut storage = file.storage;
        if let Some(backend) = args.storage {
            storage.backend = backend;
        }
        if let Some(path) = &args.db_path {
            storage.db_path = path.clone();
        }
        if let Some(capacity) = args.buffer {
            storage.capacity = capacity;
        }

        let routing = resolve_routing(args, file.routing);

        let mut logging = file.logging;
        if let Some(level) = &args.log_level {
            logging.default_level = level.clone();
        }

        let mut neighbors = file.neighbors;
        if let Some(raw) = &args.neighbors {
            neighbors.extend(parse_neighbor_list(raw));
        }

        let secs = Duration::from_secs;
        let node = NodeConfig::new(id, eid)
            .with_store_capacity(storage.capacity)
            .with_send_timeout(secs(file.node.send_timeout_secs))
            .with_egress_interval(secs(file.node.egress_interval_secs))
            .with_purge_interval(secs(file.node.purge_interval_secs))
            .with_liveness_timeout(secs(file.node.liveness_timeout_secs));
        node.validate().map_err(anyhow::Error::msg)?;

        Ok(Self {
            node,
            listen,
            storage,
            routing,
            logging,
            neighbors,
            telemetry_interval: secs(file.node.telemetry_interval_secs.max(1)),
            neighbor_refresh: secs(file.node.neighbor_refresh_secs.max(1)),
        })
    }
}

/// Pick the routing strategy
///
/// A `--router` flag keeps the file's parameters when it names the same
/// strategy, and uses that strategy's defaults otherwise. `--rl-model`
/// always wins for the learned strategy.
fn resolve_routing(args: &RunArgs, from_file: Option<RouterKind>) -> RouterKind {
    let from_file = from_file.unwrap_or_default();
    let kind = match args.router {
        None => from_file,
        Some(choice) if choice_name(choice) == from_file.name() => from_file,
        Some(RouterChoice::Static) => RouterKind::Static {
            routes: Vec::new(),
            fallback_to_any_active: true,
        },
        Some(RouterChoice::ContactGraph) => RouterKind::ContactGraph(ContactGraphConfig::default()),
        Some(RouterChoice::EnergyAware) => RouterKind::EnergyAware(EnergyAwareConfig::default()),
        Some(RouterChoice::Learned) => RouterKind::Learned {
            model_path: PathBuf::from(DEFAULT_RL_MODEL),
        },
    };

    match (kind, &args.rl_model) {
        (RouterKind::Learned { .. }, Some(path)) => RouterKind::Learned {
            model_path: path.clone(),
        },
        (kind, _) => kind,
    }
}

fn choice_name(choice: RouterChoice) -> &'static str {
    match choice {
        RouterChoice::Static => "static",
        RouterChoice::ContactGraph => "contact_graph",
        RouterChoice::EnergyAware => "energy_aware",
        RouterChoice::Learned => "learned",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[node]
id = "leo-sat-001"
eid = "dtn://leo/sat001"
listen = "127.0.0.1:4600"
egress_interval_secs = 2

[storage]
backend = "redb"
db_path = "/var/lib/satnet/bundles.redb"
capacity = 500

[routing]
strategy = "energy_aware"

[routing.thresholds]
bulk = 0.4

[[neighbors]]
id = "ground-1"
eid = "dtn://earth/ground001"
address = "10.0.0.1:4556"
battery = 0.8

[[neighbors]]
id = "relay-mars"
eid = "dtn://mars"
link_quality = 0.6
latency_ms = 1200000
"#;

    fn args() -> RunArgs {
        RunArgs::default()
    }

    #[test]
    fn test_file_config_parses() {
        let file: FileConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(file.node.id.as_deref(), Some("leo-sat-001"));
        assert_eq!(file.node.egress_interval_secs, 2);
        assert_eq!(file.node.send_timeout_secs, 30);
        assert_eq!(file.storage.backend, StorageBackend::Redb);
        assert_eq!(file.neighbors.len(), 2);
        assert_eq!(file.neighbors[1].bandwidth, 5_000_000);

        match file.routing {
            Some(RouterKind::EnergyAware(config)) => {
                assert_eq!(config.thresholds.bulk, 0.4);
                assert_eq!(config.thresholds.expedited, 0.10);
            }
            other => panic!("unexpected routing: {other:?}"),
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("router.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.node.eid.as_deref(), Some("dtn://leo/sat001"));

        let err = FileConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn test_flags_override_file() {
        let file: FileConfig = toml::from_str(SAMPLE).unwrap();
        let args = RunArgs {
            id: Some("override".to_string()),
            storage: Some(StorageBackend::Memory),
            buffer: Some(42),
            log_level: Some("debug".to_string()),
            ..args()
        };

        let settings = RouterSettings::resolve(&args, file).unwrap();
        assert_eq!(settings.node.node_id.as_str(), "override");
        assert_eq!(settings.node.local_eid.as_str(), "dtn://leo/sat001");
        assert_eq!(settings.node.store_capacity, 42);
        assert_eq!(settings.node.egress_interval, Duration::from_secs(2));
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert_eq!(settings.logging.default_level, "debug");
        assert_eq!(settings.listen.port(), 4600);
    }

    #[test]
    fn test_missing_identity_is_an_error() {
        let err = RouterSettings::resolve(&args(), FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("node ID"));
    }

    #[test]
    fn test_defaults_without_file() {
        let args = RunArgs {
            id: Some("gs".to_string()),
            eid: Some("dtn://earth/gs".to_string()),
            ..args()
        };
        let settings = RouterSettings::resolve(&args, FileConfig::default()).unwrap();
        assert_eq!(settings.listen.port(), 4556);
        assert_eq!(settings.routing.name(), "contact_graph");
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_router_flag_keeps_matching_file_parameters() {
        let file: FileConfig = toml::from_str(SAMPLE).unwrap();
        let args = RunArgs {
            router: Some(RouterChoice::EnergyAware),
            ..args()
        };
        match resolve_routing(&args, file.routing) {
            RouterKind::EnergyAware(config) => assert_eq!(config.thresholds.bulk, 0.4),
            other => panic!("unexpected routing: {other:?}"),
        }
    }

    #[test]
    fn test_rl_model_flag() {
        let args = RunArgs {
            router: Some(RouterChoice::Learned),
            rl_model: Some(PathBuf::from("/opt/models/v2.json")),
            ..args()
        };
        assert_eq!(
            resolve_routing(&args, None),
            RouterKind::Learned {
                model_path: PathBuf::from("/opt/models/v2.json")
            }
        );
    }

    #[test]
    fn test_parse_neighbor_list() {
        let parsed = parse_neighbor_list("ground-1@dtn://earth/g1@10.0.0.1:4556; bad ;relay@dtn://mars@10.0.0.2:4556;");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].id, "ground-1");
        assert_eq!(parsed[0].address.as_deref(), Some("10.0.0.1:4556"));
        assert_eq!(parsed[1].eid, "dtn://mars");
    }

    #[test]
    fn test_neighbor_entry_to_update() {
        let entry = NeighborEntry::parse_short("g@dtn://earth@127.0.0.1:1").unwrap();
        let update = entry.to_update();
        assert_eq!(update.link_quality, 0.9);
        assert_eq!(update.latency, Duration::from_millis(50));
        assert_eq!(update.address.as_deref(), Some("127.0.0.1:1"));
        assert!(update.contact_active);
    }
}
