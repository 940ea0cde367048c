use crate::core::INITIAL_TARGET;
use crate::error::{BlockchainError, Result};
use crate::network::{PeerAddress, Timeouts};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 1101;
const DEFAULT_EXTERNAL_IP: &str = "127.0.0.1";

const NODE_HOST_KEY: &str = "NODE_HOST";
const NODE_PORT_KEY: &str = "NODE_PORT";
const NODE_EXTERNAL_IP_KEY: &str = "NODE_EXTERNAL_IP";
const NODE_EXTERNAL_PORT_KEY: &str = "NODE_EXTERNAL_PORT";

/// Hex signing keypair handed to the node by the wallet provider
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WalletKeys {
    pub private_key: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Address peers should use to reach us; defaults to 127.0.0.1:<port>
    pub external_ip: Option<String>,
    pub external_port: Option<u16>,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    /// How often pooled peers are pinged; must stay below the read timeout
    pub keepalive_interval_secs: u64,
    pub gossip_fanout: usize,
    pub peer_count_limit: usize,
    pub max_dials_per_peers_message: usize,
    pub mining: bool,
    pub initial_target: String,
    /// `ip:port` entries dialed at startup
    pub bootstrap_peers: Vec<String>,
    pub wallet: Option<WalletKeys>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            external_ip: None,
            external_port: None,
            connect_timeout_secs: 5,
            read_timeout_secs: 300,
            write_timeout_secs: 5,
            keepalive_interval_secs: 60,
            gossip_fanout: 20,
            peer_count_limit: 50,
            max_dials_per_peers_message: 20,
            mining: false,
            initial_target: INITIAL_TARGET.to_string(),
            bootstrap_peers: Vec::new(),
            wallet: None,
        }
    }
}

impl Config {
    /// Defaults, overlaid by the TOML file if given, overlaid by the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => Self::load_file(path)?,
            None => Config::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_file(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)
            .map_err(|e| BlockchainError::Io(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Config> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `NODE_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(NODE_HOST_KEY) {
            self.host = host;
        }
        if let Some(port) = lookup(NODE_PORT_KEY) {
            self.port = parse_port(NODE_PORT_KEY, &port)?;
        }
        if let Some(ip) = lookup(NODE_EXTERNAL_IP_KEY) {
            self.external_ip = Some(ip);
        }
        if let Some(port) = lookup(NODE_EXTERNAL_PORT_KEY) {
            self.external_port = Some(parse_port(NODE_EXTERNAL_PORT_KEY, &port)?);
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 || self.write_timeout_secs == 0
        {
            return Err(BlockchainError::Config(
                "timeouts must be at least one second".to_string(),
            ));
        }
        if self.keepalive_interval_secs == 0 || self.keepalive_interval_secs >= self.read_timeout_secs
        {
            return Err(BlockchainError::Config(format!(
                "keepalive_interval_secs must be between 1 and {} (read_timeout_secs - 1), got {}",
                self.read_timeout_secs - 1,
                self.keepalive_interval_secs
            )));
        }
        crate::core::parse_target(&self.initial_target)
            .map_err(|e| BlockchainError::Config(format!("initial_target: {e}")))?;
        for peer in &self.bootstrap_peers {
            peer.parse::<PeerAddress>()
                .map_err(|e| BlockchainError::Config(format!("bootstrap_peers: {e}")))?;
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Our own reachable address as advertised in `info.address`
    pub fn external_address(&self) -> PeerAddress {
        PeerAddress::new(
            self.external_ip
                .clone()
                .unwrap_or_else(|| DEFAULT_EXTERNAL_IP.to_string()),
            self.external_port.unwrap_or(self.port),
        )
    }

    pub fn bootstrap_addresses(&self) -> Result<Vec<PeerAddress>> {
        self.bootstrap_peers.iter().map(|peer| peer.parse()).collect()
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            read: Duration::from_secs(self.read_timeout_secs),
            write: Duration::from_secs(self.write_timeout_secs),
        }
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .map_err(|e| BlockchainError::Config(format!("{key}={value} is not a port: {e}")))
}
