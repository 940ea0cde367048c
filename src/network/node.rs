use crate::config::Config;
use crate::core::Blockchain;
use crate::error::Result;
use crate::network::connection_pool::ConnectionPool;
use crate::network::keepalive;
use crate::network::miner::{self, MinerHandle};
use crate::network::protocol::{Protocol, ProtocolSettings};
use crate::network::server::{Server, TcpDialer};
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

/// A full node: one ledger, one connection pool and the server sharing them
/// for the life of the process.
pub struct Node {
    protocol: Arc<Protocol>,
    server: Server,
    config: Config,
}

impl Node {
    /// Builds the ledger and binds the listening socket. Nothing is dialed and
    /// no thread is started until `run`.
    pub fn new(config: Config) -> Result<Node> {
        let blockchain = Arc::new(Blockchain::with_target(&config.initial_target)?);
        let pool = Arc::new(ConnectionPool::new());
        let timeouts = config.timeouts();

        let settings = ProtocolSettings {
            external_address: config.external_address(),
            gossip_fanout: config.gossip_fanout,
            peer_count_limit: config.peer_count_limit,
            max_dials_per_peers_message: config.max_dials_per_peers_message,
            is_miner: config.mining,
        };
        let dialer = Arc::new(TcpDialer::new(timeouts));
        let protocol = Protocol::new(blockchain, pool, settings, dialer);

        let server = Server::bind(&config.bind_address(), Arc::clone(&protocol), timeouts)?;
        Ok(Node {
            protocol,
            server,
            config,
        })
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    /// Dials every configured bootstrap peer. Failures are logged and skipped;
    /// returns how many peers were reached.
    pub fn bootstrap(&self) -> Result<usize> {
        let own = self.protocol.settings().external_address.clone();
        let mut connected = 0;
        for address in self.config.bootstrap_addresses()? {
            if address == own || self.protocol.pool().contains(&address) {
                continue;
            }
            match self
                .protocol
                .connect_to(&address, &self.protocol.ping_message())
            {
                Ok(_) => connected += 1,
                Err(e) => warn!("Failed to reach bootstrap peer {address}: {e}"),
            }
        }
        Ok(connected)
    }

    /// Bootstraps, starts the keepalive pings and the miner if enabled, then
    /// serves connections until the listener fails.
    pub fn run(self) -> Result<()> {
        info!(
            "Starting node {} (advertised as {})",
            self.local_addr()?,
            self.protocol.settings().external_address
        );

        let connected = self.bootstrap()?;
        if !self.config.bootstrap_peers.is_empty() {
            info!(
                "Connected to {connected} of {} bootstrap peers",
                self.config.bootstrap_peers.len()
            );
        }

        let miner: Option<MinerHandle> = if self.config.mining {
            Some(miner::spawn(Arc::clone(&self.protocol))?)
        } else {
            None
        };

        let keepalive =
            keepalive::spawn(Arc::clone(&self.protocol), self.config.keepalive_interval())?;

        let result = self.server.run();
        keepalive.stop();
        if let Some(miner) = miner {
            miner.stop();
        }
        result
    }
}
