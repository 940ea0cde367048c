// This is the gossip protocol: every inbound message is dispatched to a
// handler that reads or mutates the ledger and the connection pool and may
// write messages back to the sender or gossip them to other peers.

use crate::core::{Block, Blockchain, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::connection_pool::{Connection, ConnectionPool};
use crate::network::message::{Message, Payload, Peer, PeerAddress, Ping};
use log::{debug, info, warn};
use std::sync::Arc;

pub const GOSSIP_FANOUT: usize = 20;
pub const PEER_COUNT_LIMIT: usize = 50;
pub const MAX_DIALS_PER_PEERS_MESSAGE: usize = 20;

/// Opens outbound connections for the protocol.
///
/// The returned connection is not yet in the pool; the protocol registers it.
pub trait Dialer: Send + Sync {
    fn dial(&self, address: &PeerAddress, protocol: Arc<Protocol>) -> Result<Arc<Connection>>;
}

#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    /// Address we put in `info.address` and never dial
    pub external_address: PeerAddress,
    pub gossip_fanout: usize,
    pub peer_count_limit: usize,
    pub max_dials_per_peers_message: usize,
    pub is_miner: bool,
}

impl ProtocolSettings {
    pub fn new(external_address: PeerAddress) -> ProtocolSettings {
        ProtocolSettings {
            external_address,
            gossip_fanout: GOSSIP_FANOUT,
            peer_count_limit: PEER_COUNT_LIMIT,
            max_dials_per_peers_message: MAX_DIALS_PER_PEERS_MESSAGE,
            is_miner: false,
        }
    }
}

pub struct Protocol {
    blockchain: Arc<Blockchain>,
    pool: Arc<ConnectionPool>,
    settings: ProtocolSettings,
    dialer: Arc<dyn Dialer>,
}

impl Protocol {
    pub fn new(
        blockchain: Arc<Blockchain>,
        pool: Arc<ConnectionPool>,
        settings: ProtocolSettings,
        dialer: Arc<dyn Dialer>,
    ) -> Arc<Protocol> {
        Arc::new(Protocol {
            blockchain,
            pool,
            settings,
            dialer,
        })
    }

    pub fn blockchain(&self) -> &Arc<Blockchain> {
        &self.blockchain
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    fn local_address(&self) -> PeerAddress {
        self.settings.external_address.clone()
    }

    /// Ping announcing our tip height, live peer count and mining flag
    pub fn ping_message(&self) -> Message {
        let peer_count = self.pool.get_alive_peers(self.settings.peer_count_limit).len();
        Message::ping(
            self.local_address(),
            self.blockchain.get_best_height(),
            peer_count as u64,
            self.settings.is_miner,
        )
    }

    /// Handles one message to completion.
    ///
    /// Validation failures are logged and swallowed; an error returned from
    /// here means the sender's connection should be torn down.
    pub fn handle_message(self: &Arc<Self>, message: Message, sender: &Arc<Connection>) -> Result<()> {
        debug!("Handling {} from {}", message.name(), message.sender());
        let from = message.info.address;
        match message.payload {
            Payload::Ping(ping) => self.handle_ping(ping, sender),
            Payload::Peers(peers) => self.handle_peers(peers, &from),
            Payload::Transaction(tx) => self.handle_transaction(tx, &from),
            Payload::Block(block) => self.handle_block(block, &from, sender),
        }
    }

    fn handle_ping(&self, ping: Ping, sender: &Arc<Connection>) -> Result<()> {
        sender.set_miner(ping.is_miner);

        let peers: Vec<Peer> = self
            .pool
            .get_alive_peers(self.settings.gossip_fanout)
            .iter()
            .filter_map(|connection| connection.get_address())
            .map(|address| Peer::from(&address))
            .collect();
        sender.send(&Message::peers(self.local_address(), peers))?;

        let missing = self.blockchain.get_blocks_after(ping.block_height);
        if !missing.is_empty() {
            info!(
                "Peer {} is at height {}, sending {} blocks",
                sender.describe(),
                ping.block_height,
                missing.len()
            );
        }
        for block in missing {
            sender.send(&Message::block(self.local_address(), block))?;
        }
        Ok(())
    }

    fn handle_peers(self: &Arc<Self>, peers: Vec<Peer>, from: &PeerAddress) -> Result<()> {
        info!("Received {} peers from {from}", peers.len());

        let ping = self.ping_message();
        let mut dialed = 0;
        for peer in peers {
            if dialed >= self.settings.max_dials_per_peers_message {
                debug!("Dial limit reached for peers message from {from}");
                break;
            }

            let address = peer.address();
            if address == self.settings.external_address || self.pool.contains(&address) {
                continue;
            }

            dialed += 1;
            if let Err(e) = self.connect_to(&address, &ping) {
                warn!("Failed to connect to advertised peer {address}: {e}");
            }
        }
        Ok(())
    }

    /// Dials a peer, registers the connection and sends it `ping`.
    pub fn connect_to(self: &Arc<Self>, address: &PeerAddress, ping: &Message) -> Result<Arc<Connection>> {
        let connection = self.dialer.dial(address, Arc::clone(self))?;
        self.pool.add_peer(connection.clone());
        if let Err(e) = connection.send(ping) {
            connection.close();
            self.pool.remove_peer(&connection);
            return Err(e);
        }
        Ok(connection)
    }

    fn handle_transaction(&self, tx: Transaction, from: &PeerAddress) -> Result<()> {
        match tx.verify() {
            Ok(true) => {}
            Ok(false) => {
                warn!("Dropping transaction from {from}: bad signature");
                return Ok(());
            }
            Err(e) => {
                warn!("Dropping transaction from {from}: {e}");
                return Ok(());
            }
        }

        if !self.blockchain.add_pending_transaction(tx.clone()) {
            debug!("Dropping duplicate transaction from {from}");
            return Ok(());
        }

        info!("Accepted transaction from {from}");
        self.pool.gossip(
            &Message::transaction(self.local_address(), tx),
            self.settings.gossip_fanout,
        );
        Ok(())
    }

    fn handle_block(&self, block: Block, from: &PeerAddress, sender: &Arc<Connection>) -> Result<()> {
        let height = block.get_height();
        match self.blockchain.add_block(block.clone()) {
            Ok(()) => {
                info!("Accepted block {} at height {height} from {from}", block.get_hash());
                self.announce_block(block);
                Ok(())
            }
            Err(BlockchainError::Validation(reason)) => {
                let local_height = self.blockchain.get_best_height();
                if height <= local_height {
                    debug!("Ignoring block at height {height} from {from}: {reason}");
                } else {
                    warn!("Rejected block at height {height} from {from}: {reason}");
                }
                // A block from further ahead means we are missing history;
                // our ping makes the sender stream what we lack.
                if height > local_height + 1 {
                    sender.send(&self.ping_message())?;
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Gossips an accepted block to a bounded subset of peers.
    pub fn announce_block(&self, block: Block) -> usize {
        self.pool
            .gossip(&Message::block(self.local_address(), block), self.settings.gossip_fanout)
    }
}
