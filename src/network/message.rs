//! Wire messages
//!
//! One JSON object per line: `{"name": .., "payload": .., "info": {"address": {"ip": .., "port": ..}}}`.
//! Decoding happens in two steps so that an unknown `name` is reported as a
//! protocol error while a bad payload for a known name is a decode error.

use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

/// `ip:port` identity of a peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub ip: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: impl Into<String>, port: u16) -> PeerAddress {
        PeerAddress {
            ip: ip.into(),
            port,
        }
    }

    /// Key the connection pool files this peer under
    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn to_socket_addr(&self) -> Result<SocketAddr> {
        (self.ip.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| BlockchainError::Transport(format!("Cannot resolve {self}: {e}")))?
            .next()
            .ok_or_else(|| BlockchainError::Transport(format!("No address found for {self}")))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for PeerAddress {
    type Err = BlockchainError;

    fn from_str(s: &str) -> Result<Self> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| BlockchainError::Decode(format!("Expected ip:port, got {s}")))?;
        if ip.is_empty() {
            return Err(BlockchainError::Decode(format!("Missing ip in {s}")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| BlockchainError::Decode(format!("Invalid port in {s}: {e}")))?;
        Ok(PeerAddress::new(ip, port))
    }
}

fn now_or_zero() -> u64 {
    current_timestamp().unwrap_or(0)
}

/// A peer as advertised in a `peers` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub ip: String,
    pub port: u16,
    #[serde(default = "now_or_zero")]
    pub last_seen: u64,
}

impl Peer {
    pub fn address(&self) -> PeerAddress {
        PeerAddress::new(self.ip.clone(), self.port)
    }
}

impl From<&PeerAddress> for Peer {
    fn from(address: &PeerAddress) -> Self {
        Peer {
            ip: address.ip.clone(),
            port: address.port,
            last_seen: now_or_zero(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub block_height: u64,
    #[serde(default)]
    pub peer_count: u64,
    pub is_miner: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub address: PeerAddress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Ping(Ping),
    Peers(Vec<Peer>),
    Block(Block),
    Transaction(Transaction),
}

impl Payload {
    pub fn name(&self) -> &'static str {
        match self {
            Payload::Ping(_) => "ping",
            Payload::Peers(_) => "peers",
            Payload::Block(_) => "block",
            Payload::Transaction(_) => "transaction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub payload: Payload,
    pub info: MessageInfo,
}

// Shape shared by every message before the payload is typed
#[derive(Serialize, Deserialize)]
struct Envelope {
    name: String,
    payload: serde_json::Value,
    info: MessageInfo,
}

fn typed<T: for<'de> Deserialize<'de>>(name: &str, payload: serde_json::Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| BlockchainError::Decode(format!("Invalid {name} payload: {e}")))
}

impl Message {
    pub fn new(from: PeerAddress, payload: Payload) -> Message {
        Message {
            payload,
            info: MessageInfo { address: from },
        }
    }

    pub fn ping(from: PeerAddress, block_height: u64, peer_count: u64, is_miner: bool) -> Message {
        Message::new(
            from,
            Payload::Ping(Ping {
                block_height,
                peer_count,
                is_miner,
            }),
        )
    }

    pub fn peers(from: PeerAddress, peers: Vec<Peer>) -> Message {
        Message::new(from, Payload::Peers(peers))
    }

    pub fn block(from: PeerAddress, block: Block) -> Message {
        Message::new(from, Payload::Block(block))
    }

    pub fn transaction(from: PeerAddress, tx: Transaction) -> Message {
        Message::new(from, Payload::Transaction(tx))
    }

    pub fn name(&self) -> &'static str {
        self.payload.name()
    }

    pub fn sender(&self) -> &PeerAddress {
        &self.info.address
    }

    /// One line of JSON, without the trailing newline
    pub fn encode(&self) -> Result<String> {
        let payload = match &self.payload {
            Payload::Ping(ping) => serde_json::to_value(ping),
            Payload::Peers(peers) => serde_json::to_value(peers),
            Payload::Block(block) => serde_json::to_value(block),
            Payload::Transaction(tx) => serde_json::to_value(tx),
        }
        .map_err(|e| BlockchainError::Serialization(format!("Failed to encode payload: {e}")))?;

        let envelope = Envelope {
            name: self.name().to_string(),
            payload,
            info: self.info.clone(),
        };
        serde_json::to_string(&envelope)
            .map_err(|e| BlockchainError::Serialization(format!("Failed to encode message: {e}")))
    }

    /// Parses and shape-checks one record.
    pub fn decode(record: &str) -> Result<Message> {
        let envelope: Envelope = serde_json::from_str(record.trim_end_matches(['\r', '\n']))
            .map_err(|e| BlockchainError::Decode(format!("Malformed message: {e}")))?;

        let name = envelope.name.as_str();
        let payload = match name {
            "ping" => Payload::Ping(typed(name, envelope.payload)?),
            "peers" => Payload::Peers(typed(name, envelope.payload)?),
            "block" => Payload::Block(typed(name, envelope.payload)?),
            "transaction" => Payload::Transaction(typed(name, envelope.payload)?),
            other => {
                return Err(BlockchainError::Protocol(format!(
                    "No handler for message '{other}'"
                )))
            }
        };

        Ok(Message {
            payload,
            info: envelope.info,
        })
    }
}
