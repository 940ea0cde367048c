//! # Gossip Ledger - A Minimal Proof-of-Work Node
//!
//! This is a small peer-to-peer ledger node. Every node keeps the whole chain
//! in memory, gossips signed transactions and mined blocks to its peers over
//! newline-delimited JSON on TCP, and can mine blocks itself.
//!
//! ## How I Organized My Code
//! - `core/`: transactions, blocks, proof-of-work, retargeting and the ledger
//! - `network/`: wire messages, the connection pool, the gossip protocol,
//!   the server/dialer and the miner thread
//! - `config/`: node settings from TOML and the environment
//! - `utils/`: hashing, Ed25519 signing, canonical JSON and timestamps
//! - `cli/`: command-line interface for the node binary
//!
//! ## Key Design Decisions I Made
//! - One OS thread per connection; the ledger and the pool are shared behind
//!   locks and every ledger check-then-act happens under a single lock
//! - Decode and protocol errors close the offending connection, invalid
//!   transactions and blocks are only logged and dropped
//! - No persistence and no fork choice: a block either extends the current tip
//!   or it is rejected
//!
//! ## When I Need to Understand Something
//! 1. Start with `main.rs` to see the CLI commands
//! 2. Look at `core/blockchain.rs` for the ledger rules
//! 3. Check `network/protocol.rs` for what each message does
//! 4. Review `network/server.rs` for how connections are served

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Config, WalletKeys};
pub use core::{Block, Blockchain, DifficultyAdjustment, ProofOfWork, Transaction};
pub use error::{BlockchainError, Result};
pub use network::{
    send_message, Connection, ConnectionPool, Dialer, Message, Node, Payload, Peer, PeerAddress,
    Ping, Protocol, ProtocolSettings, Server, TcpDialer, Timeouts,
};
pub use utils::{
    current_timestamp, ed25519_public_key, ed25519_sign, ed25519_verify, new_private_key,
    sha256_digest,
};
