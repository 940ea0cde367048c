//! Peer-to-peer networking
//!
//! Newline-delimited JSON messages over TCP, the pool of live peer
//! connections, the gossip protocol that runs on top of them, the server and
//! dialer that own the sockets, keepalive pings and the background miner.

pub mod connection_pool;
pub mod keepalive;
pub mod message;
pub mod miner;
pub mod node;
pub mod protocol;
pub mod server;

pub use connection_pool::{Connection, ConnectionPool};
pub use keepalive::KeepaliveHandle;
pub use message::{Message, MessageInfo, Payload, Peer, PeerAddress, Ping};
pub use miner::MinerHandle;
pub use node::Node;
pub use protocol::{Dialer, Protocol, ProtocolSettings};
pub use server::{send_message, serve_connection, Server, TcpDialer, Timeouts};
