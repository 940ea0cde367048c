//! Test utilities for protocol and ledger testing

use crate::core::{Blockchain, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::{Connection, ConnectionPool, Dialer, Message, PeerAddress, Protocol, ProtocolSettings};
use crate::utils::{ed25519_public_key, new_private_key};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Target every hash except the maximum satisfies
pub const EASY_TARGET: &str = "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

/// In-memory stand-in for a socket's write half
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> SharedBuffer {
        SharedBuffer::default()
    }

    pub fn lines(&self) -> Vec<String> {
        let bytes = self.inner.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lines()
            .iter()
            .map(|line| Message::decode(line).unwrap())
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer whose every write fails, like a peer that hung up
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"))
    }
}

/// Dialer that hands out in-memory connections and remembers who it dialed
#[derive(Default)]
pub struct RecordingDialer {
    dialed: Mutex<Vec<(PeerAddress, SharedBuffer)>>,
    refused: Mutex<Vec<PeerAddress>>,
}

impl RecordingDialer {
    pub fn refuse(&self, address: PeerAddress) {
        self.refused.lock().unwrap().push(address);
    }

    pub fn dialed(&self) -> Vec<PeerAddress> {
        self.dialed
            .lock()
            .unwrap()
            .iter()
            .map(|(address, _)| address.clone())
            .collect()
    }

    pub fn buffers(&self) -> Vec<SharedBuffer> {
        self.dialed
            .lock()
            .unwrap()
            .iter()
            .map(|(_, buffer)| buffer.clone())
            .collect()
    }
}

impl Dialer for RecordingDialer {
    fn dial(&self, address: &PeerAddress, _protocol: Arc<Protocol>) -> Result<Arc<Connection>> {
        if self.refused.lock().unwrap().contains(address) {
            return Err(BlockchainError::Transport(format!(
                "Connection refused by {address}"
            )));
        }
        let buffer = SharedBuffer::new();
        self.dialed
            .lock()
            .unwrap()
            .push((address.clone(), buffer.clone()));
        Ok(Connection::from_writer(address.clone(), buffer))
    }
}

/// A protocol over a fresh easy-target chain and an empty pool
pub fn create_test_protocol() -> (Arc<Protocol>, Arc<RecordingDialer>) {
    let blockchain = Arc::new(Blockchain::with_target(EASY_TARGET).unwrap());
    let pool = Arc::new(ConnectionPool::new());
    let dialer = Arc::new(RecordingDialer::default());
    let settings = ProtocolSettings::new(PeerAddress::new("127.0.0.1", 1101));
    let protocol = Protocol::new(blockchain, pool, settings, dialer.clone());
    (protocol, dialer)
}

/// Mints and appends `count` blocks on an easy-target chain
pub fn mine_blocks(blockchain: &Blockchain, count: usize) {
    for _ in 0..count {
        let block = blockchain.mint_next_block().unwrap();
        blockchain.add_block(block).unwrap();
    }
}

pub fn signed_transaction(amount: u64) -> Transaction {
    let private_key = new_private_key();
    let public_key = ed25519_public_key(&private_key).unwrap();
    Transaction::sign(&private_key, &public_key, "test-receiver", amount).unwrap()
}
