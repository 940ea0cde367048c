use crate::error::{BlockchainError, Result};
use crate::network::message::{Message, PeerAddress};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// A live channel to a peer.
///
/// The receive side is driven by the server loop that owns the socket; this
/// half is what the rest of the node writes to. Writes are serialized by a
/// mutex so a block stream and a concurrent gossip never interleave bytes.
pub struct Connection {
    address: RwLock<Option<PeerAddress>>, // learned from `info.address`
    remote: String,                       // transport-level peer, for logs
    writer: Mutex<Box<dyn Write + Send>>,
    socket: Option<TcpStream>, // kept only to shut the socket down
    is_miner: AtomicBool,
    closed: AtomicBool,
}

impl Connection {
    /// Wraps a TCP stream. The stream is cloned for writing; the caller keeps
    /// the original for reading.
    pub fn from_stream(stream: &TcpStream, address: Option<PeerAddress>) -> Result<Arc<Connection>> {
        let remote = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let writer = stream.try_clone()?;
        let socket = stream.try_clone()?;

        Ok(Arc::new(Connection {
            address: RwLock::new(address),
            remote,
            writer: Mutex::new(Box::new(writer)),
            socket: Some(socket),
            is_miner: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }

    /// A connection over any writer, used for in-process peers.
    pub fn from_writer<W: Write + Send + 'static>(address: PeerAddress, writer: W) -> Arc<Connection> {
        Arc::new(Connection {
            remote: address.to_string(),
            address: RwLock::new(Some(address)),
            writer: Mutex::new(Box::new(writer)),
            socket: None,
            is_miner: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn get_address(&self) -> Option<PeerAddress> {
        self.address
            .read()
            .expect("Failed to acquire read lock on connection address - this should never happen")
            .clone()
    }

    pub fn set_address(&self, address: PeerAddress) {
        let mut current = self
            .address
            .write()
            .expect("Failed to acquire write lock on connection address - this should never happen");
        *current = Some(address);
    }

    /// Pool key, or the transport address while the peer is still anonymous
    pub fn describe(&self) -> String {
        self.get_address()
            .map(|address| address.key())
            .unwrap_or_else(|| self.remote.clone())
    }

    pub fn set_miner(&self, is_miner: bool) {
        self.is_miner.store(is_miner, Ordering::SeqCst);
    }

    pub fn is_miner(&self) -> bool {
        self.is_miner.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Writes one newline-terminated message.
    pub fn send(&self, message: &Message) -> Result<()> {
        if self.is_closed() {
            return Err(BlockchainError::Transport(format!(
                "Connection to {} is closed",
                self.describe()
            )));
        }

        let mut line = message.encode()?;
        line.push('\n');

        let mut writer = self
            .writer
            .lock()
            .expect("Failed to acquire connection writer lock - this should never happen");
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        debug!("Sent {} to {}", message.name(), self.describe());
        Ok(())
    }

    /// Marks the connection closed and shuts the socket down. Only the first
    /// call does anything; returns whether this call was it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(socket) = &self.socket {
            let _ = socket.shutdown(Shutdown::Both);
        }
        info!("Closed connection to {}", self.describe());
        true
    }
}

/// Live connections keyed by `ip:port`.
pub struct ConnectionPool {
    inner: RwLock<HashMap<String, Arc<Connection>>>,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionPool {
    pub fn new() -> ConnectionPool {
        ConnectionPool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a connection under its address. The last registration for a
    /// key wins. Returns false when the connection has no address yet.
    pub fn add_peer(&self, connection: Arc<Connection>) -> bool {
        let address = match connection.get_address() {
            Some(address) => address,
            None => {
                warn!(
                    "Not adding anonymous connection {} to the pool",
                    connection.describe()
                );
                return false;
            }
        };

        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on connection pool - this should never happen");
        let key = address.key();
        let replaced = match inner.insert(key.clone(), connection.clone()) {
            Some(previous) => !Arc::ptr_eq(&previous, &connection),
            None => {
                info!("A new peer was added to the pool: {key}");
                false
            }
        };
        if replaced {
            debug!("Replaced pool entry for {key}");
        }
        true
    }

    /// Removes the entry for this connection's address. A key that is absent,
    /// or that now points at a newer connection, is left alone.
    pub fn remove_peer(&self, connection: &Arc<Connection>) {
        let key = match connection.get_address() {
            Some(address) => address.key(),
            None => return,
        };

        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on connection pool - this should never happen");
        let is_same = inner
            .get(&key)
            .map(|registered| Arc::ptr_eq(registered, connection))
            .unwrap_or(false);
        if is_same {
            inner.remove(&key);
            info!("Removed peer from the pool: {key}");
        }
    }

    /// Up to `limit` open connections, in no particular order
    pub fn get_alive_peers(&self, limit: usize) -> Vec<Arc<Connection>> {
        self.inner
            .read()
            .expect("Failed to acquire read lock on connection pool - this should never happen")
            .values()
            .filter(|connection| !connection.is_closed())
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn contains(&self, address: &PeerAddress) -> bool {
        self.inner
            .read()
            .expect("Failed to acquire read lock on connection pool - this should never happen")
            .contains_key(&address.key())
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("Failed to acquire read lock on connection pool - this should never happen")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best-effort delivery to every registered connection.
    pub fn broadcast(&self, message: &Message) -> usize {
        self.send_to_all(self.get_alive_peers(usize::MAX), message)
    }

    /// Best-effort delivery to at most `limit` connections.
    pub fn gossip(&self, message: &Message, limit: usize) -> usize {
        self.send_to_all(self.get_alive_peers(limit), message)
    }

    // Writes happen outside the pool lock. A failed peer is logged, closed
    // and dropped from the pool; the others still get the message. Returns
    // how many writes succeeded.
    fn send_to_all(&self, peers: Vec<Arc<Connection>>, message: &Message) -> usize {
        let mut delivered = 0;
        for peer in peers {
            match peer.send(message) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to send {} to {}: {e}",
                        message.name(),
                        peer.describe()
                    );
                    peer.close();
                    self.remove_peer(&peer);
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::{FailingWriter, SharedBuffer};

    fn ping() -> Message {
        Message::ping(PeerAddress::new("127.0.0.1", 1101), 0, 0, false)
    }

    #[test]
    fn test_add_and_remove() {
        let pool = ConnectionPool::new();
        let address = PeerAddress::new("10.0.0.2", 1101);
        let connection = Connection::from_writer(address.clone(), SharedBuffer::new());

        assert!(pool.add_peer(connection.clone()));
        assert!(pool.contains(&address));
        assert_eq!(pool.len(), 1);

        pool.remove_peer(&connection);
        assert!(pool.is_empty());

        // removing again is a no-op
        pool.remove_peer(&connection);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let pool = ConnectionPool::new();
        let address = PeerAddress::new("10.0.0.2", 1101);
        let first = Connection::from_writer(address.clone(), SharedBuffer::new());
        let second_buffer = SharedBuffer::new();
        let second = Connection::from_writer(address, second_buffer.clone());

        pool.add_peer(first.clone());
        pool.add_peer(second.clone());
        assert_eq!(pool.len(), 1);

        // the stale connection going away must not evict its replacement
        pool.remove_peer(&first);
        assert_eq!(pool.len(), 1);

        pool.broadcast(&ping());
        assert_eq!(second_buffer.lines().len(), 1);
    }

    #[test]
    fn test_get_alive_peers_respects_limit() {
        let pool = ConnectionPool::new();
        for port in 0..25u16 {
            let address = PeerAddress::new("10.0.0.3", 3000 + port);
            pool.add_peer(Connection::from_writer(address, SharedBuffer::new()));
        }

        assert_eq!(pool.get_alive_peers(20).len(), 20);
        assert_eq!(pool.get_alive_peers(50).len(), 25);
        assert!(pool.get_alive_peers(0).is_empty());
    }

    #[test]
    fn test_broadcast_survives_failed_peer() {
        let pool = ConnectionPool::new();
        let good = SharedBuffer::new();
        pool.add_peer(Connection::from_writer(
            PeerAddress::new("10.0.0.4", 1),
            good.clone(),
        ));
        pool.add_peer(Connection::from_writer(
            PeerAddress::new("10.0.0.4", 2),
            FailingWriter,
        ));

        let delivered = pool.broadcast(&ping());

        assert_eq!(delivered, 1);
        assert_eq!(good.lines().len(), 1);
        assert_eq!(pool.len(), 1);
        assert!(!pool.contains(&PeerAddress::new("10.0.0.4", 2)));
    }

    #[test]
    fn test_close_happens_once() {
        let connection =
            Connection::from_writer(PeerAddress::new("10.0.0.5", 1), SharedBuffer::new());
        assert!(connection.close());
        assert!(!connection.close());
        assert!(connection.send(&ping()).is_err());
    }

    #[test]
    fn test_anonymous_connection_is_not_pooled() {
        let pool = ConnectionPool::new();
        let connection =
            Connection::from_writer(PeerAddress::new("10.0.0.6", 1), SharedBuffer::new());
        *connection.address.write().unwrap() = None;
        assert!(!pool.add_peer(connection));
        assert!(pool.is_empty());
    }
}
