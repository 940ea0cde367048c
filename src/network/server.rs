use crate::error::{BlockchainError, Result};
use crate::network::connection_pool::Connection;
use crate::network::message::{Message, PeerAddress};
use crate::network::protocol::{Dialer, Protocol};
use log::{debug, error, info, warn};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Largest record accepted from a peer, newline excluded
pub const MAX_RECORD_BYTES: u64 = 8 * 1024 * 1024;

/// Per-connection deadlines
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            connect: Duration::from_secs(5),
            read: Duration::from_secs(300),
            write: Duration::from_secs(5),
        }
    }
}

impl Timeouts {
    fn apply(&self, stream: &TcpStream) -> Result<()> {
        stream
            .set_read_timeout(Some(self.read))
            .map_err(|e| BlockchainError::Transport(format!("Failed to set read timeout: {e}")))?;
        stream
            .set_write_timeout(Some(self.write))
            .map_err(|e| BlockchainError::Transport(format!("Failed to set write timeout: {e}")))?;
        Ok(())
    }
}

/// Accepts inbound peers and runs one receive loop thread per connection
pub struct Server {
    listener: TcpListener,
    protocol: Arc<Protocol>,
    timeouts: Timeouts,
}

impl Server {
    pub fn bind(addr: &str, protocol: Arc<Protocol>, timeouts: Timeouts) -> Result<Server> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| BlockchainError::Transport(format!("Failed to bind to {addr}: {e}")))?;
        Ok(Server {
            listener,
            protocol,
            timeouts,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop; only returns if the listener itself fails to start.
    pub fn run(&self) -> Result<()> {
        info!("Server listening on {}", self.local_addr()?);

        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Error accepting connection: {e}");
                    continue;
                }
            };

            if let Err(e) = self.accept(stream) {
                warn!("Dropping inbound connection: {e}");
            }
        }
        Ok(())
    }

    fn accept(&self, stream: TcpStream) -> Result<()> {
        self.timeouts.apply(&stream)?;
        // The pool key is only known once the first message names its sender.
        let connection = Connection::from_stream(&stream, None)?;
        debug!("Accepted connection from {}", connection.describe());
        spawn_receive_loop(Arc::clone(&self.protocol), stream, connection);
        Ok(())
    }
}

/// Dials peers over TCP and serves each outbound connection like an inbound one
pub struct TcpDialer {
    timeouts: Timeouts,
}

impl TcpDialer {
    pub fn new(timeouts: Timeouts) -> TcpDialer {
        TcpDialer { timeouts }
    }
}

impl Dialer for TcpDialer {
    fn dial(&self, address: &PeerAddress, protocol: Arc<Protocol>) -> Result<Arc<Connection>> {
        let socket_addr = address.to_socket_addr()?;
        let stream = TcpStream::connect_timeout(&socket_addr, self.timeouts.connect)
            .map_err(|e| BlockchainError::Transport(format!("Failed to connect to {address}: {e}")))?;
        self.timeouts.apply(&stream)?;

        let connection = Connection::from_stream(&stream, Some(address.clone()))?;
        info!("Connected to peer {address}");
        spawn_receive_loop(protocol, stream, Arc::clone(&connection));
        Ok(connection)
    }
}

fn spawn_receive_loop(protocol: Arc<Protocol>, stream: TcpStream, connection: Arc<Connection>) {
    let name = format!("peer-{}", connection.describe());
    let spawned = {
        let connection = Arc::clone(&connection);
        thread::Builder::new()
            .name(name)
            .spawn(move || serve_connection(protocol, stream, connection))
    };
    if let Err(e) = spawned {
        error!("Failed to start receive loop for {}: {e}", connection.describe());
        connection.close();
    }
}

// Reads one newline-terminated record. `Ok(None)` is a clean end of stream;
// a record cut off by EOF or longer than MAX_RECORD_BYTES is a decode error.
fn read_record<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<Option<String>> {
    buf.clear();
    let read = reader
        .by_ref()
        .take(MAX_RECORD_BYTES + 1)
        .read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&b'\n') {
        if buf.len() as u64 > MAX_RECORD_BYTES {
            return Err(BlockchainError::Decode(format!(
                "Record exceeds {MAX_RECORD_BYTES} bytes"
            )));
        }
        return Err(BlockchainError::Decode(
            "Stream ended in the middle of a record".to_string(),
        ));
    }
    buf.pop();

    String::from_utf8(buf.clone())
        .map(Some)
        .map_err(|e| BlockchainError::Decode(format!("Record is not UTF-8: {e}")))
}

// Decodes a record, files the connection under the sender's address and
// dispatches the message.
fn process_record(protocol: &Arc<Protocol>, connection: &Arc<Connection>, record: &str) -> Result<()> {
    let message = Message::decode(record)?;
    let name = message.name();
    let sender = message.sender().clone();

    if connection.get_address().as_ref() != Some(&sender) {
        protocol.pool().remove_peer(connection);
        connection.set_address(sender.clone());
    }
    protocol.pool().add_peer(Arc::clone(connection));

    protocol.handle_message(message, connection).map_err(|e| {
        warn!("Error handling {name} from {sender}: {e}");
        e
    })
}

/// Receive loop for one connection.
///
/// Messages are handled strictly one after another. Decode, protocol and
/// transport errors end the loop; the connection is then closed and dropped
/// from the pool.
pub fn serve_connection(protocol: Arc<Protocol>, stream: TcpStream, connection: Arc<Connection>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        let record = match read_record(&mut reader, &mut buf) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("Peer {} closed the connection", connection.describe());
                break;
            }
            Err(e) => {
                if !connection.is_closed() {
                    warn!("Closing connection to {}: {e}", connection.describe());
                }
                break;
            }
        };

        if let Err(e) = process_record(&protocol, &connection, &record) {
            if e.tears_down_connection() {
                warn!("Closing connection to {}: {e}", connection.describe());
                break;
            }
        }

        if connection.is_closed() {
            break;
        }
    }

    connection.close();
    protocol.pool().remove_peer(&connection);
}

/// Sends a single message to `address` on a short-lived connection.
pub fn send_message(address: &PeerAddress, message: &Message, timeouts: Timeouts) -> Result<()> {
    let socket_addr = address.to_socket_addr()?;
    let mut stream = TcpStream::connect_timeout(&socket_addr, timeouts.connect)
        .map_err(|e| BlockchainError::Transport(format!("Failed to connect to {address}: {e}")))?;
    timeouts.apply(&stream)?;

    let mut line = message.encode()?;
    line.push('\n');
    stream.write_all(line.as_bytes())?;
    stream.flush()?;
    let _ = stream.shutdown(Shutdown::Write);

    info!("Sent {} to {address}", message.name());
    Ok(())
}
