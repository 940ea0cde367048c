// Peers drop a connection that stays silent past their read deadline, so
// every pooled connection gets a ping at an interval below that deadline.
// The ping's reply (a `peers` message) keeps the other direction busy too.

use crate::error::{BlockchainError, Result};
use crate::network::protocol::Protocol;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Longest the thread sleeps before looking at the stop flag
const STOP_POLL: Duration = Duration::from_millis(50);

/// Handle to a running keepalive thread
pub struct KeepaliveHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl KeepaliveHandle {
    /// Asks the thread to stop and waits for it.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Keepalive thread panicked");
            }
        }
    }
}

/// Pings every pooled peer once per `interval` until stopped.
pub fn spawn(protocol: Arc<Protocol>, interval: Duration) -> Result<KeepaliveHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let thread = {
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name("keepalive".to_string())
            .spawn(move || run(protocol, interval, stop))
            .map_err(|e| BlockchainError::Io(format!("Failed to start keepalive thread: {e}")))?
    };
    info!("Pinging peers every {}s", interval.as_secs_f32());
    Ok(KeepaliveHandle {
        stop,
        thread: Some(thread),
    })
}

fn run(protocol: Arc<Protocol>, interval: Duration, stop: Arc<AtomicBool>) {
    let mut next = Instant::now() + interval;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now < next {
            thread::sleep((next - now).min(STOP_POLL));
            continue;
        }
        let sent = ping_peers(&protocol);
        debug!("Keepalive ping sent to {sent} peers");
        next = Instant::now() + interval;
    }
}

/// Sends our current ping to every pooled peer; returns how many got it.
pub fn ping_peers(protocol: &Protocol) -> usize {
    protocol.pool().broadcast(&protocol.ping_message())
}
