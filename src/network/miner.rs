// The miner runs on its own thread and only touches the ledger through the
// public Blockchain methods, so a block it finds goes through exactly the same
// validate-then-append path as one received from a peer.

use crate::core::{Block, ProofOfWork};
use crate::error::{BlockchainError, Result};
use crate::network::protocol::Protocol;
use crate::utils::current_timestamp;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Nonces tried between checks for cancellation and a moved tip
const ATTEMPTS_PER_ROUND: u64 = 10_000;

/// Pause after an unexpected error so a broken ledger does not spin the CPU
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Handle to a running miner thread
pub struct MinerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MinerHandle {
    /// Asks the miner to stop and waits for the thread to finish.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Miner thread panicked");
            }
        }
    }
}

/// Starts mining on top of the protocol's ledger.
pub fn spawn(protocol: Arc<Protocol>) -> Result<MinerHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let thread = {
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name("miner".to_string())
            .spawn(move || run(protocol, stop))
            .map_err(|e| BlockchainError::Io(format!("Failed to start miner thread: {e}")))?
    };
    info!("Mining is on");
    Ok(MinerHandle {
        stop,
        thread: Some(thread),
    })
}

fn run(protocol: Arc<Protocol>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match mine_block(&protocol, &stop) {
            Ok(Some(block)) => info!(
                "Mined block {} at height {}",
                block.get_hash(),
                block.get_height()
            ),
            Ok(None) => thread::yield_now(),
            Err(e) => {
                error!("Mining round failed: {e}");
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    info!("Miner stopped");
}

/// One mining round.
///
/// Mints a candidate on the current tip and re-rolls its nonce until it meets
/// its target. Returns `Ok(None)` when the round is abandoned, either because
/// `stop` was set or because another block landed first; the candidate's
/// transactions go back to the mempool in that case.
pub fn mine_block(protocol: &Protocol, stop: &AtomicBool) -> Result<Option<Block>> {
    let blockchain = protocol.blockchain();
    let tip_height = blockchain.get_best_height();
    let height = tip_height + 1;

    blockchain.retarget(height)?;
    let mut candidate = blockchain.mint_next_block()?;

    let mut attempts: u64 = 0;
    while !ProofOfWork::validate(&candidate) {
        attempts += 1;
        if attempts % ATTEMPTS_PER_ROUND == 0 {
            if stop.load(Ordering::SeqCst) || blockchain.get_best_height() != tip_height {
                debug!("Abandoning candidate at height {height} after {attempts} attempts");
                blockchain
                    .restore_pending_transactions(candidate.get_transactions().to_vec(), height);
                return Ok(None);
            }
            thread::yield_now();
        }
        candidate = candidate.with_nonce(Block::new_nonce(), current_timestamp()?)?;
    }

    match blockchain.add_block(candidate.clone()) {
        Ok(()) => {
            protocol.announce_block(candidate.clone());
            Ok(Some(candidate))
        }
        Err(BlockchainError::Validation(reason)) => {
            warn!("Mined block at height {height} was rejected: {reason}");
            blockchain.restore_pending_transactions(candidate.get_transactions().to_vec(), height);
            Ok(None)
        }
        Err(e) => {
            blockchain.restore_pending_transactions(candidate.get_transactions().to_vec(), height);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::connection_pool::Connection;
    use crate::network::message::{Payload, PeerAddress};
    use crate::testnet::{create_test_protocol, signed_transaction, SharedBuffer};

    #[test]
    fn test_mined_block_is_appended_and_announced() {
        let (protocol, _dialer) = create_test_protocol();
        let buffer = SharedBuffer::new();
        protocol.pool().add_peer(Connection::from_writer(
            PeerAddress::new("10.4.0.1", 1101),
            buffer.clone(),
        ));
        let tx = signed_transaction(3);
        protocol.blockchain().add_pending_transaction(tx.clone());

        let block = mine_block(&protocol, &AtomicBool::new(false))
            .unwrap()
            .unwrap();

        assert_eq!(block.get_height(), 1);
        assert_eq!(block.get_transactions(), &[tx]);
        assert_eq!(protocol.blockchain().len(), 2);
        assert!(protocol.blockchain().get_pending_transactions().is_empty());

        let announced = buffer.messages();
        assert_eq!(announced.len(), 1);
        assert_eq!(announced[0].payload, Payload::Block(block));
    }

    #[test]
    fn test_miner_thread_extends_chain_until_stopped() {
        let (protocol, _dialer) = create_test_protocol();
        let handle = spawn(Arc::clone(&protocol)).unwrap();

        let mut waited = 0;
        while protocol.blockchain().get_best_height() < 2 && waited < 500 {
            thread::sleep(Duration::from_millis(10));
            waited += 1;
        }
        handle.stop();

        let height = protocol.blockchain().get_best_height();
        assert!(height >= 2);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(protocol.blockchain().get_best_height(), height);
    }
}
