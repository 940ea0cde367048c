// This is the in-memory ledger: the chain of blocks, the mempool and the
// current proof-of-work target. All three live behind one mutex so that
// appending a block, draining the mempool for a new candidate and accepting a
// gossiped transaction never interleave.

use crate::core::{Block, DifficultyAdjustment, ProofOfWork, Transaction, INITIAL_TARGET};
use crate::error::{BlockchainError, Result};
use crate::utils::current_timestamp;
use log::{debug, info};
use std::sync::{Mutex, MutexGuard};

struct ChainState {
    chain: Vec<Block>,                     // index == height
    pending_transactions: Vec<Transaction>, // the mempool
    target: String,                        // target for the next block we mint
    retargeted_for: Option<u64>,           // last boundary index already applied
}

pub struct Blockchain {
    inner: Mutex<ChainState>,
}

impl Blockchain {
    /// Creates a ledger holding only the genesis block.
    pub fn new() -> Result<Blockchain> {
        Self::with_target(INITIAL_TARGET)
    }

    /// Same as `new` but starting from a custom target; local test networks
    /// use an easy one so blocks are found instantly.
    pub fn with_target(target: &str) -> Result<Blockchain> {
        crate::core::proof_of_work::parse_target(target)?;
        let mut state = ChainState {
            chain: Vec::new(),
            pending_transactions: Vec::new(),
            target: target.to_string(),
            retargeted_for: None,
        };

        info!("Creating genesis block");
        let genesis = Self::mint_from(&mut state)?;
        state.chain.push(genesis);

        Ok(Blockchain {
            inner: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.inner
            .lock()
            .expect("Failed to acquire ledger lock - this should never happen")
    }

    // Snapshot the mempool into a candidate on top of the current tip and
    // clear it. The candidate is not proof-of-work checked here.
    fn mint_from(state: &mut ChainState) -> Result<Block> {
        let (height, previous_hash) = match state.chain.last() {
            Some(tip) => (tip.get_height() + 1, Some(tip.get_hash().to_string())),
            None => (0, None),
        };

        let block = Block::new_block(
            height,
            state.pending_transactions.clone(),
            previous_hash,
            Block::new_nonce(),
            state.target.clone(),
            current_timestamp()?,
        )?;

        state.pending_transactions.clear();
        Ok(block)
    }

    /// Builds the next candidate block from the mempool.
    ///
    /// The mempool is emptied even though the candidate may never satisfy
    /// proof-of-work; callers re-roll the nonce with `Block::with_nonce`
    /// rather than minting again.
    pub fn mint_next_block(&self) -> Result<Block> {
        let mut state = self.lock();
        Self::mint_from(&mut state)
    }

    // Checks a block against the current tip: hash integrity, height and
    // previous-hash linkage, proof-of-work against its own target and every
    // transaction signature.
    fn validate_against_tip(chain: &[Block], block: &Block) -> Result<()> {
        if !block.has_valid_hash() {
            return Err(BlockchainError::Validation(format!(
                "block {} hash does not match its contents",
                block.get_hash()
            )));
        }

        let tip = chain.last().ok_or_else(|| {
            BlockchainError::Validation("chain has no genesis block".to_string())
        })?;

        if block.get_previous_hash() != Some(tip.get_hash()) {
            return Err(BlockchainError::Validation(format!(
                "block {} does not extend tip {}",
                block.get_hash(),
                tip.get_hash()
            )));
        }

        if block.get_height() != tip.get_height() + 1 {
            return Err(BlockchainError::Validation(format!(
                "block height {} does not follow tip height {}",
                block.get_height(),
                tip.get_height()
            )));
        }

        if !ProofOfWork::validate(block) {
            return Err(BlockchainError::Validation(format!(
                "block {} does not satisfy its target {}",
                block.get_hash(),
                block.get_target()
            )));
        }

        for (i, tx) in block.get_transactions().iter().enumerate() {
            match tx.verify() {
                Ok(true) => {}
                Ok(false) => {
                    return Err(BlockchainError::Validation(format!(
                        "transaction {i} in block {} has a bad signature",
                        block.get_hash()
                    )))
                }
                Err(e) => {
                    return Err(BlockchainError::Validation(format!(
                        "transaction {i} in block {} is malformed: {e}",
                        block.get_hash()
                    )))
                }
            }
        }

        Ok(())
    }

    /// Validates a block against the current tip without appending it.
    pub fn validate_block(&self, block: &Block) -> Result<()> {
        let state = self.lock();
        Self::validate_against_tip(&state.chain, block)
    }

    /// Validates and appends under a single lock; a rejected block leaves the
    /// chain untouched.
    pub fn add_block(&self, block: Block) -> Result<()> {
        let mut state = self.lock();
        Self::validate_against_tip(&state.chain, &block)?;

        info!(
            "Appending block {} at height {}",
            block.get_hash(),
            block.get_height()
        );
        state.chain.push(block);
        Ok(())
    }

    /// Recomputes the target for the block at `block_index` and stores it.
    /// Off the retarget boundary the target is left as is, and a boundary
    /// that was already applied is not applied a second time.
    pub fn retarget(&self, block_index: u64) -> Result<String> {
        let mut state = self.lock();
        if state.retargeted_for == Some(block_index) {
            debug!("Target for block {block_index} already adjusted");
            return Ok(state.target.clone());
        }

        let new_target =
            DifficultyAdjustment::calculate_next_target(&state.chain, block_index, &state.target)?;
        let has_window =
            state.chain.len() as u64 >= DifficultyAdjustment::get_retarget_interval();
        if DifficultyAdjustment::is_retarget_height(block_index) && has_window {
            state.retargeted_for = Some(block_index);
        }
        state.target = new_target.clone();
        Ok(new_target)
    }

    /// Adds a transaction to the mempool unless an identical one is already
    /// pending. Returns whether it was added. Signatures are the caller's job.
    pub fn add_pending_transaction(&self, tx: Transaction) -> bool {
        let mut state = self.lock();
        if state.pending_transactions.contains(&tx) {
            debug!("Transaction from {} already pending", tx.get_sender());
            return false;
        }
        state.pending_transactions.push(tx);
        true
    }

    /// Puts back transactions from an abandoned candidate, skipping any that
    /// are pending again or already made it into a block at or above
    /// `from_height`.
    pub fn restore_pending_transactions(&self, transactions: Vec<Transaction>, from_height: u64) {
        let mut state = self.lock();
        let ChainState {
            chain,
            pending_transactions,
            ..
        } = &mut *state;

        let mined: Vec<&Transaction> = chain
            .iter()
            .skip(from_height as usize)
            .flat_map(|block| block.get_transactions())
            .collect();

        let mut restored = Vec::new();
        for tx in transactions {
            if !mined.contains(&&tx) && !pending_transactions.contains(&tx) && !restored.contains(&tx)
            {
                restored.push(tx);
            }
        }

        if !restored.is_empty() {
            info!("Restoring {} transactions to the mempool", restored.len());
        }
        restored.append(pending_transactions);
        *pending_transactions = restored;
    }

    pub fn get_best_height(&self) -> u64 {
        self.lock()
            .chain
            .last()
            .map(|block| block.get_height())
            .unwrap_or(0)
    }

    pub fn get_last_block(&self) -> Option<Block> {
        self.lock().chain.last().cloned()
    }

    /// Blocks strictly above `height`, in ascending order
    pub fn get_blocks_after(&self, height: u64) -> Vec<Block> {
        let state = self.lock();
        let start = (height as usize).saturating_add(1);
        state.chain.get(start..).map(|b| b.to_vec()).unwrap_or_default()
    }

    pub fn get_chain(&self) -> Vec<Block> {
        self.lock().chain.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().chain.is_empty()
    }

    pub fn get_target(&self) -> String {
        self.lock().target.clone()
    }

    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.lock().pending_transactions.clone()
    }

    #[cfg(test)]
    pub(crate) fn push_unchecked(&self, block: Block) {
        self.lock().chain.push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{ed25519_public_key, new_private_key};

    const EASY_TARGET: &str =
        "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

    fn signed_tx(amount: u64) -> Transaction {
        let private_key = new_private_key();
        let public_key = ed25519_public_key(&private_key).unwrap();
        Transaction::sign(&private_key, &public_key, "receiver", amount).unwrap()
    }

    #[test]
    fn test_new_chain_has_genesis() {
        let blockchain = Blockchain::new().unwrap();
        assert_eq!(blockchain.len(), 1);
        assert_eq!(blockchain.get_best_height(), 0);

        let genesis = blockchain.get_last_block().unwrap();
        assert_eq!(genesis.get_previous_hash(), None);
        assert!(genesis.has_valid_hash());
        assert_eq!(blockchain.get_target(), INITIAL_TARGET);
    }

    #[test]
    fn test_mint_drains_mempool() {
        let blockchain = Blockchain::with_target(EASY_TARGET).unwrap();
        assert!(blockchain.add_pending_transaction(signed_tx(1)));
        assert!(blockchain.add_pending_transaction(signed_tx(2)));

        let block = blockchain.mint_next_block().unwrap();
        assert_eq!(block.get_transactions().len(), 2);
        assert_eq!(block.get_height(), 1);
        assert_eq!(block.get_target(), EASY_TARGET);
        assert!(blockchain.get_pending_transactions().is_empty());
        // minting alone never appends
        assert_eq!(blockchain.len(), 1);
    }

    #[test]
    fn test_add_valid_block() {
        let blockchain = Blockchain::with_target(EASY_TARGET).unwrap();
        blockchain.add_pending_transaction(signed_tx(5));
        let block = blockchain.mint_next_block().unwrap();

        blockchain.add_block(block.clone()).unwrap();
        assert_eq!(blockchain.len(), 2);
        assert_eq!(blockchain.get_last_block().unwrap(), block);
    }

    #[test]
    fn test_reject_stale_hash() {
        let blockchain = Blockchain::with_target(EASY_TARGET).unwrap();
        let block = blockchain.mint_next_block().unwrap();

        let mut value = serde_json::to_value(&block).unwrap();
        value["nonce"] = serde_json::Value::String("beef".to_string());
        let tampered: Block = serde_json::from_value(value).unwrap();

        let result = blockchain.add_block(tampered);
        assert!(matches!(result, Err(BlockchainError::Validation(_))));
        assert_eq!(blockchain.len(), 1);
    }

    #[test]
    fn test_reject_wrong_previous_hash() {
        let blockchain = Blockchain::with_target(EASY_TARGET).unwrap();
        let block = Block::new_block(
            1,
            vec![],
            Some("00".repeat(32)),
            "1".to_string(),
            EASY_TARGET.to_string(),
            0,
        )
        .unwrap();

        assert!(blockchain.add_block(block).is_err());
        assert_eq!(blockchain.len(), 1);
    }

    #[test]
    fn test_reject_wrong_height() {
        let blockchain = Blockchain::with_target(EASY_TARGET).unwrap();
        let tip = blockchain.get_last_block().unwrap();
        let block = Block::new_block(
            5,
            vec![],
            Some(tip.get_hash().to_string()),
            "1".to_string(),
            EASY_TARGET.to_string(),
            0,
        )
        .unwrap();

        assert!(blockchain.add_block(block).is_err());
    }

    #[test]
    fn test_reject_insufficient_work() {
        let blockchain = Blockchain::with_target(&"0".repeat(64)).unwrap();
        let block = blockchain.mint_next_block().unwrap();

        let result = blockchain.add_block(block);
        assert!(matches!(result, Err(BlockchainError::Validation(_))));
        assert_eq!(blockchain.len(), 1);
    }

    #[test]
    fn test_reject_bad_transaction_signature() {
        let blockchain = Blockchain::with_target(EASY_TARGET).unwrap();
        let tx = signed_tx(7);
        let mut value = serde_json::to_value(&tx).unwrap();
        value["amount"] = serde_json::json!(8);
        let forged: Transaction = serde_json::from_value(value).unwrap();

        blockchain.add_pending_transaction(forged);
        let block = blockchain.mint_next_block().unwrap();

        assert!(blockchain.add_block(block).is_err());
        assert_eq!(blockchain.len(), 1);
    }

    #[test]
    fn test_pending_dedup() {
        let blockchain = Blockchain::new().unwrap();
        let tx = signed_tx(3);
        assert!(blockchain.add_pending_transaction(tx.clone()));
        assert!(!blockchain.add_pending_transaction(tx));
        assert_eq!(blockchain.get_pending_transactions().len(), 1);
    }

    #[test]
    fn test_blocks_after_height() {
        let blockchain = Blockchain::with_target(EASY_TARGET).unwrap();
        for _ in 0..3 {
            let block = blockchain.mint_next_block().unwrap();
            blockchain.add_block(block).unwrap();
        }

        let heights: Vec<u64> = blockchain
            .get_blocks_after(0)
            .iter()
            .map(|b| b.get_height())
            .collect();
        assert_eq!(heights, vec![1, 2, 3]);
        assert!(blockchain.get_blocks_after(3).is_empty());
        assert!(blockchain.get_blocks_after(u64::MAX).is_empty());
    }

    #[test]
    fn test_retarget_only_on_boundary() {
        let blockchain = Blockchain::new().unwrap();
        for height in 1..10u64 {
            let tip = blockchain.get_last_block().unwrap();
            // every block stamped with the same second: far too fast
            let block = Block::new_block(
                height,
                vec![],
                Some(tip.get_hash().to_string()),
                "0".to_string(),
                INITIAL_TARGET.to_string(),
                tip.get_timestamp(),
            )
            .unwrap();
            blockchain.push_unchecked(block);
        }

        for index in [1, 3, 7, 9, 11] {
            assert_eq!(blockchain.retarget(index).unwrap(), INITIAL_TARGET);
        }

        let retargeted = blockchain.retarget(10).unwrap();
        assert_ne!(retargeted, INITIAL_TARGET);
        assert_eq!(blockchain.get_target(), retargeted);
    }

    #[test]
    fn test_retarget_applies_each_boundary_once() {
        let blockchain = Blockchain::new().unwrap();
        for height in 1..10u64 {
            let tip = blockchain.get_last_block().unwrap();
            let block = Block::new_block(
                height,
                vec![],
                Some(tip.get_hash().to_string()),
                "0".to_string(),
                INITIAL_TARGET.to_string(),
                tip.get_timestamp(),
            )
            .unwrap();
            blockchain.push_unchecked(block);
        }

        let first = blockchain.retarget(10).unwrap();
        // a retried mining round asks for the same boundary again
        let second = blockchain.retarget(10).unwrap();

        assert_eq!(first, second);
        assert_eq!(blockchain.get_target(), first);
        let expected = crate::core::encode_target(&DifficultyAdjustment::scale_target(
            &crate::core::parse_target(INITIAL_TARGET).unwrap(),
            0,
        ));
        assert_eq!(first, expected);
    }

    #[test]
    fn test_restore_skips_mined_and_pending() {
        let blockchain = Blockchain::with_target(EASY_TARGET).unwrap();
        let mined = signed_tx(1);
        let lost = signed_tx(2);
        let still_pending = signed_tx(3);

        blockchain.add_pending_transaction(mined.clone());
        let block = blockchain.mint_next_block().unwrap();
        blockchain.add_block(block).unwrap();
        blockchain.add_pending_transaction(still_pending.clone());

        blockchain.restore_pending_transactions(
            vec![mined, lost.clone(), still_pending.clone()],
            1,
        );

        assert_eq!(blockchain.get_pending_transactions(), vec![lost, still_pending]);
    }
}
