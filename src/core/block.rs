use crate::core::Transaction;
use crate::error::Result;
use crate::utils::{canonical_json, sha256_hex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    height: u64,
    transactions: Vec<Transaction>,
    previous_hash: Option<String>, // None only for genesis
    nonce: String,
    target: String, // 64 hex digits
    timestamp: u64,
    hash: String,
}

// Everything the block hash commits to.
#[derive(Serialize)]
struct HashPayload<'a> {
    height: u64,
    transactions: &'a [Transaction],
    previous_hash: Option<&'a str>,
    nonce: &'a str,
    target: &'a str,
    timestamp: u64,
}

impl Block {
    /// Builds a block and stamps its hash over the other six fields.
    pub fn new_block(
        height: u64,
        transactions: Vec<Transaction>,
        previous_hash: Option<String>,
        nonce: String,
        target: String,
        timestamp: u64,
    ) -> Result<Block> {
        let mut block = Block {
            height,
            transactions,
            previous_hash,
            nonce,
            target,
            timestamp,
            hash: String::new(),
        };
        block.hash = block.calculate_hash()?;
        Ok(block)
    }

    /// Hex SHA-256 of the canonical encoding of every field but `hash`
    pub fn calculate_hash(&self) -> Result<String> {
        let payload = HashPayload {
            height: self.height,
            transactions: &self.transactions,
            previous_hash: self.previous_hash.as_deref(),
            nonce: &self.nonce,
            target: &self.target,
            timestamp: self.timestamp,
        };
        Ok(sha256_hex(&canonical_json(&payload)?))
    }

    /// True when the stored hash matches the block's current contents
    pub fn has_valid_hash(&self) -> bool {
        match self.calculate_hash() {
            Ok(hash) => hash == self.hash,
            Err(_) => false,
        }
    }

    /// Same block with another nonce and a fresh hash. Used by the miner to
    /// re-roll a candidate without re-minting it.
    pub fn with_nonce(&self, nonce: String, timestamp: u64) -> Result<Block> {
        Block::new_block(
            self.height,
            self.transactions.clone(),
            self.previous_hash.clone(),
            nonce,
            self.target.clone(),
            timestamp,
        )
    }

    /// Random 64-bit nonce as lowercase hex
    pub fn new_nonce() -> String {
        format!("{:x}", rand::random::<u64>())
    }

    pub fn get_height(&self) -> u64 {
        self.height
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_previous_hash(&self) -> Option<&str> {
        self.previous_hash.as_deref()
    }

    pub fn get_nonce(&self) -> &str {
        self.nonce.as_str()
    }

    pub fn get_target(&self) -> &str {
        self.target.as_str()
    }

    pub fn get_timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }
}
