//! Core ledger functionality
//!
//! Transactions and their signatures, blocks, proof-of-work, target
//! retargeting and the in-memory chain with its mempool.

pub mod block;
pub mod blockchain;
pub mod difficulty;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::Blockchain;
pub use difficulty::{DifficultyAdjustment, INITIAL_TARGET};
pub use proof_of_work::{encode_target, max_target, parse_target, ProofOfWork};
pub use transaction::Transaction;
