use crate::core::Block;
use crate::error::{BlockchainError, Result};
use num_bigint::BigUint;

/// Hex digits in an encoded target
pub const TARGET_HEX_LEN: usize = 64;

pub struct ProofOfWork;

impl ProofOfWork {
    /// True iff the block hash, read as a big-endian integer, is strictly
    /// below the target recorded in the same block.
    pub fn validate(block: &Block) -> bool {
        let hash = match BigUint::parse_bytes(block.get_hash().as_bytes(), 16) {
            Some(hash) => hash,
            None => return false,
        };
        match parse_target(block.get_target()) {
            Ok(target) => hash < target,
            Err(_) => false,
        }
    }
}

pub fn parse_target(target: &str) -> Result<BigUint> {
    if target.is_empty() || target.len() > TARGET_HEX_LEN {
        return Err(BlockchainError::Decode(format!(
            "target must be 1 to {TARGET_HEX_LEN} hex digits, got {}",
            target.len()
        )));
    }
    BigUint::parse_bytes(target.as_bytes(), 16)
        .ok_or_else(|| BlockchainError::Decode(format!("target is not valid hex: {target}")))
}

/// Fixed-width lowercase hex; values above 2^256-1 saturate.
pub fn encode_target(target: &BigUint) -> String {
    let capped = if *target > max_target() {
        max_target()
    } else {
        target.clone()
    };
    format!("{:0>width$}", capped.to_str_radix(16), width = TARGET_HEX_LEN)
}

/// 2^256 - 1, the easiest possible target
pub fn max_target() -> BigUint {
    (BigUint::from(1u8) << 256u32) - BigUint::from(1u8)
}
