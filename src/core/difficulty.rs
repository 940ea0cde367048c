use crate::core::proof_of_work::{encode_target, parse_target};
use crate::core::Block;
use crate::error::Result;
use log::info;
use num_bigint::BigUint;

// Difficulty adjustment constants
const TARGET_BLOCK_TIME: u64 = 10; // seconds
const RETARGET_INTERVAL: u64 = 10; // blocks
const EXPECTED_TIMESPAN: u64 = TARGET_BLOCK_TIME * RETARGET_INTERVAL;
// Ratio bounds expressed over EXPECTED_TIMESPAN: 0.25 and 4.0
const MIN_TIMESPAN: u64 = EXPECTED_TIMESPAN / 4;
const MAX_TIMESPAN: u64 = EXPECTED_TIMESPAN * 4;

/// Target the network starts from
pub const INITIAL_TARGET: &str = "0000ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

/// Proof-of-work target retargeting
pub struct DifficultyAdjustment;

impl DifficultyAdjustment {
    pub fn is_retarget_height(block_index: u64) -> bool {
        block_index % RETARGET_INTERVAL == 0
    }

    /// Target to use for the block at `block_index`.
    ///
    /// Off the retarget boundary, or without a full window of history, the
    /// current target is returned unchanged. On the boundary the target is
    /// scaled by the observed timespan of the last ten blocks over the
    /// expected one, with the ratio clamped to [0.25, 4.0].
    pub fn calculate_next_target(
        chain: &[Block],
        block_index: u64,
        current_target: &str,
    ) -> Result<String> {
        if !Self::is_retarget_height(block_index) || chain.len() < RETARGET_INTERVAL as usize {
            return Ok(current_target.to_string());
        }

        let window = &chain[chain.len() - RETARGET_INTERVAL as usize..];
        let actual_timespan = Self::calculate_time_span(window);
        let current = parse_target(current_target)?;
        let new_target = encode_target(&Self::scale_target(&current, actual_timespan));

        info!(
            "Retarget at block {block_index}: actual timespan {actual_timespan}s, expected {EXPECTED_TIMESPAN}s, new target {new_target}"
        );

        Ok(new_target)
    }

    // Timestamps are peer supplied; a window that runs backwards counts as zero.
    fn calculate_time_span(window: &[Block]) -> u64 {
        match (window.first(), window.last()) {
            (Some(first), Some(last)) => last.get_timestamp().saturating_sub(first.get_timestamp()),
            _ => 0,
        }
    }

    /// floor(target * clamp(actual / expected, 0.25, 4.0)), computed exactly
    pub fn scale_target(target: &BigUint, actual_timespan: u64) -> BigUint {
        let clamped = actual_timespan.clamp(MIN_TIMESPAN, MAX_TIMESPAN);
        target * BigUint::from(clamped) / BigUint::from(EXPECTED_TIMESPAN)
    }

    pub fn get_retarget_interval() -> u64 {
        RETARGET_INTERVAL
    }

    pub fn get_target_block_time() -> u64 {
        TARGET_BLOCK_TIME
    }
}
