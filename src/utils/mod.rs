//! Utility functions and helpers
//!
//! Hashing, signing primitives, canonical encoding and time helpers used
//! throughout the node.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    current_timestamp, decode_hex, ed25519_public_key, ed25519_sign, ed25519_verify,
    new_private_key, sha256_digest, sha256_hex,
};

pub use serialization::canonical_json;
