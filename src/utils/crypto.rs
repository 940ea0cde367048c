use ring::digest::{Context, SHA256};
use ring::signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519};

use crate::error::{BlockchainError, Result};
use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use std::time::{SystemTime, UNIX_EPOCH};

pub const ED25519_SEED_LEN: usize = 32;
pub const ED25519_PUBLIC_KEY_LEN: usize = 32;
pub const ED25519_SIGNATURE_LEN: usize = 64;

/// Current unix time in whole seconds
pub fn current_timestamp() -> Result<u64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BlockchainError::Crypto(format!("System time error: {e}")))?;
    Ok(duration.as_secs())
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

pub fn sha256_hex(data: &[u8]) -> String {
    HEXLOWER.encode(&sha256_digest(data))
}

/// Decodes hex of either case; failures are reported as decode errors.
pub fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    HEXLOWER_PERMISSIVE
        .decode(value.as_bytes())
        .map_err(|e| BlockchainError::Decode(format!("{field} is not valid hex: {e}")))
}

fn key_pair_from_seed(private_key_hex: &str) -> Result<Ed25519KeyPair> {
    let seed = decode_hex("private key", private_key_hex)?;
    if seed.len() != ED25519_SEED_LEN {
        return Err(BlockchainError::Decode(format!(
            "private key must be {ED25519_SEED_LEN} bytes, got {}",
            seed.len()
        )));
    }
    Ed25519KeyPair::from_seed_unchecked(&seed)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to load signing key: {e}")))
}

/// Hex public key matching a hex Ed25519 seed
pub fn ed25519_public_key(private_key_hex: &str) -> Result<String> {
    let key_pair = key_pair_from_seed(private_key_hex)?;
    Ok(HEXLOWER.encode(key_pair.public_key().as_ref()))
}

pub fn ed25519_sign(private_key_hex: &str, message: &[u8]) -> Result<Vec<u8>> {
    let key_pair = key_pair_from_seed(private_key_hex)?;
    Ok(key_pair.sign(message).as_ref().to_vec())
}

/// Checks the signature shape and key material before verifying.
///
/// Malformed input is a `Decode` error; a well-formed signature that does not
/// match is `Ok(false)`.
pub fn ed25519_verify(public_key_hex: &str, signature_hex: &str, message: &[u8]) -> Result<bool> {
    let public_key = decode_hex("public key", public_key_hex)?;
    if public_key.len() != ED25519_PUBLIC_KEY_LEN {
        return Err(BlockchainError::Decode(format!(
            "public key must be {ED25519_PUBLIC_KEY_LEN} bytes, got {}",
            public_key.len()
        )));
    }
    let signature = decode_hex("signature", signature_hex)?;
    if signature.len() != ED25519_SIGNATURE_LEN {
        return Err(BlockchainError::Decode(format!(
            "signature must be {ED25519_SIGNATURE_LEN} bytes, got {}",
            signature.len()
        )));
    }
    let peer_public_key = UnparsedPublicKey::new(&ED25519, public_key);
    Ok(peer_public_key.verify(message, &signature).is_ok())
}

/// Random hex seed, used by tests and tooling that need a throwaway key.
pub fn new_private_key() -> String {
    let seed: [u8; ED25519_SEED_LEN] = rand::random();
    HEXLOWER.encode(&seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sign_and_verify() {
        let private_key = new_private_key();
        let public_key = ed25519_public_key(&private_key).unwrap();
        let signature = HEXLOWER.encode(&ed25519_sign(&private_key, b"payload").unwrap());

        assert!(ed25519_verify(&public_key, &signature, b"payload").unwrap());
        assert!(!ed25519_verify(&public_key, &signature, b"other payload").unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_key_material() {
        let private_key = new_private_key();
        let public_key = ed25519_public_key(&private_key).unwrap();
        let signature = HEXLOWER.encode(&ed25519_sign(&private_key, b"payload").unwrap());

        let bad_hex = ed25519_verify("zz", &signature, b"payload");
        assert!(matches!(bad_hex, Err(BlockchainError::Decode(_))));

        let short_sig = ed25519_verify(&public_key, "abcd", b"payload");
        assert!(matches!(short_sig, Err(BlockchainError::Decode(_))));
    }

    #[test]
    fn test_uppercase_hex_is_accepted() {
        assert_eq!(decode_hex("field", "ABcd").unwrap(), vec![0xab, 0xcd]);
    }
}
