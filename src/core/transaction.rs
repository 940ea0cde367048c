// Value transfers between keys. A transaction is only ever built through
// `sign`, and a peer's copy is trusted once `verify` re-derives the same
// canonical bytes and the signature checks out under `sender`.

use crate::error::Result;
use crate::utils::{canonical_json, current_timestamp, ed25519_sign, ed25519_verify};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    sender: String,   // hex public key of the signer
    receiver: String, // address the amount is sent to
    amount: u64,
    timestamp: u64, // unix seconds at signing time
    signature: String,
}

// The signed portion of a transaction: every field except `signature`.
#[derive(Serialize)]
struct SigningPayload<'a> {
    sender: &'a str,
    receiver: &'a str,
    amount: u64,
    timestamp: u64,
}

impl Transaction {
    /// Builds and signs a transfer stamped with the current time.
    pub fn sign(
        private_key: &str,
        sender_public_key: &str,
        receiver: &str,
        amount: u64,
    ) -> Result<Transaction> {
        Self::sign_at(
            private_key,
            sender_public_key,
            receiver,
            amount,
            current_timestamp()?,
        )
    }

    pub fn sign_at(
        private_key: &str,
        sender_public_key: &str,
        receiver: &str,
        amount: u64,
        timestamp: u64,
    ) -> Result<Transaction> {
        let mut tx = Transaction {
            sender: sender_public_key.to_string(),
            receiver: receiver.to_string(),
            amount,
            timestamp,
            signature: String::new(),
        };
        let signature = ed25519_sign(private_key, &tx.signing_bytes()?)?;
        tx.signature = HEXLOWER.encode(&signature);
        Ok(tx)
    }

    /// Canonical bytes covered by the signature
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        canonical_json(&SigningPayload {
            sender: &self.sender,
            receiver: &self.receiver,
            amount: self.amount,
            timestamp: self.timestamp,
        })
    }

    /// `Ok(false)` for a signature that does not match; `Err(Decode)` when
    /// `sender` or `signature` is not usable hex key material.
    pub fn verify(&self) -> Result<bool> {
        ed25519_verify(&self.sender, &self.signature, &self.signing_bytes()?)
    }

    pub fn get_sender(&self) -> &str {
        self.sender.as_str()
    }

    pub fn get_receiver(&self) -> &str {
        self.receiver.as_str()
    }

    pub fn get_amount(&self) -> u64 {
        self.amount
    }

    pub fn get_timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn get_signature(&self) -> &str {
        self.signature.as_str()
    }
}
