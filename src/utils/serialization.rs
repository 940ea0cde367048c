// Canonical JSON used for hashing and signing.
// serde_json's default `Map` is ordered by key, so going through `Value`
// gives lexicographically sorted keys at every depth, and `to_vec` emits no
// whitespace.
use crate::error::{BlockchainError, Result};
use serde::Serialize;

/// Key-sorted, whitespace-free JSON bytes of `data`
pub fn canonical_json<T: Serialize>(data: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(data)
        .map_err(|e| BlockchainError::Serialization(format!("Canonical encoding failed: {e}")))?;
    serde_json::to_vec(&value)
        .map_err(|e| BlockchainError::Serialization(format!("Canonical encoding failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Unordered {
        zeta: u64,
        alpha: String,
        nested: Nested,
    }

    #[derive(Serialize)]
    struct Nested {
        y: Option<u64>,
        b: bool,
    }

    #[test]
    fn test_keys_are_sorted_without_whitespace() {
        let data = Unordered {
            zeta: 7,
            alpha: "a b".to_string(),
            nested: Nested { y: None, b: true },
        };

        let bytes = canonical_json(&data).expect("Encoding should work");
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"alpha":"a b","nested":{"b":true,"y":null},"zeta":7}"#
        );
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let data = Nested { y: Some(3), b: false };
        assert_eq!(canonical_json(&data).unwrap(), canonical_json(&data).unwrap());
    }
}
