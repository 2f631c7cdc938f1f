//! Fingerprint derivation for constrained value combinations.
//!
//! A fingerprint is the lowercase hex SHA-256 of the canonical encoding of an
//! ordered list of (property, value) pairs:
//!
//! ```text
//! [version (1 byte)][pair count (u32 LE)]
//!   for each pair: [name len (u32 LE)][name UTF-8][canonical value]
//! ```
//!
//! Fingerprints are sentinel keys, so this layout is a storage format.

use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::value::{put_len_prefixed, Value};

/// Version byte leading every encoding.
pub const FINGERPRINT_VERSION: u8 = 1;

/// Derive a fingerprint by reading `properties` in order from `provider`.
///
/// Returns the fingerprint and the (property, value) pairs it was computed
/// from, in declared order.
pub fn derive<F>(properties: &[String], mut provider: F) -> Result<(String, Vec<(String, Value)>), Error>
where
    F: FnMut(&str) -> Result<Value, Error>,
{
    let mut values = Vec::with_capacity(properties.len());
    for property in properties {
        let value = provider(property)?;
        values.push((property.clone(), value));
    }
    let fingerprint = fingerprint_of(&values);
    Ok((fingerprint, values))
}

/// Compute the fingerprint of already collected pairs.
pub fn fingerprint_of(values: &[(String, Value)]) -> String {
    hex::encode(Sha256::digest(canonical_bytes(values)))
}

/// The canonical byte form hashed by [`fingerprint_of`].
pub fn canonical_bytes(values: &[(String, Value)]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + values.len() * 16);
    buf.push(FINGERPRINT_VERSION);
    buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for (name, value) in values {
        put_len_prefixed(&mut buf, name.as_bytes());
        value.encode_canonical(&mut buf);
    }
    buf
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn props(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_known_answer() {
        let values = vec![
            ("email".to_string(), Value::from("a@example.com")),
            ("age".to_string(), Value::Int32(30)),
        ];
        assert_eq!(
            fingerprint_of(&values),
            "93e5bcb23fc612da1e6a4dab61db45afa33d24cab3847d26cf23d83b7aed6312"
        );
        assert_eq!(
            fingerprint_of(&[]),
            "957b88b12730e646e0f33d3618b77dfa579e8231e3c59c7104be7165611c8027"
        );
    }

    #[test]
    fn test_derive_reads_in_declared_order() {
        let source: HashMap<&str, Value> =
            [("b", Value::from("2")), ("a", Value::from("1"))].into_iter().collect();

        let mut seen = Vec::new();
        let (_, values) = derive(&props(&["a", "b"]), |name| {
            seen.push(name.to_string());
            Ok(source[name].clone())
        })
        .unwrap();

        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(values[0], ("a".to_string(), Value::from("1")));
        assert_eq!(values[1], ("b".to_string(), Value::from("2")));
    }

    #[test]
    fn test_deterministic_across_calls() {
        let provider = |name: &str| Ok(Value::from(format!("value-of-{name}")));
        let (first, _) = derive(&props(&["org", "email"]), provider).unwrap();
        for _ in 0..10 {
            let (again, _) = derive(&props(&["org", "email"]), provider).unwrap();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_order_and_names_matter() {
        let ab = fingerprint_of(&[
            ("a".to_string(), Value::from("x")),
            ("b".to_string(), Value::from("y")),
        ]);
        let ba = fingerprint_of(&[
            ("b".to_string(), Value::from("y")),
            ("a".to_string(), Value::from("x")),
        ]);
        let renamed = fingerprint_of(&[
            ("a".to_string(), Value::from("x")),
            ("c".to_string(), Value::from("y")),
        ]);
        assert_ne!(ab, ba);
        assert_ne!(ab, renamed);
    }

    #[test]
    fn test_no_concatenation_ambiguity() {
        let split_one = fingerprint_of(&[
            ("a".to_string(), Value::from("xy")),
            ("b".to_string(), Value::from("")),
        ]);
        let split_two = fingerprint_of(&[
            ("a".to_string(), Value::from("x")),
            ("b".to_string(), Value::from("y")),
        ]);
        assert_ne!(split_one, split_two);
    }

    #[test]
    fn test_provider_error_propagates() {
        let result = derive(&props(&["missing"]), |name| {
            Err(Error::UnknownProperty {
                entity: "User".to_string(),
                property: name.to_string(),
            })
        });
        assert!(matches!(result, Err(Error::UnknownProperty { .. })));
    }
}
