//! Public result identifiers.
//!
//! A result identifier (`rid`) is the only identifier that appears in
//! tracking URLs. It is a 7-character token drawn from a 62-symbol
//! alphabet with a cryptographically secure RNG, so it cannot be guessed
//! from, or used to enumerate, other results.

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::error::RidError;

/// Alphabet the identifier is drawn from.
pub const RID_ALPHABET: &[u8; 62] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Number of symbols in an identifier.
pub const RID_LENGTH: usize = 7;

/// Largest multiple of 62 that fits in a byte. Bytes at or above it are
/// rejected so `byte % 62` stays uniform.
const REJECTION_BOUND: u8 = 248;

/// Generate an identifier from the operating system's secure RNG.
pub fn generate_rid() -> Result<String, RidError> {
    generate_rid_with(&mut OsRng)
}

/// Generate an identifier from the given secure RNG.
///
/// Each symbol is an independent uniform draw. Fails only if the RNG
/// itself reports a failure.
pub fn generate_rid_with<R>(rng: &mut R) -> Result<String, RidError>
where
    R: RngCore + CryptoRng,
{
    let mut rid = String::with_capacity(RID_LENGTH);
    let mut buf = [0u8; 16];
    while rid.len() < RID_LENGTH {
        rng.try_fill_bytes(&mut buf)?;
        for &byte in &buf {
            if byte >= REJECTION_BOUND {
                continue;
            }
            rid.push(char::from(RID_ALPHABET[usize::from(byte % 62)]));
            if rid.len() == RID_LENGTH {
                break;
            }
        }
    }
    Ok(rid)
}

/// Whether `s` has the shape of a result identifier.
pub fn is_valid_rid(s: &str) -> bool {
    s.len() == RID_LENGTH && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn generated_ids_have_expected_shape() {
        let rid = generate_rid().unwrap();
        assert_eq!(rid.len(), RID_LENGTH);
        assert!(is_valid_rid(&rid));
    }

    #[test]
    fn ten_thousand_ids_are_unique_and_in_alphabet() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let rid = generate_rid().unwrap();
            assert_eq!(rid.len(), RID_LENGTH);
            assert!(rid.bytes().all(|b| RID_ALPHABET.contains(&b)), "{rid}");
            assert!(seen.insert(rid.clone()), "duplicate id {rid}");
        }
    }

    /// RNG that yields only bytes above the rejection bound for the first
    /// fill, then a fixed in-range byte.
    struct Skewed {
        calls: usize,
    }

    impl RngCore for Skewed {
        fn next_u32(&mut self) -> u32 {
            unimplemented!()
        }
        fn next_u64(&mut self) -> u64 {
            unimplemented!()
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            self.try_fill_bytes(dest).unwrap()
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            let byte = if self.calls == 0 { 250 } else { 63 };
            self.calls += 1;
            dest.fill(byte);
            Ok(())
        }
    }

    impl CryptoRng for Skewed {}

    #[test]
    fn bytes_above_bound_are_rejected() {
        let mut rng = Skewed { calls: 0 };
        let rid = generate_rid_with(&mut rng).unwrap();
        // 63 % 62 == 1 -> 'b'
        assert_eq!(rid, "bbbbbbb");
        assert_eq!(rng.calls, 2);
    }

    struct Broken;

    impl RngCore for Broken {
        fn next_u32(&mut self) -> u32 {
            unimplemented!()
        }
        fn next_u64(&mut self) -> u64 {
            unimplemented!()
        }
        fn fill_bytes(&mut self, _dest: &mut [u8]) {
            unimplemented!()
        }
        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::other("entropy exhausted")))
        }
    }

    impl CryptoRng for Broken {}

    #[test]
    fn rng_failure_is_reported() {
        let err = generate_rid_with(&mut Broken).unwrap_err();
        assert!(err.to_string().contains("secure random source failed"));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(is_valid_rid("aZ09bcd"));
        assert!(!is_valid_rid("short"));
        assert!(!is_valid_rid("toolong1"));
        assert!(!is_valid_rid("abc-def"));
    }
}
