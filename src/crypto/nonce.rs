//! Random nonce generation
//!
//! Nonces are drawn from an explicitly owned [`NonceSource`] handed to the
//! channel, codec or pay config, so tests can inject a deterministic source.

use rand::rngs::OsRng;
use rand::RngCore;

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Largest multiple of the alphabet size that fits in a byte.
const REJECTION_BOUND: u8 = (256 / ALPHANUMERIC.len() * ALPHANUMERIC.len()) as u8;

/// Source of random bytes for envelope and signature nonces
pub trait NonceSource: Send + Sync {
    /// Fill `dest` with random bytes.
    fn fill_bytes(&self, dest: &mut [u8]);

    /// Random `[A-Za-z0-9]` string of `len` characters.
    fn random_string(&self, len: usize) -> String {
        let mut out = String::with_capacity(len);
        let mut buf = [0u8; 32];

        while out.len() < len {
            self.fill_bytes(&mut buf);
            for &b in buf.iter().filter(|&&b| b < REJECTION_BOUND) {
                if out.len() == len {
                    break;
                }
                out.push(ALPHANUMERIC[b as usize % ALPHANUMERIC.len()] as char);
            }
        }

        out
    }
}

/// Operating-system CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsNonce;

impl NonceSource for OsNonce {
    fn fill_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU8, Ordering};

    use super::*;

    struct Counter(AtomicU8);

    impl NonceSource for Counter {
        fn fill_bytes(&self, dest: &mut [u8]) {
            for b in dest {
                *b = self.0.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[test]
    fn test_os_nonce_fills_buffer() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        OsNonce.fill_bytes(&mut a);
        OsNonce.fill_bytes(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_random_string_length_and_alphabet() {
        for len in [0, 1, 16, 32, 100] {
            let s = OsNonce.random_string(len);
            assert_eq!(s.len(), len);
            assert!(s.bytes().all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_random_string_skips_biased_bytes() {
        // Bytes 248..=255 are rejected, so they never map onto the alphabet.
        let source = Counter(AtomicU8::new(240));
        let s = source.random_string(10);
        assert_eq!(s, "23456789ab");
    }
}
