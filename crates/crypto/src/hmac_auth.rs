//! HMAC-SHA256 authentication

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Length of the authentication tag appended to every datagram
pub const TAG_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum HmacError {
    #[error("Tag verification failed")]
    VerificationFailed,
}

/// HMAC-SHA256 authenticator over ciphertext, keyed by the pre-shared
/// MAC key. Verification must happen before any decryption is trusted.
#[derive(Clone)]
pub struct HmacAuthenticator {
    secret: [u8; 32],
}

impl HmacAuthenticator {
    /// Create a new authenticator with the given pre-shared key
    pub fn new(secret: [u8; 32]) -> Self {
        Self { secret }
    }

    /// Compute the tag for the given ciphertext
    pub fn compute(&self, data: &[u8]) -> [u8; TAG_LEN] {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    /// Verify a tag in constant time.
    ///
    /// A tag of the wrong length is a plain rejection, never a panic:
    /// malformed input from the network must be indistinguishable from
    /// a forged tag.
    pub fn verify(&self, data: &[u8], expected: &[u8]) -> Result<(), HmacError> {
        if expected.len() != TAG_LEN {
            return Err(HmacError::VerificationFailed);
        }
        let computed = self.compute(data);
        if constant_time_compare(&computed, expected) {
            Ok(())
        } else {
            Err(HmacError::VerificationFailed)
        }
    }
}

/// Constant-time comparison to prevent timing attacks
#[inline]
fn constant_time_compare(a: &[u8; TAG_LEN], b: &[u8]) -> bool {
    if b.len() != TAG_LEN {
        return false;
    }
    let mut result = 0u8;
    for i in 0..TAG_LEN {
        result |= a[i] ^ b[i];
    }
    result == 0
}
