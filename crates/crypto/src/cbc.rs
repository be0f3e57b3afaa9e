//! AES-128-CBC with the elided-IV convention
//!
//! The metering link never transmits an IV. Instead the sender prepends
//! one block of random plaintext and encrypts under a random IV it then
//! throws away; the receiver decrypts under an all-zero IV and discards
//! the first plaintext block. CBC chaining makes every later block come
//! out correctly, because decryption of block `i` depends only on
//! ciphertext block `i-1`. The chaining is written out by hand here so
//! both halves of that convention live in one place.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

/// AES block length; every ciphertext on the link is a multiple of this
pub const BLOCK_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Buffer length {0} is empty or not a multiple of {BLOCK_LEN}")]
    Misaligned(usize),
}

/// AES-128-CBC cipher keyed by the pre-shared encryption key
#[derive(Clone)]
pub struct CbcCipher {
    cipher: Aes128,
}

impl CbcCipher {
    /// Create a new cipher from the 16-byte pre-shared key
    pub fn new(key: &[u8; 16]) -> Self {
        Self {
            cipher: Aes128::new(key.into()),
        }
    }

    /// CBC-decrypt under an all-zero IV.
    ///
    /// The first plaintext block is garbage (it was chained against the
    /// sender's discarded random IV, not the zero IV used here) and the
    /// caller must discard it unconditionally.
    pub fn decrypt_zero_iv(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CipherError::Misaligned(ciphertext.len()));
        }

        let mut out = ciphertext.to_vec();
        let mut prev = [0u8; BLOCK_LEN];
        for (plain, cipher_block) in out
            .chunks_exact_mut(BLOCK_LEN)
            .zip(ciphertext.chunks_exact(BLOCK_LEN))
        {
            self.cipher
                .decrypt_block(GenericArray::from_mut_slice(plain));
            for (b, p) in plain.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
            prev.copy_from_slice(cipher_block);
        }

        Ok(out)
    }

    /// CBC-encrypt under a fresh random IV that is never transmitted.
    ///
    /// The caller must already have placed a fresh random block at the
    /// front of `plaintext`; the random IV is fully absorbed into that
    /// block's ciphertext, which acts as the externalized IV for the
    /// peer's zero-IV decryption.
    pub fn encrypt_random_iv(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if plaintext.is_empty() || plaintext.len() % BLOCK_LEN != 0 {
            return Err(CipherError::Misaligned(plaintext.len()));
        }

        let mut prev = [0u8; BLOCK_LEN];
        OsRng.fill_bytes(&mut prev);

        let mut out = plaintext.to_vec();
        for block in out.chunks_exact_mut(BLOCK_LEN) {
            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
            self.cipher
                .encrypt_block(GenericArray::from_mut_slice(block));
            prev.copy_from_slice(block);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sacrificial_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; BLOCK_LEN];
        OsRng.fill_bytes(&mut frame);
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn test_round_trip_discarding_first_block() {
        let cipher = CbcCipher::new(&[7u8; 16]);

        let payload = [0xABu8; BLOCK_LEN * 3];
        let frame = sacrificial_frame(&payload);

        let ciphertext = cipher.encrypt_random_iv(&frame).unwrap();
        assert_eq!(ciphertext.len(), frame.len());

        let plaintext = cipher.decrypt_zero_iv(&ciphertext).unwrap();
        // Block 0 decrypts to garbage; everything after survives.
        assert_eq!(&plaintext[BLOCK_LEN..], &payload[..]);
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let cipher = CbcCipher::new(&[7u8; 16]);

        let frame = sacrificial_frame(&[0u8; BLOCK_LEN]);
        let c1 = cipher.encrypt_random_iv(&frame).unwrap();
        let c2 = cipher.encrypt_random_iv(&frame).unwrap();

        // Same plaintext, different hidden IV, different ciphertext.
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_wrong_key_garbles_payload() {
        let cipher1 = CbcCipher::new(&[1u8; 16]);
        let cipher2 = CbcCipher::new(&[2u8; 16]);

        let payload = [0x55u8; BLOCK_LEN * 2];
        let ciphertext = cipher1
            .encrypt_random_iv(&sacrificial_frame(&payload))
            .unwrap();
        let plaintext = cipher2.decrypt_zero_iv(&ciphertext).unwrap();

        assert_ne!(&plaintext[BLOCK_LEN..], &payload[..]);
    }

    #[test]
    fn test_misaligned_input_rejected() {
        let cipher = CbcCipher::new(&[7u8; 16]);

        assert!(cipher.decrypt_zero_iv(&[]).is_err());
        assert!(cipher.decrypt_zero_iv(&[0u8; 10]).is_err());
        assert!(cipher.encrypt_random_iv(&[0u8; BLOCK_LEN + 1]).is_err());
    }
}
