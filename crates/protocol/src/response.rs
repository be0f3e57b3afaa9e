//! Echo / time-sync reply construction

use rand::RngCore;
use rand::rngs::OsRng;
use wattrelay_crypto::{BLOCK_LEN, CbcCipher, HmacAuthenticator};

use crate::frame::Token;

/// Server wall clock split into the wire's seconds + microseconds form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTime {
    pub secs: u32,
    pub micros: u32,
}

/// Builds the encrypted reply to an accepted request.
///
/// The reply plaintext is a fresh random sacrificial block, the echoed
/// token, the server time, and the acknowledged timestamps, zero-padded
/// to a block boundary, then CBC-encrypted under a discarded random IV
/// and tagged.
pub struct ResponseBuilder {
    cipher: CbcCipher,
    auth: HmacAuthenticator,
}

impl ResponseBuilder {
    /// Create a builder from the pre-shared keys
    pub fn new(enc_key: &[u8; 16], mac_key: [u8; 32]) -> Self {
        Self {
            cipher: CbcCipher::new(enc_key),
            auth: HmacAuthenticator::new(mac_key),
        }
    }

    /// Assemble, encrypt, and tag one reply datagram
    pub fn build(&self, token: &Token, time: ServerTime, acks: &[u32]) -> Vec<u8> {
        let mut plaintext = vec![0u8; BLOCK_LEN];
        OsRng.fill_bytes(&mut plaintext[..BLOCK_LEN]);
        plaintext.extend_from_slice(token);
        plaintext.extend_from_slice(&time.secs.to_be_bytes());
        plaintext.extend_from_slice(&time.micros.to_be_bytes());
        for ack in acks {
            plaintext.extend_from_slice(&ack.to_be_bytes());
        }
        plaintext.resize(plaintext.len().div_ceil(BLOCK_LEN) * BLOCK_LEN, 0);

        let mut datagram = self
            .cipher
            .encrypt_random_iv(&plaintext)
            .expect("reply plaintext is padded to a block boundary");
        let tag = self.auth.compute(&datagram);
        datagram.extend_from_slice(&tag);
        datagram
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ResponseFrame;
    use wattrelay_crypto::TAG_LEN;

    const ENC_KEY: [u8; 16] = [0x11; 16];
    const MAC_KEY: [u8; 32] = [0x22; 32];

    fn open(datagram: &[u8]) -> ResponseFrame {
        let auth = HmacAuthenticator::new(MAC_KEY);
        let cipher = CbcCipher::new(&ENC_KEY);

        let (ciphertext, tag) = datagram.split_at(datagram.len() - TAG_LEN);
        auth.verify(ciphertext, tag).expect("tag must verify");
        let plaintext = cipher.decrypt_zero_iv(ciphertext).unwrap();
        ResponseFrame::parse(&plaintext).unwrap()
    }

    #[test]
    fn test_reply_round_trip() {
        let builder = ResponseBuilder::new(&ENC_KEY, MAC_KEY);
        let token = [0xAA; 16];
        let time = ServerTime {
            secs: 1_700_000_123,
            micros: 456_789,
        };

        let datagram = builder.build(&token, time, &[1_700_000_000, 1_700_000_010]);
        assert_eq!((datagram.len() - TAG_LEN) % BLOCK_LEN, 0);

        let frame = open(&datagram);
        assert_eq!(frame.token, token);
        assert_eq!(frame.server_time_secs, time.secs);
        assert_eq!(frame.server_time_micros, time.micros);
        assert_eq!(frame.acks, vec![1_700_000_000, 1_700_000_010]);
    }

    #[test]
    fn test_time_sync_reply_has_no_acks() {
        let builder = ResponseBuilder::new(&ENC_KEY, MAC_KEY);
        let datagram = builder.build(
            &[0xBB; 16],
            ServerTime {
                secs: 100,
                micros: 0,
            },
            &[],
        );

        // Sacrificial + token + time, padded: exactly three blocks.
        assert_eq!(datagram.len(), 3 * BLOCK_LEN + TAG_LEN);
        assert!(open(&datagram).acks.is_empty());
    }

    #[test]
    fn test_replies_never_repeat_ciphertext() {
        let builder = ResponseBuilder::new(&ENC_KEY, MAC_KEY);
        let time = ServerTime {
            secs: 100,
            micros: 0,
        };

        let a = builder.build(&[0xCC; 16], time, &[]);
        let b = builder.build(&[0xCC; 16], time, &[]);
        assert_ne!(a, b);
    }
}
