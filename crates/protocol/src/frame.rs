//! Wire framing for the metering link
//!
//! Request: `ciphertext(16k, k >= 2) || tag(32)`. Decrypted plaintext:
//! `sacrificial(16) || token(16) || record(32) * n`, n >= 0.
//!
//! Response plaintext before encryption: `sacrificial(16) || token(16)
//! || serverTimeSec:u32 || serverTimeMicros:u32 || ack:u32 * n`,
//! zero-padded to a 16-byte boundary.

use std::time::Duration;

use thiserror::Error;
use wattrelay_crypto::BLOCK_LEN;

/// Length of the opaque request token (one cipher block)
pub const TOKEN_LEN: usize = BLOCK_LEN;

/// Opaque value echoed verbatim from request to response
pub type Token = [u8; TOKEN_LEN];

/// Sacrificial block plus token
pub const HEADER_LEN: usize = 2 * BLOCK_LEN;

/// Largest datagram the link can carry (Ethernet MTU minus IPv4/UDP headers)
pub const MAX_DATAGRAM_LEN: usize = 1480;

/// Number of distinct accepted timestamps remembered by the replay guard
pub const REPLAY_WINDOW_LEN: usize = 60;

/// A batch whose newest timestamp is further behind the wall clock than
/// this is dropped as out of date
pub const MAX_BATCH_AGE_SECS: u64 = 40;

/// Minimum spacing between replies to pure time-sync probes
pub const TIME_SYNC_MIN_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Response plaintext too short: {0} bytes")]
    TooShort(usize),

    #[error("Response plaintext length {0} is not a multiple of {BLOCK_LEN}")]
    Misaligned(usize),
}

/// A decoded time-sync / acknowledgment reply, as seen by the meter
/// after it decrypts the response and discards the sacrificial block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Token copied from the request
    pub token: Token,
    /// Server wall clock, whole seconds
    pub server_time_secs: u32,
    /// Server wall clock, microsecond remainder
    pub server_time_micros: u32,
    /// Acknowledged reading timestamps (zero padding skipped)
    pub acks: Vec<u32>,
}

impl ResponseFrame {
    /// Parse a decrypted response, sacrificial block still in place.
    pub fn parse(plaintext: &[u8]) -> Result<Self, FrameError> {
        if plaintext.len() % BLOCK_LEN != 0 {
            return Err(FrameError::Misaligned(plaintext.len()));
        }
        // Header blocks plus the 8-byte server time.
        if plaintext.len() < HEADER_LEN + BLOCK_LEN {
            return Err(FrameError::TooShort(plaintext.len()));
        }

        let mut token = [0u8; TOKEN_LEN];
        token.copy_from_slice(&plaintext[BLOCK_LEN..HEADER_LEN]);

        let body = &plaintext[HEADER_LEN..];
        let server_time_secs = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let server_time_micros = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);

        // The tail is u32 acks up to the padding; a zero word is
        // padding (or an invalid timestamp) and is skipped, as the
        // meter firmware does.
        let acks = body[8..]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .filter(|&ack| ack != 0)
            .collect();

        Ok(Self {
            token,
            server_time_secs,
            server_time_micros,
            acks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let mut plaintext = vec![0x5Au8; BLOCK_LEN];
        plaintext.extend_from_slice(&[0xAA; TOKEN_LEN]);
        plaintext.extend_from_slice(&1_700_000_123u32.to_be_bytes());
        plaintext.extend_from_slice(&456_789u32.to_be_bytes());
        plaintext.extend_from_slice(&1_700_000_000u32.to_be_bytes());
        plaintext.extend_from_slice(&1_700_000_010u32.to_be_bytes());
        // Pad out to a block boundary.
        plaintext.resize(plaintext.len().div_ceil(BLOCK_LEN) * BLOCK_LEN, 0);
        assert_eq!(plaintext.len() % BLOCK_LEN, 0);

        let frame = ResponseFrame::parse(&plaintext).unwrap();
        assert_eq!(frame.token, [0xAA; TOKEN_LEN]);
        assert_eq!(frame.server_time_secs, 1_700_000_123);
        assert_eq!(frame.server_time_micros, 456_789);
        assert_eq!(frame.acks, vec![1_700_000_000, 1_700_000_010]);
    }

    #[test]
    fn test_parse_time_sync_only_response() {
        let mut plaintext = vec![0u8; HEADER_LEN];
        plaintext.extend_from_slice(&100u32.to_be_bytes());
        plaintext.extend_from_slice(&0u32.to_be_bytes());
        plaintext.resize(HEADER_LEN + BLOCK_LEN, 0);

        let frame = ResponseFrame::parse(&plaintext).unwrap();
        assert!(frame.acks.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            ResponseFrame::parse(&[0u8; HEADER_LEN]),
            Err(FrameError::TooShort(_))
        ));
        assert!(matches!(
            ResponseFrame::parse(&[0u8; HEADER_LEN + 7]),
            Err(FrameError::Misaligned(_))
        ));
    }
}
