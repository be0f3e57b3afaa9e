//! Datagram classification and replay protection
//!
//! Every datagram from the untrusted link runs through the same gate
//! sequence: structural checks, tag verification, zero-IV decryption,
//! then the time-sync / data-batch split. The outcome is an explicit
//! [`Verdict`]; there are no error responses on the wire, because a
//! drop must be indistinguishable from a lost packet regardless of the
//! reason (an error oracle would let an attacker probe the keys).

use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

use wattrelay_crypto::{BLOCK_LEN, CbcCipher, HmacAuthenticator, TAG_LEN};

use crate::frame::{
    HEADER_LEN, MAX_BATCH_AGE_SECS, REPLAY_WINDOW_LEN, TIME_SYNC_MIN_INTERVAL, TOKEN_LEN, Token,
};
use crate::record::{READING_RECORD_LEN, ReadingRecord};

/// Why a datagram was dropped. Diagnostics only; nothing is sent back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Shorter than the authentication tag
    TooShort,
    /// Ciphertext not a multiple of the cipher block length
    BadAlignment,
    /// Ciphertext shorter than the two header blocks
    MissingHeader,
    /// Tag mismatch
    AuthFailed,
    /// Record area not a multiple of the record length
    RecordMisaligned,
    /// Every timestamp in the batch was already accepted before
    Replayed,
    /// Newest timestamp too far behind the wall clock
    Stale,
    /// Time-sync probe inside the minimum reply interval
    RateLimited,
}

impl DropReason {
    /// Stable label, used for metrics and log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::TooShort => "too_short",
            DropReason::BadAlignment => "bad_alignment",
            DropReason::MissingHeader => "missing_header",
            DropReason::AuthFailed => "auth_failed",
            DropReason::RecordMisaligned => "record_misaligned",
            DropReason::Replayed => "replayed",
            DropReason::Stale => "stale",
            DropReason::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one datagram
#[derive(Debug)]
pub enum Verdict {
    /// Silently dropped; no reply, no publication
    Drop(DropReason),
    /// Pure time-sync probe; reply with server time and no acks
    TimeSync {
        /// Token to echo back
        token: Token,
    },
    /// Accepted data batch; reply with acks, publish the fresh subset
    Batch {
        /// Token to echo back
        token: Token,
        /// All decoded records, in wire order
        readings: Vec<ReadingRecord>,
        /// All batch timestamps in wire order (the reply ack list)
        acks: Vec<u32>,
        /// Timestamps not seen before this batch; only records whose
        /// timestamp is in here get published
        fresh: BTreeSet<u32>,
    },
}

/// Replay window and time-sync rate limiter.
///
/// The only state carried between datagrams. Owned by the classifier,
/// which is owned by the relay loop; mutation is serialized by
/// construction (one datagram at a time), so no locking.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    seen: BTreeSet<u32>,
    last_sync_reply: Option<Instant>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamps in `batch` that have not been accepted before
    fn fresh_of(&self, batch: &BTreeSet<u32>) -> BTreeSet<u32> {
        batch.difference(&self.seen).copied().collect()
    }

    /// Merge a batch into the window, keeping only the newest
    /// `REPLAY_WINDOW_LEN` distinct timestamps
    fn merge(&mut self, batch: &BTreeSet<u32>) {
        self.seen.extend(batch.iter().copied());
        while self.seen.len() > REPLAY_WINDOW_LEN {
            self.seen.pop_first();
        }
    }

    fn allow_time_sync(&self, now: Instant) -> bool {
        match self.last_sync_reply {
            Some(last) => now.duration_since(last) >= TIME_SYNC_MIN_INTERVAL,
            None => true,
        }
    }

    fn note_time_sync_reply(&mut self, now: Instant) {
        self.last_sync_reply = Some(now);
    }

    /// Whether a timestamp is inside the replay window
    pub fn contains(&self, timestamp: u32) -> bool {
        self.seen.contains(&timestamp)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Per-datagram state machine over the authenticated, encrypted link
pub struct Classifier {
    auth: HmacAuthenticator,
    cipher: CbcCipher,
    guard: ReplayGuard,
}

impl Classifier {
    /// Create a classifier from the pre-shared keys
    pub fn new(enc_key: &[u8; 16], mac_key: [u8; 32]) -> Self {
        Self {
            auth: HmacAuthenticator::new(mac_key),
            cipher: CbcCipher::new(enc_key),
            guard: ReplayGuard::new(),
        }
    }

    /// The replay window / rate limiter state
    pub fn guard(&self) -> &ReplayGuard {
        &self.guard
    }

    /// Run one datagram through the gate sequence.
    ///
    /// `now` is a monotonic instant for the rate limiter; `wall_secs`
    /// is the receiver's wall clock for the staleness check. Both are
    /// injected so the state machine is testable without sleeping.
    pub fn classify(&mut self, datagram: &[u8], now: Instant, wall_secs: u64) -> Verdict {
        if datagram.len() < TAG_LEN {
            return Verdict::Drop(DropReason::TooShort);
        }

        let (ciphertext, tag) = datagram.split_at(datagram.len() - TAG_LEN);
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Verdict::Drop(DropReason::BadAlignment);
        }
        if ciphertext.len() < HEADER_LEN {
            return Verdict::Drop(DropReason::MissingHeader);
        }

        // Nothing below is trusted until the tag checks out.
        if self.auth.verify(ciphertext, tag).is_err() {
            return Verdict::Drop(DropReason::AuthFailed);
        }

        let Ok(plaintext) = self.cipher.decrypt_zero_iv(ciphertext) else {
            // Alignment was checked above.
            return Verdict::Drop(DropReason::BadAlignment);
        };

        // Block 0 is sacrificial; block 1 is the token.
        let mut token = [0u8; TOKEN_LEN];
        token.copy_from_slice(&plaintext[BLOCK_LEN..HEADER_LEN]);

        let body = &plaintext[HEADER_LEN..];
        if body.len() % READING_RECORD_LEN != 0 {
            return Verdict::Drop(DropReason::RecordMisaligned);
        }

        if body.is_empty() {
            if !self.guard.allow_time_sync(now) {
                return Verdict::Drop(DropReason::RateLimited);
            }
            self.guard.note_time_sync_reply(now);
            return Verdict::TimeSync { token };
        }

        let mut readings = Vec::with_capacity(body.len() / READING_RECORD_LEN);
        let mut acks = Vec::with_capacity(readings.capacity());
        let mut batch = BTreeSet::new();
        for chunk in body.chunks_exact(READING_RECORD_LEN) {
            let Ok(record) = ReadingRecord::decode(chunk) else {
                return Verdict::Drop(DropReason::RecordMisaligned);
            };
            acks.push(record.timestamp);
            batch.insert(record.timestamp);
            readings.push(record);
        }

        let fresh = self.guard.fresh_of(&batch);
        if fresh.is_empty() {
            return Verdict::Drop(DropReason::Replayed);
        }

        // A batch that carries records must be recent; pure time-sync
        // probes are exempt (handled above).
        if let Some(&newest) = batch.iter().next_back() {
            if u64::from(newest) + MAX_BATCH_AGE_SECS < wall_secs {
                return Verdict::Drop(DropReason::Stale);
            }
        }

        self.guard.merge(&batch);

        Verdict::Batch {
            token,
            readings,
            acks,
            fresh,
        }
    }
}
