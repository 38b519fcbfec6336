//! Lottery wire format — constants and framing types shared by the client
//! and anything that speaks to the aggregator.
//!
//! Every connection carries exactly one exchange. The first byte the client
//! writes is a control byte selecting the exchange, followed by the agency
//! id. All integers are big-endian. Changing anything here breaks existing
//! aggregators.

use static_assertions::{const_assert, const_assert_eq};

// ── Control bytes ─────────────────────────────────────────────────────────────

/// First byte of every connection's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Control {
    /// `u32 count` followed by `count` encoded bets. Answered with an ack.
    BetChunk = 0x01,

    /// No body. Tells the aggregator this agency has nothing more to send.
    EndBets = 0x02,

    /// No body. Answered with an ack and, if `OK`, the winners list.
    GetWinners = 0x03,
}

impl TryFrom<u8> for Control {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Control::BetChunk),
            0x02 => Ok(Control::EndBets),
            0x03 => Ok(Control::GetWinners),
            other => Err(WireError::UnknownControl(other)),
        }
    }
}

impl From<Control> for u8 {
    fn from(c: Control) -> u8 {
        c as u8
    }
}

/// Control byte + agency id. Every exchange starts with this.
pub const REQUEST_HEADER_LEN: usize = 1 + 4;

/// Build the 5-byte request header for `control`.
pub fn request_header(control: Control, agency: u32) -> [u8; REQUEST_HEADER_LEN] {
    let mut header = [0u8; REQUEST_HEADER_LEN];
    header[0] = control.into();
    header[1..].copy_from_slice(&agency.to_be_bytes());
    header
}

// ── Acknowledgement ───────────────────────────────────────────────────────────

/// Length of every acknowledgement the aggregator sends.
pub const ACK_LEN: usize = 2;

/// The only acknowledgement that means success.
pub const ACK_OK: [u8; ACK_LEN] = *b"OK";

pub fn is_ok(ack: &[u8; ACK_LEN]) -> bool {
    *ack == ACK_OK
}

// ── Bet layout ────────────────────────────────────────────────────────────────

pub const MAX_FIRST_NAME_LEN: usize = 23;
pub const MAX_LAST_NAME_LEN: usize = 10;
pub const DOCUMENT_LEN: usize = 8;
pub const BIRTHDATE_LEN: usize = 10;
pub const NUMBER_LEN: usize = 8;

/// Largest possible encoded bet: both length prefixes, both names at their
/// limits, and the fixed-width tail.
pub const MAX_BET_SIZE: usize =
    1 + MAX_FIRST_NAME_LEN + 1 + MAX_LAST_NAME_LEN + DOCUMENT_LEN + BIRTHDATE_LEN + NUMBER_LEN;

// Compile-time guard. If this fails, the bet layout has silently changed.
const_assert_eq!(MAX_BET_SIZE, 61);

// Length prefixes are one byte each.
const_assert!(MAX_FIRST_NAME_LEN <= u8::MAX as usize);
const_assert!(MAX_LAST_NAME_LEN <= u8::MAX as usize);

// ── Chunks ────────────────────────────────────────────────────────────────────

/// Upper bound on the bet payload of one chunk.
/// `count × MAX_BET_SIZE` must stay under this.
pub const CHUNK_BYTE_BUDGET: usize = 8000;

/// Most bets a single chunk can carry under the byte budget.
pub const MAX_BETS_PER_CHUNK: usize = CHUNK_BYTE_BUDGET / MAX_BET_SIZE;

const_assert_eq!(MAX_BETS_PER_CHUNK, 131);

/// Clamp a configured chunk size to what the byte budget allows.
///
/// A configured size of zero is treated as one so a chunk always makes
/// progress; config validation rejects zero before it gets here.
pub fn effective_chunk_size(configured: usize) -> usize {
    configured.clamp(1, MAX_BETS_PER_CHUNK)
}

// ── Winners ───────────────────────────────────────────────────────────────────

/// Width of every identifier in the winners list.
pub const WINNER_ID_LEN: usize = 8;

/// One entry of the winners list.
///
/// The aggregator fills it with the winning bet's document, so it reads
/// naturally as ASCII; it has the same width as the numeric field, so it can
/// also be read as a big-endian integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WinnerId(pub [u8; WINNER_ID_LEN]);

impl WinnerId {
    pub fn as_document(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

impl std::fmt::Display for WinnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_document())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown control byte: 0x{0:02x}")]
    UnknownControl(u8),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
