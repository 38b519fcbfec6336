//! Error types for the agency client.

use std::io;

use thiserror::Error;

use lottery_core::wire::ACK_LEN;
use lottery_core::{ParseError, ValidationError};

use crate::driver::Phase;

/// Every way a run can stop short of `Done`.
///
/// All variants except `Cancelled` are fatal: nothing is retried at chunk
/// level and already-acknowledged chunks are not undone.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A bet that breaks a field limit.
    #[error("bet on line {line} is invalid: {source}")]
    Validation {
        line: usize,
        #[source]
        source: ValidationError,
    },

    /// A source row that is not a bet.
    #[error("row {line} is malformed: {source}")]
    Parse {
        line: usize,
        #[source]
        source: ParseError,
    },

    /// The record source itself failed.
    #[error("record source failed: {0}")]
    Source(#[source] io::Error),

    /// Dial retries exhausted.
    #[error("could not connect to {address} after {attempts} attempts: {source}")]
    Connection {
        address: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// Socket failure in the middle of an exchange.
    #[error("{phase}: socket I/O failed: {source}")]
    Io {
        phase: Phase,
        #[source]
        source: io::Error,
    },

    /// The aggregator answered with something other than `OK`.
    #[error("{phase}: unexpected acknowledgement {}", format_ack(.ack))]
    Protocol { phase: Phase, ack: [u8; ACK_LEN] },

    /// Winners were still not ready after the configured number of polls.
    #[error("winners not ready after {attempts} polls")]
    PollExhausted { attempts: u32 },

    /// The run was cancelled from outside.
    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    pub(crate) fn io(phase: Phase, source: io::Error) -> Self {
        ClientError::Io { phase, source }
    }
}

fn format_ack(ack: &[u8; ACK_LEN]) -> String {
    if ack.iter().all(|b| b.is_ascii_graphic()) {
        format!("{:?}", String::from_utf8_lossy(ack))
    } else {
        format!("0x{}", hex::encode(ack))
    }
}

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;
