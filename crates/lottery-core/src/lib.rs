//! lottery-core — bet records, wire format, and configuration.
//! The client crate and the test aggregator both depend on this one.

pub mod config;
pub mod record;
pub mod wire;

pub use config::{Backoff, BackoffKind, ClientConfig, ConfigError};
pub use record::{Bet, DecodeError, ParseError, ValidationError};
pub use wire::{Control, WinnerId};
