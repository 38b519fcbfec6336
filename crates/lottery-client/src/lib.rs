//! lottery-client — agency-side client for the lottery aggregator.
//!
//! Streams an agency's bets to the aggregator in chunks, announces that
//! submission is complete, then polls until the draw results are ready.
//! Every exchange runs on its own TCP connection.

pub mod connection;
pub mod driver;
pub mod error;
pub mod source;
pub mod submitter;
pub mod transport;

pub use connection::{Connection, Dialer, TcpDialer};
pub use driver::{Driver, Phase, RunOutcome, RunReport};
pub use error::{ClientError, Result};
pub use source::{CsvSource, RecordSource, Row, VecSource};
pub use submitter::{BatchSubmitter, SubmitReport};
