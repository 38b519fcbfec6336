//! Where bets come from.
//!
//! The submitter only needs an ordered stream of string rows; parsing a
//! row into a `Bet` happens there, so a source never interprets fields.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use lottery_core::ParseError;

use crate::error::{ClientError, Result};

/// One source row: `[first_name, last_name, document, birthdate, number]`.
pub type Row = Vec<String>;

/// An ordered sequence of rows, read once per run.
#[async_trait]
pub trait RecordSource: Send {
    /// Next row, or `None` once the source is exhausted.
    async fn next_row(&mut self) -> Result<Option<Row>>;

    /// 1-based position of the last row returned, for error messages.
    fn line(&self) -> usize;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

// ============================================================================
// CSV file
// ============================================================================

/// Streams rows from a CSV file without loading it whole.
pub struct CsvSource {
    lines: Lines<BufReader<File>>,
    name: String,
    line: usize,
}

impl CsvSource {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            name: format!("csv:{}", path.display()),
            line: 0,
        })
    }
}

#[async_trait]
impl RecordSource for CsvSource {
    async fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            let Some(raw) = self.lines.next_line().await.map_err(ClientError::Source)? else {
                return Ok(None);
            };
            self.line += 1;
            let line = raw.strip_suffix('\r').unwrap_or(&raw);
            if line.trim().is_empty() {
                continue;
            }
            let row = split_csv_line(line).map_err(|source| ClientError::Parse {
                line: self.line,
                source,
            })?;
            return Ok(Some(row));
        }
    }

    fn line(&self) -> usize {
        self.line
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Split a CSV line respecting quoted fields (commas inside quotes, `""`
/// as an escaped quote). A quote left open at end of line is an error.
pub fn split_csv_line(line: &str) -> std::result::Result<Row, ParseError> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut open_quote = None;
    let mut chars = line.char_indices().peekable();

    while let Some((at, ch)) = chars.next() {
        match ch {
            '"' if open_quote.is_some() => {
                if matches!(chars.peek(), Some((_, '"'))) {
                    current.push('"');
                    chars.next();
                } else {
                    open_quote = None;
                }
            }
            '"' => open_quote = Some(at),
            ',' if open_quote.is_none() => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }

    if let Some(at) = open_quote {
        return Err(ParseError::UnterminatedQuote(at));
    }
    fields.push(current);
    Ok(fields)
}

// ============================================================================
// In-memory
// ============================================================================

/// Rows held in memory. Used by tests and by callers that already have
/// their bets loaded.
pub struct VecSource {
    rows: std::vec::IntoIter<Row>,
    line: usize,
}

impl VecSource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
            line: 0,
        }
    }
}

impl<S: Into<String>> FromIterator<[S; 5]> for VecSource {
    fn from_iter<I: IntoIterator<Item = [S; 5]>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        )
    }
}

#[async_trait]
impl RecordSource for VecSource {
    async fn next_row(&mut self) -> Result<Option<Row>> {
        let row = self.rows.next();
        if row.is_some() {
            self.line += 1;
        }
        Ok(row)
    }

    fn line(&self) -> usize {
        self.line
    }

    fn source_name(&self) -> &str {
        "memory"
    }
}
