//! Bet records and their on-wire encoding.
//!
//! Layout of one encoded bet:
//!
//! ```text
//! u8 name_len | name | u8 surname_len | surname | [u8; 8] document | [u8; 10] birthdate | u64 number
//! ```
//!
//! Names are length-prefixed. Document and birthdate are fixed-width and
//! not prefixed, so they are fitted to their width before encoding:
//! values longer than the width are truncated, a short document is
//! left-padded with `'0'` and a short birthdate is right-padded with `' '`.
//! Both must be ASCII so that truncation never splits a character.

use bytes::{Buf, BufMut};

use crate::wire::{
    BIRTHDATE_LEN, DOCUMENT_LEN, MAX_FIRST_NAME_LEN, MAX_LAST_NAME_LEN, NUMBER_LEN,
};

/// Number of columns in a source row.
pub const ROW_ARITY: usize = 5;

const DOCUMENT_PAD: u8 = b'0';
const BIRTHDATE_PAD: u8 = b' ';

/// A single bet as read from the agency's record source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub first_name: String,
    pub last_name: String,
    pub document: String,
    pub birthdate: String,
    pub number: u64,
}

impl Bet {
    /// Build a bet from a source row `[first_name, last_name, document, birthdate, number]`.
    ///
    /// Only the number is interpreted here; every other field is taken as-is
    /// and checked when the bet is encoded.
    pub fn decode_row<S: AsRef<str>>(fields: &[S]) -> Result<Self, ParseError> {
        if fields.len() != ROW_ARITY {
            return Err(ParseError::Arity {
                expected: ROW_ARITY,
                found: fields.len(),
            });
        }

        let raw_number = fields[4].as_ref().trim();
        let number = raw_number
            .parse::<u64>()
            .map_err(|e| ParseError::Number(raw_number.to_string(), e))?;

        Ok(Self {
            first_name: fields[0].as_ref().to_string(),
            last_name: fields[1].as_ref().to_string(),
            document: fields[2].as_ref().to_string(),
            birthdate: fields[3].as_ref().to_string(),
            number,
        })
    }

    /// Exact number of bytes `encode` will append.
    pub fn encoded_len(&self) -> usize {
        1 + self.first_name.len()
            + 1
            + self.last_name.len()
            + DOCUMENT_LEN
            + BIRTHDATE_LEN
            + NUMBER_LEN
    }

    /// Check every field limit without encoding.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.first_name.len() > MAX_FIRST_NAME_LEN {
            return Err(ValidationError::FirstNameTooLong(self.first_name.len()));
        }
        if self.last_name.len() > MAX_LAST_NAME_LEN {
            return Err(ValidationError::LastNameTooLong(self.last_name.len()));
        }
        if !self.document.is_ascii() {
            return Err(ValidationError::NonAscii("document"));
        }
        if !self.birthdate.is_ascii() {
            return Err(ValidationError::NonAscii("birthdate"));
        }
        Ok(())
    }

    /// Append the wire form of this bet to `buf`.
    ///
    /// Nothing is written if validation fails.
    pub fn encode(&self, buf: &mut impl BufMut) -> Result<(), ValidationError> {
        self.validate()?;

        buf.put_u8(self.first_name.len() as u8);
        buf.put_slice(self.first_name.as_bytes());
        buf.put_u8(self.last_name.len() as u8);
        buf.put_slice(self.last_name.as_bytes());
        buf.put_slice(&fit_left::<DOCUMENT_LEN>(self.document.as_bytes(), DOCUMENT_PAD));
        buf.put_slice(&fit_right::<BIRTHDATE_LEN>(
            self.birthdate.as_bytes(),
            BIRTHDATE_PAD,
        ));
        buf.put_u64(self.number);
        Ok(())
    }

    /// Read one bet from the front of `buf`, advancing past it.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, DecodeError> {
        let first_name = read_prefixed(buf, "first_name")?;
        let last_name = read_prefixed(buf, "last_name")?;

        let document = read_fixed::<DOCUMENT_LEN>(buf, "document")?;
        let birthdate = read_fixed::<BIRTHDATE_LEN>(buf, "birthdate")?;

        need(buf, NUMBER_LEN, "number")?;
        let number = buf.get_u64();

        Ok(Self {
            first_name,
            last_name,
            document,
            birthdate,
            number,
        })
    }

    /// The bet as it will look after a round trip through the wire, with
    /// document and birthdate fitted to their widths.
    pub fn normalized(&self) -> Self {
        Self {
            document: String::from_utf8_lossy(&fit_left::<DOCUMENT_LEN>(
                self.document.as_bytes(),
                DOCUMENT_PAD,
            ))
            .into_owned(),
            birthdate: String::from_utf8_lossy(&fit_right::<BIRTHDATE_LEN>(
                self.birthdate.as_bytes(),
                BIRTHDATE_PAD,
            ))
            .into_owned(),
            ..self.clone()
        }
    }
}

// ── Fixed-width helpers ───────────────────────────────────────────────────────

/// Truncate to `N`, or pad on the left.
fn fit_left<const N: usize>(value: &[u8], pad: u8) -> [u8; N] {
    let mut out = [pad; N];
    let len = value.len().min(N);
    out[N - len..].copy_from_slice(&value[..len]);
    out
}

/// Truncate to `N`, or pad on the right.
fn fit_right<const N: usize>(value: &[u8], pad: u8) -> [u8; N] {
    let mut out = [pad; N];
    let len = value.len().min(N);
    out[..len].copy_from_slice(&value[..len]);
    out
}

fn need(buf: &impl Buf, n: usize, field: &'static str) -> Result<(), DecodeError> {
    if buf.remaining() < n {
        return Err(DecodeError::Truncated {
            field,
            needed: n,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

fn read_prefixed(buf: &mut impl Buf, field: &'static str) -> Result<String, DecodeError> {
    need(buf, 1, field)?;
    let len = buf.get_u8() as usize;
    need(buf, len, field)?;
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8(field))
}

fn read_fixed<const N: usize>(
    buf: &mut impl Buf,
    field: &'static str,
) -> Result<String, DecodeError> {
    need(buf, N, field)?;
    let mut raw = [0u8; N];
    buf.copy_to_slice(&mut raw);
    String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8(field))
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A bet that cannot be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("first name is {0} bytes, limit is {}", MAX_FIRST_NAME_LEN)]
    FirstNameTooLong(usize),

    #[error("last name is {0} bytes, limit is {}", MAX_LAST_NAME_LEN)]
    LastNameTooLong(usize),

    #[error("{0} must be ASCII")]
    NonAscii(&'static str),
}

/// A source row that cannot be turned into a bet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected {expected} fields, found {found}")]
    Arity { expected: usize, found: usize },

    #[error("invalid bet number {0:?}: {1}")]
    Number(String, std::num::ParseIntError),

    #[error("quoted field opened at byte {0} is never closed")]
    UnterminatedQuote(usize),
}

/// Bytes that do not hold a well-formed bet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated {field}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
