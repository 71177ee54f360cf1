//! Status codes and their wire encoding.
//!
//! A response is always exactly three ASCII digits followed by the session
//! closing the connection. There is no terminator and no body.

use std::fmt;
use std::io::Write;

/// Width of every encoded response.
pub const STATUS_WIDTH: usize = 3;

/// HTTP-style status reported back to monitor clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The command completed.
    Ok,
    /// The request was malformed or lacked a required argument.
    BadRequest,
    /// The command was accepted but the host could not carry it out.
    InternalError,
    /// The command is unknown or not implemented yet.
    NotImplemented,
}

impl StatusCode {
    /// Numeric value of the status.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::InternalError => 500,
            Self::NotImplemented => 501,
        }
    }

    /// Parses a numeric status.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            200 => Some(Self::Ok),
            400 => Some(Self::BadRequest),
            500 => Some(Self::InternalError),
            501 => Some(Self::NotImplemented),
            _ => None,
        }
    }

    /// Encodes the status as three zero-padded ASCII digits.
    #[must_use]
    pub fn encode(self) -> [u8; STATUS_WIDTH] {
        let value = self.as_u16();
        let digit = |divisor: u16| {
            // Each digit is < 10 so the narrowing is lossless.
            b'0' + u8::try_from((value / divisor) % 10).unwrap_or(0)
        };
        [digit(100), digit(10), digit(1)]
    }

    /// Decodes a three-digit wire response.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?;
        if text.len() != STATUS_WIDTH {
            return None;
        }
        text.parse::<u16>().ok().and_then(Self::from_u16)
    }

    /// Writes the encoded status to `writer`.
    ///
    /// # Errors
    ///
    /// Returns any error reported by the writer.
    pub fn write_to<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.encode())?;
        writer.flush()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:03}", self.as_u16())
    }
}
