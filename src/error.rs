//! Error types for the podcache library.
//!
//! ## Key Components
//!
//! - [`StoreError`]: Returned by the storage tiers (memory partitions, disk
//!   store, tier orchestration). Only the protocol front-end translates these
//!   into wire messages.
//! - [`ProtocolError`]: Returned by the RESP framing layer when a request is
//!   malformed. The server answers `-ERR protocol error` and closes the
//!   connection.
//! - [`InvariantError`]: Returned by debug-oriented `check_invariants`
//!   methods when an internal data-structure invariant is violated.

use std::io;

use thiserror::Error;

/// Errors surfaced by the storage tiers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A key or value buffer could not be allocated.
    #[error("out of memory")]
    OutOfMemory,

    /// The entry exceeds the capacity of its memory partition; no amount of
    /// spilling can admit it.
    #[error("value too large for partition")]
    TooLarge,

    /// Writing a spill victim to the disk tier failed. The memory tier is
    /// left untouched.
    #[error("spill to disk failed: {0}")]
    Spill(#[source] io::Error),

    /// A disk-tier read or write failed.
    #[error("disk i/o error: {0}")]
    Disk(#[from] io::Error),
}

/// Errors produced while framing or decoding RESP input.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The request did not start with an `*` array header.
    #[error("request does not start with an array header")]
    ExpectedArray,

    /// An array element was not a `$` bulk string.
    #[error("expected a bulk string element")]
    ExpectedBulk,

    /// A length token was empty, non-numeric, negative, or too long.
    #[error("malformed length token")]
    BadLength,

    /// The array element count was zero or above the permitted maximum.
    #[error("element count out of range")]
    BadElementCount,

    /// A bulk string exceeded the permitted maximum length.
    #[error("bulk string too long")]
    BulkTooLong,

    /// A CRLF terminator was missing where one was required.
    #[error("missing CRLF terminator")]
    BadTerminator,
}

/// Error returned when internal cache invariants are violated.
///
/// Produced by `check_invariants` methods on the storage cores. Carries a
/// human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}
