//! RESP v2 subset: incremental request framing and reply encoding.
//!
//! Requests are arrays of bulk strings (`*<n>\r\n` followed by `n` times
//! `$<len>\r\n<bytes>\r\n`). Parsing is incremental: the caller accumulates
//! socket reads and asks for complete commands from the front of its buffer;
//! [`parse_command`] answers with the decoded command plus the number of
//! bytes consumed, `Ok(None)` when the frame is not complete yet, or a
//! [`ProtocolError`] when the bytes can never become a valid command.
//!
//! Replies are the four RESP v2 scalar forms:
//!
//! | Form      | Wire                      | Used for                  |
//! |-----------|---------------------------|---------------------------|
//! | simple    | `+PONG\r\n`               | PING, SET, QUIT, CLIENT   |
//! | error     | `-ERR <msg>\r\n`          | every error               |
//! | integer   | `:42\r\n`                 | DEL, INCR                 |
//! | bulk      | `$5\r\nhello\r\n`         | GET hit                   |
//! | nil bulk  | `$-1\r\n`                 | GET miss                  |
//!
//! Values are opaque bytes; bulk payloads are length-prefixed on both
//! directions, so interior `\r\n` or NUL bytes round-trip untouched.

use crate::error::ProtocolError;

/// Maximum length of a single bulk string (command name, key, or value).
pub const MAX_BULK_LEN: usize = 1024 * 1024;
/// Maximum number of elements in a request array (command plus arguments).
pub const MAX_ELEMENTS: usize = 100;
/// Longest accepted run of digits in a length token.
const MAX_INT_DIGITS: usize = 20;

const CRLF: &[u8] = b"\r\n";

/// A decoded request: the raw command token plus raw arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: Vec<u8>,
    pub args: Vec<Vec<u8>>,
}

impl Command {
    /// The recognized command this request names, if any.
    #[inline]
    pub fn kind(&self) -> CommandKind {
        CommandKind::from_name(&self.name)
    }
}

/// The command set the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Ping,
    Set,
    Get,
    Del,
    Unlink,
    Incr,
    Client,
    Quit,
    Unknown,
}

impl CommandKind {
    /// Case-insensitive match on the command token. Only the token is ever
    /// case-folded; arguments pass through untouched.
    pub fn from_name(name: &[u8]) -> Self {
        match name {
            n if n.eq_ignore_ascii_case(b"PING") => CommandKind::Ping,
            n if n.eq_ignore_ascii_case(b"SET") => CommandKind::Set,
            n if n.eq_ignore_ascii_case(b"GET") => CommandKind::Get,
            n if n.eq_ignore_ascii_case(b"DEL") => CommandKind::Del,
            n if n.eq_ignore_ascii_case(b"UNLINK") => CommandKind::Unlink,
            n if n.eq_ignore_ascii_case(b"INCR") => CommandKind::Incr,
            n if n.eq_ignore_ascii_case(b"CLIENT") => CommandKind::Client,
            n if n.eq_ignore_ascii_case(b"QUIT") => CommandKind::Quit,
            _ => CommandKind::Unknown,
        }
    }

    /// Canonical upper-case token, as used in arity error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Ping => "PING",
            CommandKind::Set => "SET",
            CommandKind::Get => "GET",
            CommandKind::Del => "DEL",
            CommandKind::Unlink => "UNLINK",
            CommandKind::Incr => "INCR",
            CommandKind::Client => "CLIENT",
            CommandKind::Quit => "QUIT",
            CommandKind::Unknown => "UNKNOWN",
        }
    }
}

/// Parsing interruptions: either the frame is not complete yet, or it can
/// never become valid.
enum Interrupt {
    Incomplete,
    Malformed(ProtocolError),
}

impl From<ProtocolError> for Interrupt {
    fn from(err: ProtocolError) -> Self {
        Interrupt::Malformed(err)
    }
}

type Step<T> = Result<T, Interrupt>;

/// Attempts to decode one complete command from the front of `buf`.
///
/// Returns the command and the number of bytes it occupied, `Ok(None)` when
/// more input is needed, or an error when the head of the buffer is not a
/// well-formed request.
pub fn parse_command(buf: &[u8]) -> Result<Option<(Command, usize)>, ProtocolError> {
    match parse_inner(buf) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(Interrupt::Incomplete) => Ok(None),
        Err(Interrupt::Malformed(err)) => Err(err),
    }
}

fn parse_inner(buf: &[u8]) -> Step<(Command, usize)> {
    let mut cursor = Cursor { buf, pos: 0 };
    if cursor.read_byte()? != b'*' {
        return Err(ProtocolError::ExpectedArray.into());
    }
    let count = cursor.read_length()?;
    if count == 0 || count > MAX_ELEMENTS {
        return Err(ProtocolError::BadElementCount.into());
    }

    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        elements.push(cursor.read_bulk()?);
    }
    let name = elements.remove(0);
    Ok((
        Command {
            name,
            args: elements,
        },
        cursor.pos,
    ))
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn read_byte(&mut self) -> Step<u8> {
        let Some(&b) = self.buf.get(self.pos) else {
            return Err(Interrupt::Incomplete);
        };
        self.pos += 1;
        Ok(b)
    }

    /// Reads a non-negative decimal length terminated by CRLF.
    fn read_length(&mut self) -> Step<usize> {
        let rest = &self.buf[self.pos..];
        let Some(end) = find_crlf(rest) else {
            return Err(Interrupt::Incomplete);
        };
        let digits = &rest[..end];
        if digits.is_empty() || digits.len() > MAX_INT_DIGITS {
            return Err(ProtocolError::BadLength.into());
        }
        let mut value: usize = 0;
        for &d in digits {
            if !d.is_ascii_digit() {
                return Err(ProtocolError::BadLength.into());
            }
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(usize::from(d - b'0')))
                .ok_or(ProtocolError::BadLength)?;
        }
        self.pos += end + CRLF.len();
        Ok(value)
    }

    /// Reads one `$<len>\r\n<bytes>\r\n` bulk string.
    fn read_bulk(&mut self) -> Step<Vec<u8>> {
        if self.read_byte()? != b'$' {
            return Err(ProtocolError::ExpectedBulk.into());
        }
        let len = self.read_length()?;
        if len > MAX_BULK_LEN {
            return Err(ProtocolError::BulkTooLong.into());
        }
        let needed = len + CRLF.len();
        if self.buf.len() - self.pos < needed {
            return Err(Interrupt::Incomplete);
        }
        let payload = &self.buf[self.pos..self.pos + len];
        if &self.buf[self.pos + len..self.pos + needed] != CRLF {
            return Err(ProtocolError::BadTerminator.into());
        }
        self.pos += needed;
        Ok(payload.to_vec())
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

// ---------------------------------------------------------------------------
// Reply encoding
// ---------------------------------------------------------------------------

/// `+<msg>\r\n`
pub fn write_simple(out: &mut Vec<u8>, msg: &str) {
    out.push(b'+');
    out.extend_from_slice(msg.as_bytes());
    out.extend_from_slice(CRLF);
}

/// `-ERR <msg>\r\n`
pub fn write_error(out: &mut Vec<u8>, msg: &str) {
    out.extend_from_slice(b"-ERR ");
    out.extend_from_slice(msg.as_bytes());
    out.extend_from_slice(CRLF);
}

/// `:<n>\r\n`
pub fn write_integer(out: &mut Vec<u8>, n: i64) {
    out.push(b':');
    out.extend_from_slice(n.to_string().as_bytes());
    out.extend_from_slice(CRLF);
}

/// `$<len>\r\n<payload>\r\n` — length-prefixed, binary-safe.
pub fn write_bulk(out: &mut Vec<u8>, payload: &[u8]) {
    out.push(b'$');
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.extend_from_slice(CRLF);
    out.extend_from_slice(payload);
    out.extend_from_slice(CRLF);
}

/// `$-1\r\n` — the nil bulk string (GET miss).
pub fn write_nil_bulk(out: &mut Vec<u8>) {
    out.extend_from_slice(b"$-1\r\n");
}
