//! TCP front-end: accept loop, per-connection handler threads, dispatch.
//!
//! One blocking accept loop hands each connection to its own handler
//! thread. A handler owns a byte accumulator: every socket read is appended,
//! complete commands are greedily parsed off the front and dispatched, and
//! the trailing partial frame is retained for the next read. Protocol
//! errors answer `-ERR protocol error` and close the connection.
//!
//! ```text
//!   socket ──► accumulator ──► parse_command ──► dispatch ──► TieredCache
//!                   ▲                                 │
//!                   └── trailing partial              └──► reply bytes ──► socket
//! ```
//!
//! Only this layer turns [`StoreError`]s into wire messages; the tiers
//! below return typed results. The accept loop never dies on a
//! per-connection error.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::StoreError;
use crate::resp::{self, Command, CommandKind};
use crate::tiered::TieredCache;

/// Bytes requested per socket read.
const READ_CHUNK: usize = 16 * 1024;
/// Upper bound on buffered, unparsed request bytes per connection. Large
/// enough for a maximum-size bulk value plus framing.
const MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;

/// The TCP server: a bound listener plus the shared cache.
pub struct Server {
    listener: TcpListener,
    cache: Arc<TieredCache>,
    running: Arc<AtomicBool>,
}

/// Remote control for a running [`Server`]: clears the running flag and
/// nudges the accept loop awake.
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    addr: Option<SocketAddr>,
}

impl ShutdownHandle {
    /// Requests shutdown. Safe to call from any thread, including a
    /// signal-watcher.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        // accept() blocks until a peer arrives; a throwaway local
        // connection gets the loop to re-check the flag.
        if let Some(addr) = self.addr {
            let _ = TcpStream::connect(addr);
        }
    }

    /// The shared running flag, for workers that follow the server's
    /// lifecycle (e.g. the status reporter).
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}

impl Server {
    /// Binds the listening socket on the configured port.
    pub fn bind(config: &ServerConfig, cache: Arc<TieredCache>) -> io::Result<Server> {
        let listener = TcpListener::bind(("0.0.0.0", config.port))?;
        info!(port = config.port, "server listening");
        Ok(Server {
            listener,
            cache,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// The bound address (useful when the configured port was 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A handle that can stop the accept loop from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
            addr: self.listener.local_addr().ok(),
        }
    }

    /// Runs the accept loop until shutdown is requested.
    pub fn run(&self) {
        while self.running.load(Ordering::SeqCst) {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(err) => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    warn!(%err, "accept failed");
                    continue;
                }
            };
            if !self.running.load(Ordering::SeqCst) {
                // The shutdown nudge itself.
                break;
            }

            info!(%peer, "client connected");
            let cache = Arc::clone(&self.cache);
            let running = Arc::clone(&self.running);
            let spawned = thread::Builder::new()
                .name(format!("podcache-conn-{peer}"))
                .spawn(move || handle_connection(stream, peer, cache, running));
            if let Err(err) = spawned {
                error!(%peer, %err, "failed to spawn handler thread");
            }
        }
        info!("accept loop stopped");
    }
}

/// Whether the connection should stay open after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    cache: Arc<TieredCache>,
    running: Arc<AtomicBool>,
) {
    let mut pending: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    'outer: while running.load(Ordering::SeqCst) {
        let received = match stream.read(&mut chunk) {
            Ok(0) => {
                debug!(%peer, "connection closed by client");
                break;
            }
            Ok(n) => n,
            Err(err) => {
                if err.kind() != io::ErrorKind::ConnectionReset {
                    warn!(%peer, %err, "receive error");
                }
                break;
            }
        };

        if pending.len() + received > MAX_PENDING_BYTES {
            warn!(%peer, "request exceeds the pending-byte limit");
            let _ = send_error(&mut stream, "protocol error");
            break;
        }
        pending.extend_from_slice(&chunk[..received]);

        // Greedily dispatch every complete command at the front of the
        // buffer; keep the trailing partial for the next read.
        let mut consumed = 0;
        while consumed < pending.len() {
            match resp::parse_command(&pending[consumed..]) {
                Ok(Some((command, used))) => {
                    consumed += used;
                    let flow = match dispatch(&cache, &command, &peer, &mut stream) {
                        Ok(flow) => flow,
                        Err(err) => {
                            debug!(%peer, %err, "reply write failed");
                            break 'outer;
                        }
                    };
                    if flow == Flow::Close {
                        break 'outer;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(%peer, %err, "protocol error");
                    let _ = send_error(&mut stream, "protocol error");
                    break 'outer;
                }
            }
        }
        pending.drain(..consumed);
    }

    info!(%peer, "client disconnected");
    let _ = stream.shutdown(Shutdown::Both);
}

fn dispatch(
    cache: &TieredCache,
    command: &Command,
    peer: &SocketAddr,
    stream: &mut TcpStream,
) -> io::Result<Flow> {
    let mut reply = Vec::new();
    let flow = execute(cache, command, peer, &mut reply);
    stream.write_all(&reply)?;
    Ok(flow)
}

/// Runs one command against the cache, appending the reply bytes to
/// `reply`.
fn execute(cache: &TieredCache, command: &Command, peer: &SocketAddr, reply: &mut Vec<u8>) -> Flow {
    let kind = command.kind();
    debug!(%peer, command = kind.as_str(), args = command.args.len(), "dispatch");
    match kind {
        CommandKind::Ping => {
            if !check_arity(command, kind, 0, reply) {
                return Flow::Continue;
            }
            resp::write_simple(reply, "PONG");
            Flow::Continue
        }
        CommandKind::Set => {
            if !check_arity(command, kind, 2, reply) {
                return Flow::Continue;
            }
            match cache.put(&command.args[0], &command.args[1]) {
                Ok(()) => resp::write_simple(reply, "OK"),
                Err(err) => write_store_error(reply, &err),
            }
            Flow::Continue
        }
        CommandKind::Get => {
            if !check_arity(command, kind, 1, reply) {
                return Flow::Continue;
            }
            match cache.get(&command.args[0]) {
                Ok(Some(value)) => resp::write_bulk(reply, &value),
                Ok(None) => resp::write_nil_bulk(reply),
                Err(err) => write_store_error(reply, &err),
            }
            Flow::Continue
        }
        CommandKind::Del | CommandKind::Unlink => {
            if !check_arity(command, kind, 1, reply) {
                return Flow::Continue;
            }
            let removed = cache.evict(&command.args[0]);
            resp::write_integer(reply, i64::from(removed));
            Flow::Continue
        }
        CommandKind::Incr => {
            if !check_arity(command, kind, 1, reply) {
                return Flow::Continue;
            }
            incr(cache, &command.args[0], reply);
            Flow::Continue
        }
        CommandKind::Client => {
            // Client-library handshake (e.g. Jedis sends CLIENT SETINFO).
            // Nothing to track; acknowledge unconditionally.
            resp::write_simple(reply, "OK");
            Flow::Continue
        }
        CommandKind::Quit => {
            if !check_arity(command, kind, 0, reply) {
                return Flow::Continue;
            }
            resp::write_simple(reply, "OK BYE");
            Flow::Close
        }
        CommandKind::Unknown => {
            resp::write_error(reply, "unknown command");
            Flow::Continue
        }
    }
}

/// Absent keys are initialized to 1; present values must parse as a strict
/// signed 64-bit decimal. Overflow reads as a parse failure.
fn incr(cache: &TieredCache, key: &[u8], reply: &mut Vec<u8>) {
    let current = match cache.get(key) {
        Ok(current) => current,
        Err(err) => return write_store_error(reply, &err),
    };

    let next = match current {
        None => 1,
        Some(bytes) => {
            let parsed = std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .and_then(|v| v.checked_add(1));
            match parsed {
                Some(next) => next,
                None => {
                    resp::write_error(reply, "value is not an integer or out of range");
                    return;
                }
            }
        }
    };

    match cache.put(key, next.to_string().as_bytes()) {
        Ok(()) => resp::write_integer(reply, next),
        Err(err) => write_store_error(reply, &err),
    }
}

fn check_arity(command: &Command, kind: CommandKind, expected: usize, reply: &mut Vec<u8>) -> bool {
    if command.args.len() == expected {
        return true;
    }
    resp::write_error(
        reply,
        &format!(
            "wrong number of arguments for '{}' command",
            kind.as_str()
        ),
    );
    false
}

fn write_store_error(reply: &mut Vec<u8>, err: &StoreError) {
    resp::write_error(reply, store_error_message(err));
}

/// The wire text for each storage failure. This is the only place tier
/// errors become client-visible.
fn store_error_message(err: &StoreError) -> &'static str {
    match err {
        StoreError::OutOfMemory => "out of memory",
        StoreError::TooLarge => "value too large",
        StoreError::Spill(_) | StoreError::Disk(_) => "storage error",
    }
}

fn send_error(stream: &mut TcpStream, msg: &str) -> io::Result<()> {
    let mut reply = Vec::new();
    resp::write_error(&mut reply, msg);
    stream.write_all(&reply)
}
