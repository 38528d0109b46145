//! The per-operation contract between protocol code and the engine.
//!
//! A [`Transfer`] is one outbound network operation end-to-end: an
//! HTTP-style exchange, a long-lived connection, anything that owns one
//! socket and wants to be driven by readiness events and a deadline.
//! Transfers are created on the host thread, submitted through
//! [`Engine::submit`](crate::Engine::submit), initialized and driven on
//! the reactor thread, and handed back to the host thread for exactly one
//! [`Transfer::on_completed`] call.

use std::io;
use std::net::TcpStream;
use std::time::Duration;

use mio::net::TcpStream as MioTcpStream;
use mio::Interest;

/// Socket readiness flags delivered to [`Transfer::advance`].
///
/// Readiness is edge-triggered: a transfer must read or write until it
/// sees `WouldBlock`, or it will not be woken for the same edge again.
/// A peer close or socket error is reported as readable so the next read
/// observes the EOF or the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

impl Readiness {
    pub const READABLE: Readiness = Readiness {
        readable: true,
        writable: false,
    };

    pub const WRITABLE: Readiness = Readiness {
        readable: false,
        writable: true,
    };
}

/// Result of a transfer's one-time initialization.
///
/// Produced by [`Transfer::init`] on the reactor thread: the socket the
/// reactor should watch, the initial interest, and an optional deadline
/// (duration from now) for the first [`Transfer::on_deadline`] call.
pub struct Activation {
    /// A non-blocking stream; a connect still in progress is fine.
    pub stream: TcpStream,
    pub interest: Interest,
    pub deadline: Option<Duration>,
}

/// What a transfer wants after a readiness or deadline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Keep watching the socket with `interest`. `deadline` re-arms the
    /// shared timer (duration from now); `None` cancels any previous
    /// deadline for this transfer.
    Await {
        interest: Interest,
        deadline: Option<Duration>,
    },
    /// The operation is finished. The socket is deregistered and closed,
    /// and the transfer moves to the completed queue for the host thread.
    Done,
}

impl Progress {
    /// Await with no deadline.
    pub fn awaiting(interest: Interest) -> Progress {
        Progress::Await {
            interest,
            deadline: None,
        }
    }
}

/// Error from [`Transfer::init`].
///
/// A failed init is terminal for the transfer: the box is dropped on the
/// reactor thread and `on_completed` never runs.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Setup(String),
}

/// One submitted network operation.
///
/// Threading contract, guaranteed by the engine:
///
/// - `init`, `advance`, and `on_deadline` run only on the reactor thread.
/// - `on_completed` runs exactly once, on the host thread, after the
///   transfer has finished - unless `init` failed, in which case it never
///   runs and the transfer is dropped on the reactor thread.
/// - No two methods ever run concurrently, and nothing touches the
///   transfer after `on_completed` returns; the box is dropped right away.
///
/// `advance` and `on_deadline` are infallible at this seam: a transfer
/// records its own success or failure internally and returns
/// [`Progress::Done`] to finish, so the completion callback can inspect
/// the outcome on the host thread. Errors local to one transfer never
/// touch the reactor loop or other in-flight transfers.
pub trait Transfer: Send {
    /// One-time setup on the reactor thread. Returns the socket to watch.
    fn init(&mut self) -> Result<Activation, TransferError>;

    /// The socket became ready. Drain the edge, then say what comes next.
    fn advance(&mut self, stream: &mut MioTcpStream, readiness: Readiness) -> Progress;

    /// The deadline requested in the last `Activation` or `Await` fired.
    fn on_deadline(&mut self, stream: &mut MioTcpStream) -> Progress;

    /// Completion callback, host thread only.
    fn on_completed(&mut self);
}
