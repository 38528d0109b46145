//! The background event loop.
//!
//! One thread, one `mio::Poll`, any number of sockets, one shared
//! deadline. The loop advances transfers on socket readiness and on timer
//! expiry, honors the two cross-thread wake signals ("work is pending"
//! and "stop"), and moves finished transfers to the completed queue for
//! the host thread to drain.

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use mio::{Events, Poll, Token};

use crate::engine::Shared;
use crate::manager::TransferManager;
use crate::transfer::Readiness;

/// Token reserved for the waker, offset far above any slab key.
pub(crate) const WAKE_TOKEN: Token = Token(1 << 30);

pub(crate) struct Reactor {
    poll: Poll,
    events: Events,
    manager: TransferManager,
    shared: Arc<Shared>,
    max_admit_per_wake: usize,
}

impl Reactor {
    pub(crate) fn new(poll: Poll, shared: Arc<Shared>) -> Reactor {
        let config = shared.config.clone();
        Reactor {
            poll,
            events: Events::with_capacity(config.events_capacity),
            manager: TransferManager::new(),
            shared,
            max_admit_per_wake: config.max_admit_per_wake,
        }
    }

    /// Run until the stop signal arrives. Transfers still active when the
    /// loop exits are abandoned: sockets close with the loop and their
    /// completion callbacks never run.
    pub(crate) fn run(mut self) {
        tracing::debug!("reactor running");
        loop {
            let timeout = self
                .manager
                .next_deadline()
                .map(|at| at.saturating_duration_since(Instant::now()));

            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.shared.log_error(format!("reactor poll failed: {e}"));
                    return;
                }
            }

            // Copy out event info first; dispatching mutates the active
            // set the events refer to.
            let events: Vec<(Token, bool, bool)> = self
                .events
                .iter()
                .map(|e| {
                    (
                        e.token(),
                        e.is_readable() || e.is_read_closed() || e.is_write_closed() || e.is_error(),
                        e.is_writable(),
                    )
                })
                .collect();

            let mut stop = false;
            for (token, readable, writable) in events {
                if token == WAKE_TOKEN {
                    if self.shared.stop.load(Ordering::Acquire) {
                        stop = true;
                    }
                    if self.shared.perform.swap(false, Ordering::AcqRel) {
                        self.admit_pending();
                    }
                    continue;
                }

                self.manager
                    .dispatch(token, Readiness { readable, writable }, self.poll.registry());
                self.drain_finished();
            }

            if stop {
                tracing::debug!("reactor stopping");
                return;
            }

            self.manager
                .fire_deadlines(Instant::now(), self.poll.registry());
            self.drain_finished();
        }
    }

    /// Drain the pending queue into the active set, up to the per-wake
    /// admission cap. Failed initializations are dropped silently: the
    /// submitter is not notified and no completion is queued.
    ///
    /// The cap keeps a burst of submissions from starving socket
    /// servicing for transfers that are already in flight; whatever is
    /// left stays queued for the next wake.
    fn admit_pending(&mut self) {
        let mut kicked = Vec::new();
        {
            let mut pending = self.shared.pending.lock();
            let mut admitted = 0;
            while admitted < self.max_admit_per_wake {
                let transfer = match pending.pop() {
                    Some(t) => t,
                    None => break,
                };
                match self.manager.admit(transfer, self.poll.registry()) {
                    Ok(token) => {
                        kicked.push(token);
                        admitted += 1;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "transfer dropped at admission");
                    }
                }
            }
        }

        // With edge-triggered polling a non-blocking connect can finish
        // before registration; give every new transfer one synthetic
        // writable event so its first edge is never lost.
        for token in kicked {
            self.manager
                .dispatch(token, Readiness::WRITABLE, self.poll.registry());
        }
        self.drain_finished();
    }

    /// Move every finished transfer to the completed queue.
    ///
    /// Runs on the reactor thread only and never invokes completion
    /// callbacks; those are deferred to the host tick so they observe
    /// host-thread state safely.
    fn drain_finished(&mut self) {
        while let Some(transfer) = self.manager.pop_finished() {
            self.shared.completed.lock().push(transfer);
        }
    }
}
