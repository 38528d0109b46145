//! Multi-operation transfer manager.
//!
//! Owns the reactor-thread active set: every admitted transfer together
//! with its watched socket and its share of the single deadline timer.
//! The reactor translates poll events into calls here; the manager
//! applies each transfer's [`Progress`] and parks finished transfers
//! until the reactor drains them to the completed queue.

use std::collections::VecDeque;
use std::time::Instant;

use mio::{Registry, Token};
use slab::Slab;

use crate::transfer::{Progress, Readiness, Transfer, TransferError};
use crate::watch::SocketWatch;

/// One admitted operation: the transfer, its socket watch, and the
/// instant its deadline fires (if armed).
struct ActiveTransfer {
    transfer: Box<dyn Transfer>,
    watch: SocketWatch,
    deadline: Option<Instant>,
}

pub(crate) struct TransferManager {
    /// Slab keys double as poll tokens.
    active: Slab<ActiveTransfer>,
    /// Finished transfers in finish order, waiting to be drained.
    finished: VecDeque<Box<dyn Transfer>>,
}

impl TransferManager {
    pub(crate) fn new() -> Self {
        Self {
            active: Slab::new(),
            finished: VecDeque::new(),
        }
    }

    /// Run a transfer's initialization step and, on success, add it to
    /// the active set and register its socket.
    ///
    /// On failure the transfer is dropped by the caller without any
    /// completion notification (silent-drop admission policy).
    pub(crate) fn admit(
        &mut self,
        mut transfer: Box<dyn Transfer>,
        registry: &Registry,
    ) -> Result<Token, TransferError> {
        let activation = transfer.init()?;

        let entry = self.active.vacant_entry();
        let token = Token(entry.key());
        let watch = SocketWatch::register(registry, activation.stream, token, activation.interest)?;
        let deadline = activation.deadline.map(|d| Instant::now() + d);

        entry.insert(ActiveTransfer {
            transfer,
            watch,
            deadline,
        });
        tracing::trace!(token = token.0, "transfer admitted");
        Ok(token)
    }

    /// Hand a readiness event to the owning transfer.
    ///
    /// Stale tokens (events for a socket removed earlier in the same
    /// poll batch) are ignored.
    pub(crate) fn dispatch(&mut self, token: Token, readiness: Readiness, registry: &Registry) {
        let progress = match self.active.get_mut(token.0) {
            Some(entry) => entry.transfer.advance(entry.watch.stream_mut(), readiness),
            None => return,
        };
        self.apply(token, progress, registry);
    }

    /// Run the timeout step for every transfer whose deadline has passed.
    pub(crate) fn fire_deadlines(&mut self, now: Instant, registry: &Registry) {
        let due: Vec<Token> = self
            .active
            .iter()
            .filter_map(|(key, entry)| match entry.deadline {
                Some(at) if at <= now => Some(Token(key)),
                _ => None,
            })
            .collect();

        for token in due {
            let progress = match self.active.get_mut(token.0) {
                Some(entry) => {
                    // Disarm before the step; Await may re-arm.
                    entry.deadline = None;
                    entry.transfer.on_deadline(entry.watch.stream_mut())
                }
                None => continue,
            };
            self.apply(token, progress, registry);
        }
    }

    /// The earliest armed deadline across all active transfers.
    ///
    /// This is the shared timer: the reactor sleeps no longer than this.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.active
            .iter()
            .filter_map(|(_, entry)| entry.deadline)
            .min()
    }

    /// Drain one finished transfer, in finish order.
    pub(crate) fn pop_finished(&mut self) -> Option<Box<dyn Transfer>> {
        self.finished.pop_front()
    }

    pub(crate) fn active_len(&self) -> usize {
        self.active.len()
    }

    fn apply(&mut self, token: Token, progress: Progress, registry: &Registry) {
        match progress {
            Progress::Await { interest, deadline } => {
                if let Some(entry) = self.active.get_mut(token.0) {
                    if let Err(e) = entry.watch.update(registry, token, interest) {
                        tracing::debug!(token = token.0, error = %e, "interest update failed");
                        self.finish(token, registry);
                        return;
                    }
                    entry.deadline = deadline.map(|d| Instant::now() + d);
                }
            }
            Progress::Done => self.finish(token, registry),
        }
    }

    /// Remove a transfer from the active set and its socket from the
    /// poller, and park it for completion draining.
    fn finish(&mut self, token: Token, registry: &Registry) {
        if let Some(mut entry) = self.active.try_remove(token.0) {
            if let Err(e) = entry.watch.deregister(registry) {
                tracing::debug!(token = token.0, error = %e, "deregister failed");
            }
            self.finished.push_back(entry.transfer);
            tracing::trace!(token = token.0, "transfer finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::Activation;
    use mio::net::TcpStream as MioTcpStream;
    use mio::Interest;
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct TestTransfer {
        addr: SocketAddr,
        fail_init: bool,
        deadline: Option<Duration>,
        advanced: Arc<AtomicUsize>,
        timed_out: Arc<AtomicUsize>,
    }

    impl TestTransfer {
        fn new(addr: SocketAddr) -> Self {
            Self {
                addr,
                fail_init: false,
                deadline: None,
                advanced: Arc::new(AtomicUsize::new(0)),
                timed_out: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Transfer for TestTransfer {
        fn init(&mut self) -> Result<Activation, TransferError> {
            if self.fail_init {
                return Err(TransferError::Setup("init refused".into()));
            }
            let stream = TcpStream::connect(self.addr)?;
            stream.set_nonblocking(true)?;
            Ok(Activation {
                stream,
                interest: Interest::WRITABLE,
                deadline: self.deadline,
            })
        }

        fn advance(&mut self, _stream: &mut MioTcpStream, _readiness: Readiness) -> Progress {
            self.advanced.fetch_add(1, Ordering::SeqCst);
            Progress::Done
        }

        fn on_deadline(&mut self, _stream: &mut MioTcpStream) -> Progress {
            self.timed_out.fetch_add(1, Ordering::SeqCst);
            Progress::Done
        }

        fn on_completed(&mut self) {}
    }

    fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[test]
    fn admit_and_dispatch_to_done() {
        let poll = mio::Poll::new().unwrap();
        let (_listener, addr) = listener();
        let mut manager = TransferManager::new();

        let transfer = TestTransfer::new(addr);
        let advanced = transfer.advanced.clone();

        let token = manager.admit(Box::new(transfer), poll.registry()).unwrap();
        assert_eq!(manager.active_len(), 1);

        manager.dispatch(token, Readiness::WRITABLE, poll.registry());
        assert_eq!(advanced.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_len(), 0);
        assert!(manager.pop_finished().is_some());
        assert!(manager.pop_finished().is_none());
    }

    #[test]
    fn failed_init_is_not_admitted() {
        let poll = mio::Poll::new().unwrap();
        let (_listener, addr) = listener();
        let mut manager = TransferManager::new();

        let mut transfer = TestTransfer::new(addr);
        transfer.fail_init = true;

        assert!(manager.admit(Box::new(transfer), poll.registry()).is_err());
        assert_eq!(manager.active_len(), 0);
        assert!(manager.pop_finished().is_none());
    }

    #[test]
    fn stale_token_is_ignored() {
        let poll = mio::Poll::new().unwrap();
        let mut manager = TransferManager::new();
        manager.dispatch(Token(7), Readiness::READABLE, poll.registry());
        assert_eq!(manager.active_len(), 0);
    }

    #[test]
    fn deadline_fires_and_finishes() {
        let poll = mio::Poll::new().unwrap();
        let (_listener, addr) = listener();
        let mut manager = TransferManager::new();

        let mut transfer = TestTransfer::new(addr);
        transfer.deadline = Some(Duration::from_millis(1));
        let timed_out = transfer.timed_out.clone();

        manager.admit(Box::new(transfer), poll.registry()).unwrap();
        let deadline = manager.next_deadline().expect("deadline armed");

        manager.fire_deadlines(deadline + Duration::from_millis(1), poll.registry());
        assert_eq!(timed_out.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_len(), 0);
        assert!(manager.next_deadline().is_none());
        assert!(manager.pop_finished().is_some());
    }

    #[test]
    fn next_deadline_is_earliest() {
        let poll = mio::Poll::new().unwrap();
        let (_listener, addr) = listener();
        let mut manager = TransferManager::new();

        let mut near = TestTransfer::new(addr);
        near.deadline = Some(Duration::from_millis(10));
        let mut far = TestTransfer::new(addr);
        far.deadline = Some(Duration::from_secs(60));

        manager.admit(Box::new(far), poll.registry()).unwrap();
        manager.admit(Box::new(near), poll.registry()).unwrap();

        let earliest = manager.next_deadline().unwrap();
        assert!(earliest <= Instant::now() + Duration::from_millis(10));
    }
}
