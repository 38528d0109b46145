//! The cross-thread boundary and lifecycle controller.
//!
//! [`Engine::start`] spawns the reactor thread; the host thread then
//! talks to it only through the engine: [`Engine::submit`] enqueues work,
//! [`Engine::on_tick`] (called once per host simulation step) wakes the
//! reactor and drains results, and [`Engine::stop`] tears everything
//! down. A [`Relay`] carries deferred callbacks and log lines from the
//! reactor thread back to the host thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mio::{Poll, Waker};

use crate::config::Config;
use crate::error::EngineError;
use crate::queue::LockedQueue;
use crate::reactor::{Reactor, WAKE_TOKEN};
use crate::transfer::Transfer;

/// Severity of a relayed log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelayLevel {
    Message,
    Error,
}

/// Work queued for delivery on the host thread.
pub(crate) enum Deferred {
    /// Always invoked, exactly once.
    Call(Box<dyn FnOnce() + Send>),
    /// Delivered to the log sink unless the engine is torn down by the
    /// time it reaches the front of the queue.
    Log(RelayLevel, String),
}

impl Deferred {
    fn deliver(self, torn_down: bool) {
        match self {
            Deferred::Call(f) => f(),
            Deferred::Log(level, message) => {
                if torn_down {
                    // The host log sink is no longer safely reachable.
                    return;
                }
                match level {
                    RelayLevel::Message => tracing::info!("{message}"),
                    RelayLevel::Error => tracing::error!("{message}"),
                }
            }
        }
    }
}

/// State shared between the host thread and the reactor thread.
///
/// The pending, completed, and deferred queues are the only values
/// mutated from both threads, and every access goes through their locks.
/// The three flags are edge signals: `perform` and `stop` are consumed by
/// the reactor on wake, `torn_down` is written once at shutdown and read
/// as advisory at relay-delivery time.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) pending: LockedQueue<Box<dyn Transfer>>,
    pub(crate) completed: LockedQueue<Box<dyn Transfer>>,
    pub(crate) deferred: LockedQueue<Deferred>,
    pub(crate) perform: AtomicBool,
    pub(crate) stop: AtomicBool,
    pub(crate) torn_down: AtomicBool,
    waker: Waker,
}

impl Shared {
    pub(crate) fn log_message(&self, message: String) {
        self.deferred.lock().push(Deferred::Log(RelayLevel::Message, message));
    }

    pub(crate) fn log_error(&self, message: String) {
        self.deferred.lock().push(Deferred::Log(RelayLevel::Error, message));
    }

    fn wake(&self) {
        if let Err(e) = self.waker.wake() {
            tracing::error!(error = %e, "reactor wake failed");
        }
    }
}

/// Handle for scheduling host-thread work from anywhere.
///
/// Cheap to clone, `Send + Sync`; safe to call from the reactor thread,
/// from transfer code, or from the host thread itself. Everything it
/// queues is delivered by the next [`Engine::on_tick`].
#[derive(Clone)]
pub struct Relay {
    shared: Arc<Shared>,
}

impl Relay {
    /// Run `f` on the host thread during a future tick, exactly once.
    pub fn defer(&self, f: impl FnOnce() + Send + 'static) {
        self.shared.deferred.lock().push(Deferred::Call(Box::new(f)));
    }

    /// Relay an informational log line to the host thread.
    ///
    /// Dropped silently if the engine is torn down before delivery.
    pub fn log_message(&self, message: impl Into<String>) {
        self.shared.log_message(message.into());
    }

    /// Relay an error log line to the host thread.
    pub fn log_error(&self, message: impl Into<String>) {
        self.shared.log_error(message.into());
    }
}

/// The transfer engine.
///
/// One instance per host environment. Spawned at load, stopped exactly
/// once at unload; `stop` consumes the engine, so no submission or tick
/// can happen after teardown.
pub struct Engine {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Engine {
    /// Create the poller and wake signal and spawn the reactor thread.
    ///
    /// Failure here is fatal to the engine as a whole: no thread is left
    /// running and no partial state is retained.
    pub fn start(config: Config) -> Result<Engine, EngineError> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)?;

        let shared = Arc::new(Shared {
            config,
            pending: LockedQueue::new(),
            completed: LockedQueue::new(),
            deferred: LockedQueue::new(),
            perform: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            waker,
        });

        let reactor = Reactor::new(poll, shared.clone());
        let thread = thread::Builder::new()
            .name("wirepump-reactor".into())
            .spawn(move || reactor.run())
            .map_err(EngineError::Spawn)?;

        tracing::debug!("engine started");
        Ok(Engine {
            shared,
            thread: Some(thread),
        })
    }

    /// Queue a transfer for reactor admission and return immediately.
    ///
    /// The reactor picks it up after the next tick's wake. Ordering is
    /// FIFO relative to other submissions; completion order depends on
    /// network timing.
    pub fn submit(&self, transfer: Box<dyn Transfer>) {
        self.shared.pending.lock().push(transfer);
    }

    /// Host-tick hook; call once per simulation step.
    ///
    /// Delivers every queued deferred action and relayed log line, wakes
    /// the reactor if submissions are waiting, then drains at most one
    /// completed transfer and invokes its callback. Draining one per tick
    /// bounds the per-tick callback cost; a burst of completions spreads
    /// across subsequent ticks in finish order.
    ///
    /// Must not be called re-entrantly from a completion callback.
    pub fn on_tick(&self) {
        // Pop outside the lock: delivered callbacks may call defer again.
        loop {
            let entry = self.shared.deferred.lock().pop();
            match entry {
                Some(deferred) => {
                    deferred.deliver(self.shared.torn_down.load(Ordering::Acquire));
                }
                None => break,
            }
        }

        if !self.shared.pending.is_empty() {
            self.shared.perform.store(true, Ordering::Release);
            self.shared.wake();
        }

        let completed = self.shared.completed.lock().pop();
        if let Some(mut transfer) = completed {
            transfer.on_completed();
            // The box drops here: destroyed exactly once, after its
            // callback, on the host thread.
        }
    }

    /// A clonable handle for deferred callbacks and cross-thread logging.
    pub fn relay(&self) -> Relay {
        Relay {
            shared: self.shared.clone(),
        }
    }

    /// Submissions not yet admitted by the reactor.
    pub fn pending_len(&self) -> usize {
        self.shared.pending.len()
    }

    /// Finished transfers waiting for a tick to run their callback.
    pub fn completed_len(&self) -> usize {
        self.shared.completed.len()
    }

    /// Signal the reactor to stop, join its thread, and tear down.
    ///
    /// Blocks until the event loop has exited; this is the only blocking
    /// cross-thread operation in the engine. Transfers still in flight
    /// are abandoned: their sockets close with the loop and their
    /// completion callbacks never run.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.shared.stop.store(true, Ordering::Release);
        self.shared.wake();
        if thread.join().is_err() {
            tracing::error!("reactor thread panicked");
        }
        self.shared.torn_down.store(true, Ordering::Release);

        // Destroy abandoned work deterministically. No callback runs for
        // any of it, and queued log lines are dropped undelivered.
        self.shared.pending.lock().clear();
        self.shared.completed.lock().clear();
        self.shared.deferred.lock().clear();
        tracing::debug!("engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
