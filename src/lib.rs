//! wirepump - cross-thread network transfer engine.
//!
//! A host thread that runs a per-tick loop (a game frame, a simulation
//! step) submits outbound network operations; a dedicated reactor thread
//! multiplexes all of their sockets through one `mio::Poll` and one
//! shared deadline. The host thread never blocks on the engine and never
//! touches reactor state: the two sides meet only at lock-scoped queues
//! and non-blocking wake signals.
//!
//! # Guarantees
//!
//! - Submissions are admitted in FIFO order, at most a configured batch
//!   per wake.
//! - Each transfer's completion callback runs exactly once, on the host
//!   thread, never concurrently with its initialization or destruction -
//!   or never at all, if initialization failed or the engine stopped
//!   while it was in flight.
//! - Each tick runs at most one completion callback, so a burst of
//!   completions spreads across ticks instead of spiking one.
//! - `stop` joins the reactor thread; after it returns no callback or
//!   relayed log line is ever delivered.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use wirepump::{ByteExchange, Config, Engine};
//!
//! # fn main() -> Result<(), wirepump::EngineError> {
//! let engine = Engine::start(Config::default())?;
//!
//! let addr = "127.0.0.1:9000".parse().unwrap();
//! let exchange = ByteExchange::new(addr, b"ping".to_vec(), |outcome| {
//!     match outcome {
//!         Ok(response) => println!("{} response bytes", response.len()),
//!         Err(e) => eprintln!("exchange failed: {e}"),
//!     }
//! })
//! .timeout(Duration::from_secs(5));
//! engine.submit(Box::new(exchange));
//!
//! loop {
//!     engine.on_tick();
//!     // ... the rest of the host simulation step ...
//!     # break;
//! }
//!
//! engine.stop();
//! # Ok(())
//! # }
//! ```

pub use mio;

mod config;
mod engine;
mod error;
mod exchange;
mod manager;
mod reactor;
mod watch;

pub mod net;
pub mod queue;
pub mod transfer;

pub use config::Config;
pub use engine::{Engine, Relay};
pub use error::EngineError;
pub use exchange::ByteExchange;
pub use queue::LockedQueue;
pub use transfer::{Activation, Progress, Readiness, Transfer, TransferError};
