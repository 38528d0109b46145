//! Engine configuration.

use serde::Deserialize;

/// Tuning knobs for the engine. Every field has a sensible default, so
/// `Config::default()` works, as does deserializing a partial TOML table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of pending transfers admitted per wake.
    ///
    /// The reactor thread is the only thread servicing all live sockets;
    /// the cap keeps a burst of submissions from delaying socket events
    /// for transfers already in flight. Default: 10.
    pub max_admit_per_wake: usize,

    /// Capacity of the poll event buffer. Default: 1024.
    pub events_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_admit_per_wake: default_max_admit_per_wake(),
            events_capacity: default_events_capacity(),
        }
    }
}

fn default_max_admit_per_wake() -> usize {
    10
}

fn default_events_capacity() -> usize {
    1024
}
