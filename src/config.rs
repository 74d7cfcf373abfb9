//! Tunables for a replay's lifecycle. Constructed by the collaborator and
//! handed to [`crate::replay::Replay::new`] — the core never reads env vars
//! or config files itself; that stays a collaborator concern.

use std::time::Duration;

/// Per-replay configuration.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Window after the last writer disconnects during which a late writer
    /// may reattach before `StreamLifetime` reaches `Ended`.
    pub grace_period: Duration,
    /// How far behind the canonical stream the delayed (reader-visible)
    /// stream trails.
    pub default_delay: Duration,
    /// Hard cap on a match's lifetime; both `Merger` and `Sender` are closed
    /// when it fires.
    pub match_timeout: Duration,
    /// Maximum number of bytes the header parser will read before giving up.
    pub header_max_len: usize,
    /// Granularity at which `DelayedStream` samples the canonical length.
    pub sample_tick: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(30),
            default_delay: Duration::from_secs(300),
            match_timeout: Duration::from_secs(6 * 3600),
            header_max_len: 1024 * 1024,
            sample_tick: Duration::from_secs(1),
        }
    }
}
