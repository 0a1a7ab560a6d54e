//! The connection tracker: a `current` map mutated on every event and a
//! `down` window that only `flush` mutates.
//!
//! Failures start tracking an address; successes only cancel what failures
//! started. Each flush promotes failures seen since the last flush into the
//! down window and ages keys that stayed silent, expiring them after
//! `expire_after` cycles.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::IpAddr;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::Level;

use crate::config::Config;

use super::destination::{Counts, DestinationKey, DestinationState};

/// Capacity and expiry settings of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub expire_after: u16,
    pub max_addresses: usize,
    pub max_destinations_per_address: usize,
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        let config = config.clone().with_defaults();
        Self {
            expire_after: config.expire_after,
            max_addresses: config.max_addresses,
            max_destinations_per_address: config.max_destinations_per_address,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Result of `record_success`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuccessOutcome {
    /// Counts of the key, `None` if the key was not tracked.
    pub counts: Option<Counts>,
    /// The signal changed tracker state.
    pub recorded: bool,
}

/// What a flush did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Keys that aged out of the down window.
    pub expired: usize,
    /// Failing addresses turned away because the down window was full.
    pub rejected: usize,
    pub down: usize,
    pub current: usize,
}

/// One address of the down window, as reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownTarget {
    pub address: IpAddr,
    pub up: bool,
    pub ports: Vec<DownPort>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownPort {
    pub protocol: u8,
    pub port: u16,
    /// The key failed in the last promoted cycle.
    pub failing: bool,
}

#[derive(Debug, Default)]
struct TrackerState {
    current: HashMap<IpAddr, DestinationState>,
    down: HashMap<IpAddr, DestinationState>,
}

/// Records failed and successful connections and keeps the rolling down
/// window. Shared between the consumer (writes) and reporting (reads).
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    limits: Limits,
    state: RwLock<TrackerState>,
}

impl ConnectionTracker {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            state: RwLock::new(TrackerState::default()),
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Count a connection to `address` that never saw a reply.
    pub fn record_failure(&self, address: IpAddr, protocol: u8, port: u16) -> Counts {
        let mut state = self.state.write();
        let entry = state.current.entry(address).or_default();
        entry.up = false;
        entry.connections.failure(
            DestinationKey::new(protocol, port),
            self.limits.max_destinations_per_address,
        )
    }

    /// Count a connection to `address` that saw traffic.
    ///
    /// Addresses that are neither failing this cycle nor in the down window
    /// are not tracked at all.
    pub fn record_success(&self, address: IpAddr, protocol: u8, port: u16) -> SuccessOutcome {
        let mut guard = self.state.write();
        let TrackerState { current, down } = &mut *guard;

        let mut changed = false;
        let entry = current.get(&address);
        if !entry.is_some_and(|s| s.up) {
            let failing = entry.is_some_and(|s| !s.connections.is_empty());
            let tracked = down.get(&address).is_some_and(|s| !s.is_empty());
            if !failing && !tracked {
                return SuccessOutcome::default();
            }
            current.entry(address).or_default().up = true;
            changed = true;
        }

        let counts = current
            .get_mut(&address)
            .and_then(|s| s.connections.success(DestinationKey::new(protocol, port)));

        SuccessOutcome {
            counts,
            recorded: counts.is_some() || changed,
        }
    }

    /// Merge this cycle's activity into the down window and age out silent
    /// keys. Called once per interval.
    pub fn flush(&self) -> FlushSummary {
        let mut guard = self.state.write();
        let TrackerState { current, down } = &mut *guard;
        let limits = self.limits;
        let mut summary = FlushSummary::default();

        dump("before", down, current);

        for (address, state) in current.iter_mut() {
            let up = state.up;
            state.connections.retain(|key, stats| {
                if !stats.success.is_zero() {
                    // A success cancels the down record for this exact key.
                    if let Some(down_state) = down.get_mut(address) {
                        down_state.connections.remove(key);
                        down_state.up = true;
                    }
                    return false;
                }

                if !stats.failure.is_zero() {
                    stats.failure.reset();

                    let at_capacity = down.len() >= limits.max_addresses;
                    let down_state = match down.entry(*address) {
                        Entry::Occupied(entry) => entry.into_mut(),
                        Entry::Vacant(_) if at_capacity => {
                            summary.rejected += 1;
                            return true;
                        }
                        Entry::Vacant(entry) => entry.insert(DestinationState::default()),
                    };
                    down_state.up = up;
                    down_state
                        .connections
                        .failure(*key, limits.max_destinations_per_address);
                    return true;
                }

                if let Some(down_state) = down.get_mut(address) {
                    down_state.up = up;
                }
                false
            });
        }
        current.retain(|_, state| !state.connections.is_empty());

        let mut stale = Vec::new();
        down.retain(|address, state| {
            if state.up && state.connections.is_empty() {
                return false;
            }
            if current
                .get(address)
                .is_some_and(|s| !s.connections.is_empty())
            {
                return true;
            }

            state.connections.retain(|_, stats| {
                stats.unknown.increment();
                if stats.unknown.get() >= limits.expire_after {
                    summary.expired += 1;
                    return false;
                }
                true
            });
            if state.connections.is_empty() {
                stale.push(*address);
                return false;
            }
            true
        });
        for address in stale {
            current.remove(&address);
        }

        summary.down = down.len();
        summary.current = current.len();
        tracing::debug!(
            expired = summary.expired,
            rejected = summary.rejected,
            down = summary.down,
            current = summary.current,
            "flushed connection state"
        );
        dump("after", down, current);

        summary
    }

    /// The down window sorted by address, for reporting.
    pub fn snapshot(&self) -> Vec<DownTarget> {
        let state = self.state.read();
        let mut targets: Vec<DownTarget> = state
            .down
            .iter()
            .map(|(address, dst)| {
                let mut ports: Vec<DownPort> = dst
                    .connections
                    .iter()
                    .map(|(key, stats)| DownPort {
                        protocol: key.protocol,
                        port: key.port,
                        failing: !stats.failure.is_zero(),
                    })
                    .collect();
                ports.sort_by_key(|p| (p.protocol, p.port));
                DownTarget {
                    address: *address,
                    up: dst.up,
                    ports,
                }
            })
            .collect();
        targets.sort_by_key(|t| t.address);
        targets
    }

    pub fn current_len(&self) -> usize {
        self.state.read().current.len()
    }

    pub fn down_len(&self) -> usize {
        self.state.read().down.len()
    }

    pub fn current_state(&self, address: &IpAddr) -> Option<DestinationState> {
        self.state.read().current.get(address).cloned()
    }

    pub fn down_state(&self, address: &IpAddr) -> Option<DestinationState> {
        self.state.read().down.get(address).cloned()
    }
}

fn dump(
    phase: &str,
    down: &HashMap<IpAddr, DestinationState>,
    current: &HashMap<IpAddr, DestinationState>,
) {
    if !tracing::enabled!(Level::TRACE) {
        return;
    }
    for (table, map) in [("down", down), ("current", current)] {
        for (address, state) in map {
            for (key, stats) in state.connections.iter() {
                tracing::trace!(
                    phase,
                    table,
                    ip = %address,
                    up = state.up,
                    proto = key.protocol,
                    port = key.port,
                    success = stats.success.get(),
                    failure = stats.failure.get(),
                    unknown = stats.unknown.get(),
                );
            }
        }
    }
}
