use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// 16-bit counter that sticks at `u16::MAX` instead of wrapping to zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Counter(u16);

impl Counter {
    pub const MAX: Counter = Counter(u16::MAX);

    pub fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn increment(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    pub fn get(self) -> u16 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// A target endpoint below the address level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationKey {
    pub port: u16,
    pub protocol: u8,
}

impl DestinationKey {
    pub fn new(protocol: u8, port: u16) -> Self {
        Self { port, protocol }
    }
}

/// Per-key outcome counters. `unknown` counts silent flush cycles and is the
/// expiry clock of the down window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestinationStatistics {
    pub failure: Counter,
    pub success: Counter,
    pub unknown: Counter,
}

/// (failure, success) after a recorded signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub failure: u16,
    pub success: u16,
}

impl From<&DestinationStatistics> for Counts {
    fn from(stats: &DestinationStatistics) -> Self {
        Self {
            failure: stats.failure.get(),
            success: stats.success.get(),
        }
    }
}

/// Statistics for every tracked key of one address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connections(HashMap<DestinationKey, DestinationStatistics>);

impl Connections {
    /// Count a failure for `key`, clearing its success and unknown counters.
    ///
    /// A key not yet tracked is ignored once `cap` keys are tracked; the
    /// returned counts are then zero.
    pub fn failure(&mut self, key: DestinationKey, cap: usize) -> Counts {
        let at_cap = self.0.len() >= cap;
        let stats = match self.0.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(_) if at_cap => return Counts::default(),
            Entry::Vacant(entry) => entry.insert(DestinationStatistics::default()),
        };
        stats.unknown.reset();
        stats.success.reset();
        stats.failure.increment();
        Counts::from(&*stats)
    }

    /// Count a success for an already tracked `key`. Returns `None` if the key
    /// was never seen.
    pub fn success(&mut self, key: DestinationKey) -> Option<Counts> {
        let stats = self.0.get_mut(&key)?;
        stats.unknown.reset();
        stats.success.increment();
        Some(Counts::from(&*stats))
    }

    pub fn get(&self, key: &DestinationKey) -> Option<&DestinationStatistics> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &DestinationKey) -> Option<DestinationStatistics> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &DestinationKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn retain(&mut self, f: impl FnMut(&DestinationKey, &mut DestinationStatistics) -> bool) {
        self.0.retain(f);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DestinationKey, &DestinationStatistics)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-address record: reachability flag plus tracked keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationState {
    pub up: bool,
    pub connections: Connections,
}

impl DestinationState {
    /// Not up and tracking nothing. Such a state is never kept.
    pub fn is_empty(&self) -> bool {
        !self.up && self.connections.is_empty()
    }
}
