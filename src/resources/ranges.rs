use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed interval of ports, `begin..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRange {
    pub begin: u64,
    pub end: u64,
}

impl PortRange {
    #[must_use]
    pub const fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.begin).saturating_add(1)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end < self.begin
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}]", self.begin, self.end)
    }
}

/// Compresses a sorted, deduplicated port sequence into the minimal set of
/// closed intervals. Consecutive values always merge into one interval.
#[must_use]
pub fn compress(ports: &[u64]) -> Vec<PortRange> {
    ports.iter().fold(Vec::new(), |mut ranges: Vec<PortRange>, &port| {
        match ranges.last_mut() {
            Some(last) if last.end.checked_add(1) == Some(port) => last.end = port,
            Some(last) if last.end == port => {}
            _ => ranges.push(PortRange::new(port, port)),
        }
        ranges
    })
}

/// Expands closed intervals back into a flat port sequence.
#[must_use]
pub fn expand(ranges: &[PortRange]) -> Vec<u64> {
    ranges
        .iter()
        .filter(|range| !range.is_empty())
        .flat_map(|range| range.begin..=range.end)
        .collect()
}

/// Picks `count` ports out of a sorted pool, preferring the first contiguous
/// run that is long enough and falling back to the lowest ports.
/// Returns `None` when the pool is too small.
#[must_use]
pub fn select(ports: &[u64], count: usize) -> Option<Vec<u64>> {
    if count == 0 {
        return Some(Vec::new());
    }
    if ports.len() < count {
        return None;
    }

    let contiguous = compress(ports)
        .into_iter()
        .find(|range| usize::try_from(range.len()).is_ok_and(|len| len >= count))
        .map(|range| (range.begin..).take(count).collect::<Vec<_>>());

    Some(contiguous.unwrap_or_else(|| ports.iter().copied().take(count).collect()))
}
