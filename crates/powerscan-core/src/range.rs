//! IP address ranges, the scan range registry, and the two-slot pending
//! buffer that turns interleaved start/end CLI options into ranges.

use std::fmt;
use std::net::IpAddr;

use tracing::{debug, warn};

/// An inclusive address range. A single address is a range whose endpoints
/// are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    pub start: IpAddr,
    pub end: IpAddr,
}

impl AddressRange {
    pub fn new(start: IpAddr, end: IpAddr) -> Self {
        Self { start, end }
    }

    pub fn single(addr: IpAddr) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    /// Iterate every address in the range, start to end inclusive.
    ///
    /// A reversed range yields nothing. Endpoints of different address
    /// families cannot be interpolated between; such a range yields just
    /// the two endpoints, with a diagnostic.
    pub fn hosts(&self) -> RangeHosts {
        let state = match (self.start, self.end) {
            (IpAddr::V4(s), IpAddr::V4(e)) => {
                let (s, e) = (u32::from(s), u32::from(e));
                if s > e {
                    warn!(range = %self, "reversed address range, nothing to scan");
                    HostsState::Done
                } else {
                    HostsState::V4 { next: Some(s), end: e }
                }
            }
            (IpAddr::V6(s), IpAddr::V6(e)) => {
                let (s, e) = (u128::from(s), u128::from(e));
                if s > e {
                    warn!(range = %self, "reversed address range, nothing to scan");
                    HostsState::Done
                } else {
                    HostsState::V6 { next: Some(s), end: e }
                }
            }
            (s, e) => {
                warn!(range = %self, "mixed-family address range, scanning endpoints only");
                HostsState::Endpoints(Some(s), Some(e))
            }
        };
        RangeHosts { state }
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "[{}]", self.start)
        } else {
            write!(f, "[{} .. {}]", self.start, self.end)
        }
    }
}

enum HostsState {
    V4 { next: Option<u32>, end: u32 },
    V6 { next: Option<u128>, end: u128 },
    Endpoints(Option<IpAddr>, Option<IpAddr>),
    Done,
}

/// Iterator over the addresses of an [`AddressRange`].
pub struct RangeHosts {
    state: HostsState,
}

impl Iterator for RangeHosts {
    type Item = IpAddr;

    fn next(&mut self) -> Option<IpAddr> {
        match &mut self.state {
            HostsState::V4 { next, end } => {
                let cur = (*next)?;
                *next = if cur == *end { None } else { Some(cur + 1) };
                Some(IpAddr::V4(cur.into()))
            }
            HostsState::V6 { next, end } => {
                let cur = (*next)?;
                *next = if cur == *end { None } else { Some(cur + 1) };
                Some(IpAddr::V6(cur.into()))
            }
            HostsState::Endpoints(first, second) => first.take().or_else(|| second.take()),
            HostsState::Done => None,
        }
    }
}

/// Insertion-ordered collection of the ranges a scan run will walk.
///
/// Built once while options are processed, then shared read-only with the
/// probes. Ranges are never reordered or coalesced.
#[derive(Debug, Default)]
pub struct RangeRegistry {
    ranges: Vec<AddressRange>,
}

impl RangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a range from optional endpoints, returning the new count.
    ///
    /// With both endpoints absent nothing is recorded. A missing endpoint
    /// is substituted with the present one, so a lone start or end becomes
    /// a single-address range.
    pub fn add(&mut self, start: Option<IpAddr>, end: Option<IpAddr>) -> usize {
        let range = match (start, end) {
            (None, None) => {
                debug!("no addresses provided, not recording a range");
                return self.ranges.len();
            }
            (Some(s), None) => {
                debug!(start = %s, "no end address, scanning single address");
                AddressRange::single(s)
            }
            (None, Some(e)) => {
                debug!(end = %e, "no start address, scanning single address");
                AddressRange::single(e)
            }
            (Some(s), Some(e)) => AddressRange::new(s, e),
        };
        self.push(range)
    }

    /// Append an already-built range, returning the new count.
    pub fn push(&mut self, range: AddressRange) -> usize {
        self.ranges.push(range);
        debug!(range = %range, count = self.ranges.len(), "recorded address range");
        self.ranges.len()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AddressRange> {
        self.ranges.iter()
    }
}

/// Two-slot buffer replaying start/end options in their command-line order.
///
/// Setting a slot that is already occupied first flushes the buffer as a
/// range; once both slots are occupied the pair is flushed immediately.
/// Anything still pending when options run out is flushed as a
/// single-address range.
#[derive(Debug, Default)]
pub struct PendingRange {
    start: Option<IpAddr>,
    end: Option<IpAddr>,
}

impl PendingRange {
    pub fn set_start(&mut self, addr: IpAddr, registry: &mut RangeRegistry) {
        if self.start.is_some() {
            self.flush(registry);
        }
        self.start = Some(addr);
        if self.end.is_some() {
            self.flush(registry);
        }
    }

    pub fn set_end(&mut self, addr: IpAddr, registry: &mut RangeRegistry) {
        if self.end.is_some() {
            self.flush(registry);
        }
        self.end = Some(addr);
        if self.start.is_some() {
            self.flush(registry);
        }
    }

    /// Flush whatever is buffered, if anything.
    pub fn flush(&mut self, registry: &mut RangeRegistry) {
        if self.start.is_some() || self.end.is_some() {
            registry.add(self.start.take(), self.end.take());
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn ranges(registry: &RangeRegistry) -> Vec<(IpAddr, IpAddr)> {
        registry.iter().map(|r| (r.start, r.end)).collect()
    }

    #[test]
    fn add_with_no_endpoints_is_a_noop() {
        let mut registry = RangeRegistry::new();
        assert_eq!(registry.add(None, None), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_endpoint_becomes_single_address() {
        let mut registry = RangeRegistry::new();
        registry.add(Some(ip("10.0.0.1")), None);
        registry.add(None, Some(ip("10.0.0.9")));
        assert_eq!(
            ranges(&registry),
            vec![
                (ip("10.0.0.1"), ip("10.0.0.1")),
                (ip("10.0.0.9"), ip("10.0.0.9")),
            ]
        );
    }

    #[test]
    fn pending_start_start_end_sequence() {
        // start A, start B, end C => {A,A} then {B,C}
        let mut registry = RangeRegistry::new();
        let mut pending = PendingRange::default();
        pending.set_start(ip("192.0.2.1"), &mut registry);
        pending.set_start(ip("192.0.2.10"), &mut registry);
        pending.set_end(ip("192.0.2.20"), &mut registry);
        pending.flush(&mut registry);
        assert_eq!(
            ranges(&registry),
            vec![
                (ip("192.0.2.1"), ip("192.0.2.1")),
                (ip("192.0.2.10"), ip("192.0.2.20")),
            ]
        );
    }

    #[test]
    fn pending_end_before_start_pairs_up() {
        let mut registry = RangeRegistry::new();
        let mut pending = PendingRange::default();
        pending.set_end(ip("192.0.2.20"), &mut registry);
        pending.set_start(ip("192.0.2.10"), &mut registry);
        pending.flush(&mut registry);
        assert_eq!(
            ranges(&registry),
            vec![(ip("192.0.2.10"), ip("192.0.2.20"))]
        );
    }

    #[test]
    fn pending_lone_end_flushes_as_single() {
        let mut registry = RangeRegistry::new();
        let mut pending = PendingRange::default();
        pending.set_end(ip("192.0.2.20"), &mut registry);
        pending.flush(&mut registry);
        pending.flush(&mut registry); // second flush has nothing to do
        assert_eq!(
            ranges(&registry),
            vec![(ip("192.0.2.20"), ip("192.0.2.20"))]
        );
    }

    #[test]
    fn hosts_iterates_inclusive_v4() {
        let range = AddressRange::new(ip("192.0.2.1"), ip("192.0.2.3"));
        let hosts: Vec<_> = range.hosts().collect();
        assert_eq!(hosts, vec![ip("192.0.2.1"), ip("192.0.2.2"), ip("192.0.2.3")]);
    }

    #[test]
    fn hosts_single_address() {
        let range = AddressRange::single(ip("2001:db8::1"));
        let hosts: Vec<_> = range.hosts().collect();
        assert_eq!(hosts, vec![ip("2001:db8::1")]);
    }

    #[test]
    fn hosts_reversed_range_is_empty() {
        let range = AddressRange::new(ip("192.0.2.9"), ip("192.0.2.1"));
        assert_eq!(range.hosts().count(), 0);
    }

    #[test]
    fn hosts_iterates_v6() {
        let range = AddressRange::new(ip("2001:db8::1"), ip("2001:db8::3"));
        let hosts: Vec<_> = range.hosts().collect();
        assert_eq!(
            hosts,
            vec![ip("2001:db8::1"), ip("2001:db8::2"), ip("2001:db8::3")]
        );
    }

    #[test]
    fn hosts_mixed_family_yields_endpoints() {
        let range = AddressRange::new(ip("192.0.2.1"), ip("2001:db8::1"));
        let hosts: Vec<_> = range.hosts().collect();
        assert_eq!(hosts, vec![ip("192.0.2.1"), ip("2001:db8::1")]);
    }

    #[test]
    fn registry_preserves_insertion_order() {
        let mut registry = RangeRegistry::new();
        registry.add(Some(ip("10.0.0.1")), Some(ip("10.0.0.5")));
        registry.add(Some(ip("172.16.0.1")), Some(ip("172.16.0.9")));
        registry.add(Some(ip("192.168.1.1")), None);
        assert_eq!(registry.len(), 3);
        assert_eq!(
            ranges(&registry),
            vec![
                (ip("10.0.0.1"), ip("10.0.0.5")),
                (ip("172.16.0.1"), ip("172.16.0.9")),
                (ip("192.168.1.1"), ip("192.168.1.1")),
            ]
        );
    }
}
