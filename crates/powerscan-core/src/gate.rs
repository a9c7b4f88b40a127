//! Counting gate bounding how many probe connections are open at once.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Default ceiling on concurrently open probe connections.
pub const DEFAULT_MAX_TASKS: usize = 512;

/// File descriptors kept back for the standard streams and library use.
pub const RESERVE_FD_COUNT: u64 = 3;

/// Shared counting gate handed to every probe for the duration of one run.
///
/// Only intra-probe fan-out (one connection per address) takes permits;
/// the per-protocol dispatch itself is never gated.
#[derive(Debug)]
pub struct ScanGate {
    sem: Arc<Semaphore>,
    limit: usize,
}

impl ScanGate {
    /// Build a gate sized from the requested ceiling and the process's
    /// file-descriptor soft limit.
    pub fn sized(requested: Option<usize>) -> Self {
        Self::with_limit(effective_limit(requested, nofile_soft()))
    }

    pub fn with_limit(limit: usize) -> Self {
        debug!(limit, "connection gate sized");
        Self {
            sem: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Wait for a free slot. The gate is never closed while a run is live.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.sem
            .clone()
            .acquire_owned()
            .await
            .expect("scan gate closed")
    }
}

/// Compute the usable connection ceiling.
///
/// The built-in default is reduced to the file-descriptor soft limit minus
/// the reservation when that is lower. An explicit request is clamped the
/// same way, with a diagnostic, and never exceeds what the underlying
/// semaphore can represent.
pub fn effective_limit(requested: Option<usize>, nofile_soft: Option<u64>) -> usize {
    let fd_bound = nofile_soft
        .filter(|soft| *soft > RESERVE_FD_COUNT)
        .map(|soft| (soft - RESERVE_FD_COUNT) as usize);

    let mut limit = match (requested, fd_bound) {
        (Some(req), Some(bound)) if req > bound => {
            warn!(
                requested = req,
                bound, "requested connection ceiling exceeds descriptor soft limit, reducing"
            );
            bound
        }
        (Some(req), _) => req,
        (None, Some(bound)) if bound < DEFAULT_MAX_TASKS => bound,
        (None, _) => DEFAULT_MAX_TASKS,
    };

    if limit > Semaphore::MAX_PERMITS {
        warn!(
            limit,
            max = Semaphore::MAX_PERMITS,
            "reducing connection ceiling to what the gate can represent"
        );
        limit = Semaphore::MAX_PERMITS;
    }
    limit.max(1)
}

#[cfg(unix)]
fn nofile_soft() -> Option<u64> {
    rlimit::getrlimit(rlimit::Resource::NOFILE)
        .ok()
        .map(|(soft, _hard)| soft)
}

#[cfg(not(unix))]
fn nofile_soft() -> Option<u64> {
    None
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_with_ample_descriptors() {
        assert_eq!(effective_limit(None, Some(65536)), DEFAULT_MAX_TASKS);
        assert_eq!(effective_limit(None, None), DEFAULT_MAX_TASKS);
    }

    #[test]
    fn default_reduced_by_descriptor_soft_limit() {
        assert_eq!(effective_limit(None, Some(256)), 253);
    }

    #[test]
    fn explicit_request_honored_when_it_fits() {
        assert_eq!(effective_limit(Some(64), Some(65536)), 64);
        assert_eq!(effective_limit(Some(2048), None), 2048);
    }

    #[test]
    fn explicit_request_clamped_by_descriptors() {
        assert_eq!(effective_limit(Some(4096), Some(1024)), 1021);
    }

    #[test]
    fn ceiling_never_exceeds_semaphore_capacity() {
        assert_eq!(
            effective_limit(Some(usize::MAX), None),
            Semaphore::MAX_PERMITS
        );
    }

    #[test]
    fn ceiling_is_at_least_one() {
        // a soft limit at or below the reservation cannot bound anything
        assert_eq!(effective_limit(None, Some(RESERVE_FD_COUNT)), DEFAULT_MAX_TASKS);
        assert_eq!(effective_limit(None, Some(2)), DEFAULT_MAX_TASKS);
        assert_eq!(effective_limit(Some(0), None), 1);
    }

    #[tokio::test]
    async fn gate_hands_out_up_to_limit_permits() {
        let gate = ScanGate::with_limit(2);
        let first = gate.acquire().await;
        let _second = gate.acquire().await;
        assert_eq!(gate.limit(), 2);
        drop(first);
        let _third = gate.acquire().await;
    }
}
