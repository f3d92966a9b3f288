//! Per-device claim table.
//!
//! Exactly one pull operation may talk to a device at a time. Claims are
//! in-process only; a crashed holder is covered by the bounded hold time
//! rather than by any persistent state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy)]
struct Claim {
    taken_at: Instant,
    generation: u64,
}

type ClaimMap = Arc<Mutex<HashMap<i64, Claim>>>;

/// Claim table keyed by device id with a bounded hold time.
#[derive(Clone)]
pub struct DeviceLeases {
    hold: Duration,
    claims: ClaimMap,
    next_generation: Arc<AtomicU64>,
}

impl DeviceLeases {
    #[must_use]
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            claims: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Claim a device for exclusive use.
    ///
    /// # Errors
    /// Returns `ServiceError::DeviceBusy` while a live claim exists. A claim
    /// older than the hold time is reclaimed, since its holder has long
    /// exceeded every session timeout.
    pub fn claim(&self, device_id: i64, serial: &str) -> ServiceResult<LeaseGuard> {
        let mut claims = lock(&self.claims);

        match claims.get(&device_id) {
            Some(claim) if claim.taken_at.elapsed() < self.hold => {
                debug!(device_id, serial, "Lease denied, device busy");
                return Err(ServiceError::DeviceBusy {
                    serial: serial.to_string(),
                });
            }
            Some(_) => warn!(device_id, serial, "Reclaiming expired lease"),
            None => {}
        }

        // Generations are never reused across claims
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        claims.insert(
            device_id,
            Claim {
                taken_at: Instant::now(),
                generation,
            },
        );
        Ok(LeaseGuard {
            claims: Arc::clone(&self.claims),
            device_id,
            generation,
        })
    }

    /// Whether a live claim exists for the device.
    #[must_use]
    pub fn is_claimed(&self, device_id: i64) -> bool {
        lock(&self.claims)
            .get(&device_id)
            .is_some_and(|claim| claim.taken_at.elapsed() < self.hold)
    }
}

fn lock(claims: &ClaimMap) -> MutexGuard<'_, HashMap<i64, Claim>> {
    // Claim state stays usable even if a holder panicked mid-insert
    claims.lock().unwrap_or_else(|e| e.into_inner())
}

/// Releases the claim on drop.
///
/// The generation ties the guard to the exact claim it was issued for. A
/// guard that outlived its hold time and was reclaimed by another caller
/// must not release the new holder's claim when it finally drops.
pub struct LeaseGuard {
    claims: ClaimMap,
    device_id: i64,
    generation: u64,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let mut claims = lock(&self.claims);
        if claims
            .get(&self.device_id)
            .is_some_and(|claim| claim.generation == self.generation)
        {
            claims.remove(&self.device_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_and_release() {
        let leases = DeviceLeases::new(Duration::from_secs(120));

        let guard = leases.claim(1, "SN001").unwrap();
        assert!(leases.is_claimed(1));
        assert!(matches!(
            leases.claim(1, "SN001"),
            Err(ServiceError::DeviceBusy { .. })
        ));

        drop(guard);
        assert!(!leases.is_claimed(1));
        assert!(leases.claim(1, "SN001").is_ok());
    }

    #[test]
    fn test_claims_are_per_device() {
        let leases = DeviceLeases::new(Duration::from_secs(120));
        let _first = leases.claim(1, "SN001").unwrap();
        assert!(leases.claim(2, "SN002").is_ok());
    }

    #[test]
    fn test_expired_claim_is_reclaimable() {
        let leases = DeviceLeases::new(Duration::from_millis(0));
        let _stuck = leases.claim(1, "SN001").unwrap();

        // Hold time of zero means the first claim is immediately stale
        assert!(leases.claim(1, "SN001").is_ok());
    }

    #[test]
    fn test_stale_guard_drop_keeps_successor_claim() {
        let leases = DeviceLeases::new(Duration::from_millis(10));

        let stale = leases.claim(1, "SN001").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        // Second caller reclaims the expired lease and is still working
        // when the original guard finally drops
        let _successor = leases.claim(1, "SN001").unwrap();
        drop(stale);

        assert!(leases.is_claimed(1));
        assert!(matches!(
            leases.claim(1, "SN001"),
            Err(ServiceError::DeviceBusy { .. })
        ));
    }

    #[test]
    fn test_stale_guard_drop_after_successor_released() {
        let leases = DeviceLeases::new(Duration::from_millis(10));

        let stale = leases.claim(1, "SN001").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let successor = leases.claim(1, "SN001").unwrap();
        drop(successor);
        drop(stale);

        assert!(!leases.is_claimed(1));
    }
}
