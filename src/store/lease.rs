//! Mutual-exclusion leases over the shared store.
//!
//! Every coordinator mutation is a read-modify-write against the shared
//! store, and concurrent writers would otherwise lose updates. A lease
//! serializes those cycles across all roomd processes: `SET NX PX` with a
//! random token, bounded acquisition retries, token-checked release.
//!
//! Two scopes exist. A room lease guards one room's record. A user lease
//! guards a user's entry into rooms, so the membership-policy check and
//! the entry it permits act as one step. When both are held, the user
//! lease is always acquired first.
//!
//! The release is read-then-delete without a server-side compare, so a
//! holder that outlives its TTL can delete a successor's lease. That
//! window is bounded by the TTL, and a lease is only ever held across a
//! handful of store round trips.

use super::{Store, StoreError, StoreResult};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Attempts before giving up on a contended lease.
const ACQUIRE_ATTEMPTS: u32 = 20;

/// Base delay between acquisition attempts. Each retry adds jitter.
const RETRY_BASE: Duration = Duration::from_millis(25);

/// A held lease. Must be released explicitly; the guarded critical
/// section decides success or failure independently of it.
pub struct Lease {
    store: Arc<dyn Store>,
    key: String,
    token: String,
}

fn room_key(room_id: &str) -> String {
    format!("lease:room:{room_id}")
}

fn user_key(user_id: u64) -> String {
    format!("lease:user:{user_id}")
}

impl Lease {
    /// Acquire the lease guarding one room's record.
    pub async fn room(store: Arc<dyn Store>, room_id: &str, ttl: Duration) -> StoreResult<Self> {
        Self::acquire(store, room_key(room_id), ttl).await
    }

    /// Acquire the lease guarding a user's room entries.
    pub async fn user(store: Arc<dyn Store>, user_id: u64, ttl: Duration) -> StoreResult<Self> {
        Self::acquire(store, user_key(user_id), ttl).await
    }

    /// Acquire a lease by key, retrying with jittered backoff.
    ///
    /// Fails with [`StoreError::Contended`] when the key stays locked for
    /// the whole retry budget.
    async fn acquire(store: Arc<dyn Store>, key: String, ttl: Duration) -> StoreResult<Self> {
        let token = Uuid::new_v4().to_string();

        for attempt in 0..ACQUIRE_ATTEMPTS {
            if store.set_if_absent(&key, &token, ttl).await? {
                return Ok(Self { store, key, token });
            }
            let jitter: u64 = rand::thread_rng().gen_range(0..15);
            tokio::time::sleep(RETRY_BASE + Duration::from_millis(jitter + u64::from(attempt)))
                .await;
        }

        Err(StoreError::Contended(key))
    }

    /// Release the lease if this holder still owns it.
    ///
    /// Best effort: a failure here only delays the next writer by the
    /// remaining TTL, so it is logged and swallowed.
    pub async fn release(self) {
        match self.store.get(&self.key).await {
            Ok(Some(current)) if current == self.token => {
                if let Err(e) = self.store.delete(&self.key).await {
                    warn!(key = %self.key, error = %e, "Failed to release lease");
                }
            }
            // Expired, and possibly re-acquired by another holder.
            Ok(_) => {}
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read lease on release");
            }
        }
    }
}
