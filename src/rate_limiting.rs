// ABOUTME: Request pacing per tenant/resource and coalescing of identical in-flight calls
// ABOUTME: Pure in-process synchronization; safe under concurrent invocation, no persistent state
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! # Rate Limiter & Request Coalescer
//!
//! Two cooperating pieces of in-process synchronization:
//!
//! - [`PacingLimiter`] enforces a minimum spacing between calls sharing the
//!   same `(tenant, resource)` key, plus a longer spacing when work switches
//!   to a different tenant. Waiting is per-reservation and never blocks
//!   other tenants' tasks.
//! - [`RequestCoalescer`] collapses concurrent identical requests into one
//!   underlying call: late callers attach to the leader's in-flight future
//!   and receive its result, success or failure. The entry is removed once
//!   the call resolves, so a subsequent request performs fresh work.

use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

use crate::errors::AppResult;
use crate::models::TenantId;

/// Key identifying one in-flight network call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    /// Tenant the call runs for.
    pub tenant_id: TenantId,
    /// Resource kind, e.g. `offer`.
    pub resource_kind: &'static str,
    /// Resource-specific key, e.g. a SKU.
    pub resource_key: String,
}

impl RequestKey {
    /// Build a key for one resource instance.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        resource_kind: &'static str,
        resource_key: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            resource_kind,
            resource_key: resource_key.into(),
        }
    }
}

#[derive(Debug, Default)]
struct PacingState {
    /// Earliest start reserved per `(tenant, resource)` key.
    reservations: std::collections::HashMap<(TenantId, &'static str), Instant>,
    /// Tenant of the most recent reservation, for switch spacing.
    last_tenant: Option<(TenantId, Instant)>,
}

/// Enforces minimum inter-request spacing per tenant/resource.
///
/// `acquire` reserves a start slot under a short-lived lock and then sleeps
/// outside it, so one tenant's backlog never delays another tenant's
/// reservation.
pub struct PacingLimiter {
    resource_spacing: Duration,
    tenant_switch_spacing: Duration,
    state: Mutex<PacingState>,
}

impl PacingLimiter {
    /// Create a limiter with explicit spacings.
    #[must_use]
    pub fn new(resource_spacing: Duration, tenant_switch_spacing: Duration) -> Self {
        Self {
            resource_spacing,
            tenant_switch_spacing,
            state: Mutex::new(PacingState::default()),
        }
    }

    /// Wait until a call for `(tenant, resource)` may start.
    ///
    /// Concurrent callers for the same key are serialized at
    /// `resource_spacing` intervals; switching from another tenant's work
    /// additionally waits `tenant_switch_spacing`.
    pub async fn acquire(&self, tenant_id: TenantId, resource: &'static str) {
        let now = Instant::now();
        let start = {
            let mut state = self.state.lock().await;
            let key_ready = state
                .reservations
                .get(&(tenant_id, resource))
                .map_or(now, |last| *last + self.resource_spacing);
            let tenant_ready = match state.last_tenant {
                Some((last, at)) if last != tenant_id => at + self.tenant_switch_spacing,
                _ => now,
            };
            let start = key_ready.max(tenant_ready).max(now);
            state.reservations.insert((tenant_id, resource), start);
            state.last_tenant = Some((tenant_id, start));
            start
        };

        if start > now {
            trace!(
                tenant_id = %tenant_id,
                resource,
                wait_ms = (start - now).as_millis() as u64,
                "Pacing request"
            );
            sleep_until(start).await;
        }
    }
}

type SharedCall<T> = Shared<BoxFuture<'static, AppResult<T>>>;

/// Collapses concurrent identical requests into one in-flight call.
///
/// Keyed by [`RequestKey`] (or any hashable key); values must be `Clone` so
/// every attached caller can receive the result. Errors are shared too: a
/// failed leader fails all attached callers without duplicate network work.
pub struct RequestCoalescer<K = RequestKey, T = ()>
where
    K: Eq + Hash + Clone,
{
    inflight: DashMap<K, SharedCall<T>>,
}

impl<K, T> RequestCoalescer<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty coalescer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// Number of calls currently in flight.
    #[must_use]
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Run `make()` unless an identical call is already in flight, in which
    /// case attach to it and await the shared result.
    ///
    /// The map entry is removed by the leader once the call resolves
    /// (success or failure), so a later call with the same key performs
    /// fresh work.
    ///
    /// # Errors
    ///
    /// Returns the underlying call's error, shared across all attached
    /// callers.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let (shared, leader) = match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let shared = make().boxed().shared();
                entry.insert(shared.clone());
                (shared, true)
            }
        };

        let result = shared.await;
        if leader {
            self.inflight.remove(&key);
        }
        result
    }
}

impl<K, T> Default for RequestCoalescer<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::errors::AppError;

    #[tokio::test]
    async fn coalescer_runs_identical_requests_once() {
        let coalescer: Arc<RequestCoalescer<RequestKey, u32>> = Arc::new(RequestCoalescer::new());
        let calls = Arc::new(AtomicU32::new(0));
        let tenant = TenantId::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coalescer = Arc::clone(&coalescer);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                coalescer
                    .run(RequestKey::new(tenant, "offer", "SKU-1"), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn coalescer_shares_failures() {
        let coalescer: Arc<RequestCoalescer<RequestKey, u32>> = Arc::new(RequestCoalescer::new());
        let calls = Arc::new(AtomicU32::new(0));
        let tenant = TenantId::new();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let coalescer = Arc::clone(&coalescer);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                coalescer
                    .run(RequestKey::new(tenant, "offer", "SKU-ERR"), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err::<u32, _>(AppError::unavailable("boom"))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn coalescer_entry_cleared_after_completion() {
        let coalescer: RequestCoalescer<RequestKey, u32> = RequestCoalescer::new();
        let tenant = TenantId::new();
        let key = RequestKey::new(tenant, "offer", "SKU-2");

        let first = coalescer.run(key.clone(), || async { Ok(1) }).await.unwrap();
        assert_eq!(coalescer.inflight_count(), 0);
        let second = coalescer.run(key, || async { Ok(2) }).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_spaces_same_resource() {
        let limiter = PacingLimiter::new(Duration::from_millis(300), Duration::from_millis(1500));
        let tenant = TenantId::new();

        let start = Instant::now();
        limiter.acquire(tenant, "offer").await;
        limiter.acquire(tenant, "offer").await;
        limiter.acquire(tenant, "offer").await;
        assert!(start.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_applies_tenant_switch_spacing() {
        let limiter = PacingLimiter::new(Duration::from_millis(100), Duration::from_millis(1500));
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        let start = Instant::now();
        limiter.acquire(tenant_a, "offer").await;
        limiter.acquire(tenant_b, "offer").await;
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn different_resources_do_not_block_each_other() {
        let limiter = PacingLimiter::new(Duration::from_millis(300), Duration::from_millis(1500));
        let tenant = TenantId::new();

        let start = Instant::now();
        limiter.acquire(tenant, "offer").await;
        limiter.acquire(tenant, "catalog").await;
        assert!(start.elapsed() < Duration::from_millis(300));
    }
}
