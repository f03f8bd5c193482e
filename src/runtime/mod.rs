//! IsolatedRuntime (C5) — executes a single self-contained unit of work
//! (one `Interpreter::run` call, never raw user code — see the "isolated VM
//! escape hatch" design note) under a `SecurityProfile`.
//!
//! The teacher's nearest analog is `modules/runtime.rs::ModuleRuntime`, which
//! owns a `HashMap<String, ActiveModule>` plus a `PolicyEngine`/`RbacManager`
//! pair; this runtime instead owns a bounded worker pool and enforces the
//! resource ceilings directly, since there is no user code to sandbox beyond
//! the fixed step set.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::error::EngineError;
use crate::security_profile::{has_capability, CapabilityMask, SecurityProfile};

/// Bounds the worker pool: `min_pool <= live workers <= max_pool`. Idle
/// workers beyond `min_pool` that exceed `idle_timeout` are released —
/// modeled here as permits released back to a semaphore rather than actual
/// OS threads, since the "worker" unit of work is an async task.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub min_pool: usize,
    pub max_pool: usize,
    pub idle_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool: 5,
            max_pool: 100,
            idle_timeout_ms: 30_000,
        }
    }
}

pub struct IsolatedRuntime {
    semaphore: Arc<Semaphore>,
    config: PoolConfig,
    in_flight: AtomicUsize,
}

impl IsolatedRuntime {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_pool)),
            config,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Refuse a required capability this profile does not grant, without
    /// running the unit at all.
    pub fn require_capability(
        profile: &SecurityProfile,
        required: CapabilityMask,
    ) -> Result<(), EngineError> {
        if has_capability(profile.capability_mask, required) {
            Ok(())
        } else {
            Err(EngineError::CapabilityDenied {
                capability: crate::security_profile::capability_name(required).to_string(),
            })
        }
    }

    /// Runs `unit` under `profile`'s wall-clock ceiling, drawing one worker
    /// from the bounded pool. Fails fast with `PoolExhausted` when the pool
    /// is at `max_pool` rather than queuing unboundedly.
    pub async fn execute<F, T>(&self, profile: SecurityProfile, unit: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        let permit = self
            .semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| EngineError::PoolExhausted)?;
        self.in_flight.fetch_add(1, Ordering::Relaxed);

        let result = timeout(
            std::time::Duration::from_millis(profile.wall_clock_ms),
            unit,
        )
        .await;

        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        drop(permit);

        match result {
            Ok(inner) => inner,
            Err(_elapsed) => Err(EngineError::Timeout),
        }
    }
}

impl Default for IsolatedRuntime {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security_profile::{CAP_NET_AI, ULTRA_SECURE};

    #[tokio::test]
    async fn runs_unit_to_completion_within_deadline() {
        let runtime = IsolatedRuntime::default();
        let result = runtime
            .execute(ULTRA_SECURE, async { Ok::<_, EngineError>(42) })
            .await
            .unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn cancels_unit_that_stalls_past_deadline() {
        let mut profile = ULTRA_SECURE;
        profile.wall_clock_ms = 20;
        let runtime = IsolatedRuntime::default();
        let result: Result<(), EngineError> = runtime
            .execute(profile, async {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(EngineError::Timeout)));
    }

    #[test]
    fn denies_unavailable_capability() {
        let err = IsolatedRuntime::require_capability(&ULTRA_SECURE, CAP_NET_AI).unwrap_err();
        assert!(matches!(err, EngineError::CapabilityDenied { .. }));
    }

    #[tokio::test]
    async fn pool_exhaustion_fails_fast() {
        let runtime = Arc::new(IsolatedRuntime::new(PoolConfig {
            min_pool: 1,
            max_pool: 1,
            idle_timeout_ms: 1000,
        }));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let r2 = runtime.clone();
        let handle = tokio::spawn(async move {
            r2.execute(ULTRA_SECURE, async {
                let _ = rx.await;
                Ok::<_, EngineError>(())
            })
            .await
        });
        // Give the first task a chance to acquire its permit.
        tokio::task::yield_now().await;
        let second = runtime
            .execute(ULTRA_SECURE, async { Ok::<_, EngineError>(()) })
            .await;
        assert!(matches!(second, Err(EngineError::PoolExhausted)));
        let _ = tx.send(());
        let _ = handle.await;
    }
}
