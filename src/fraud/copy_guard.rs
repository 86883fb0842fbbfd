// Copy-protection guard
//
// Tracks, per token, which verifying contexts currently hold it. Each
// registration expires after the TTL. Expired registrations are dropped on
// every access and, optionally, by a background sweep task.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::primitives::{Clock, FieldElement, Policy, Result, TicketError, Timestamp};

pub struct CopyProtectionGuard {
    ttl_ms: i64,
    conflict_threshold: usize,
    /// token -> context id -> expiry
    registrations: Mutex<HashMap<FieldElement, HashMap<String, Timestamp>>>,
}

impl Default for CopyProtectionGuard {
    fn default() -> Self {
        Self::new(Policy::COPY_PROTECTION_TTL_MS, Policy::COPY_CONFLICT_THRESHOLD)
    }
}

impl CopyProtectionGuard {
    /// `conflict_threshold` is the number of other live contexts at which a
    /// new context is refused; values below 1 are treated as 1
    pub fn new(ttl_ms: i64, conflict_threshold: usize) -> Self {
        Self {
            ttl_ms,
            conflict_threshold: conflict_threshold.max(1),
            registrations: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    /// Register `context_id` for `token`. The same context always passes and
    /// has its TTL refreshed. A new context is refused while enough other
    /// contexts still hold the token.
    pub async fn check_copy_protection(
        &self,
        token: &FieldElement,
        context_id: &str,
        now: Timestamp,
    ) -> Result<()> {
        let mut registrations = self.registrations.lock().await;
        let contexts = registrations.entry(*token).or_default();
        contexts.retain(|_, expiry| *expiry > now);

        if !contexts.contains_key(context_id) {
            let others = contexts.len();
            if others >= self.conflict_threshold {
                warn!(
                    "⚠️  Possible copy of token {}: {} refused, {} other active context(s)",
                    token, context_id, others
                );
                return Err(TicketError::CopyConflict);
            }
        }

        contexts.insert(context_id.to_string(), now + self.ttl_ms);
        Ok(())
    }

    /// Contexts holding `token` at `now`
    pub async fn active_contexts(&self, token: &FieldElement, now: Timestamp) -> Vec<String> {
        let registrations = self.registrations.lock().await;
        registrations
            .get(token)
            .map(|contexts| {
                contexts
                    .iter()
                    .filter(|(_, expiry)| **expiry > now)
                    .map(|(context, _)| context.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every registration for a torn-down token
    pub async fn release(&self, token: &FieldElement) -> bool {
        self.registrations.lock().await.remove(token).is_some()
    }

    /// Drop expired registrations; returns how many were removed
    pub async fn sweep(&self, now: Timestamp) -> usize {
        let mut registrations = self.registrations.lock().await;
        let mut removed = 0;
        registrations.retain(|_, contexts| {
            let before = contexts.len();
            contexts.retain(|_, expiry| *expiry > now);
            removed += before - contexts.len();
            !contexts.is_empty()
        });
        removed
    }

    pub async fn clear(&self) {
        self.registrations.lock().await.clear();
    }

    pub async fn token_count(&self) -> usize {
        self.registrations.lock().await.len()
    }

    /// Periodically sweep expired registrations. The task stops when the
    /// returned handle is dropped or the guard itself is gone.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, clock: Arc<dyn Clock>) -> SweeperHandle {
        let guard: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(live) = guard.upgrade() else { break };
                let removed = live.sweep(clock.now_ms()).await;
                if removed > 0 {
                    debug!("🧹 Swept {} expired copy-protection registration(s)", removed);
                }
            }
        });

        SweeperHandle { task }
    }
}

/// Owns the sweep task; dropping it cancels the timer
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::ManualClock;

    const MINUTE: i64 = 60 * 1000;

    fn token() -> FieldElement {
        FieldElement::from_u64(77)
    }

    #[tokio::test]
    async fn test_same_context_repeats() {
        let guard = CopyProtectionGuard::default();
        for i in 0..20 {
            assert!(guard.check_copy_protection(&token(), "X", i * MINUTE).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_second_context_refused_while_first_active() {
        let guard = CopyProtectionGuard::default();
        guard.check_copy_protection(&token(), "X", 0).await.unwrap();

        let result = guard.check_copy_protection(&token(), "Y", MINUTE).await;
        assert_eq!(result, Err(TicketError::CopyConflict));

        // X is still fine
        assert!(guard.check_copy_protection(&token(), "X", 2 * MINUTE).await.is_ok());
    }

    #[tokio::test]
    async fn test_second_context_after_expiry() {
        let guard = CopyProtectionGuard::default();
        guard.check_copy_protection(&token(), "X", 0).await.unwrap();

        assert!(guard.check_copy_protection(&token(), "Y", 5 * MINUTE).await.is_ok());
        assert_eq!(guard.active_contexts(&token(), 5 * MINUTE).await, vec!["Y".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_extends_ttl() {
        let guard = CopyProtectionGuard::default();
        guard.check_copy_protection(&token(), "X", 0).await.unwrap();
        guard.check_copy_protection(&token(), "X", 4 * MINUTE).await.unwrap();

        assert!(guard.check_copy_protection(&token(), "Y", 6 * MINUTE).await.is_err());
        assert!(guard.check_copy_protection(&token(), "Y", 9 * MINUTE).await.is_ok());
    }

    #[tokio::test]
    async fn test_legacy_threshold() {
        let guard = CopyProtectionGuard::new(5 * MINUTE, 11);
        for i in 0..11 {
            let ctx = format!("ctx-{}", i);
            assert!(guard.check_copy_protection(&token(), &ctx, 0).await.is_ok());
        }
        assert!(guard.check_copy_protection(&token(), "ctx-11", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_tokens_are_independent() {
        let guard = CopyProtectionGuard::default();
        guard.check_copy_protection(&token(), "X", 0).await.unwrap();
        assert!(guard
            .check_copy_protection(&FieldElement::from_u64(78), "Y", 0)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_release_and_sweep() {
        let guard = CopyProtectionGuard::default();
        guard.check_copy_protection(&token(), "X", 0).await.unwrap();
        guard.check_copy_protection(&FieldElement::from_u64(1), "X", 0).await.unwrap();

        assert!(guard.release(&token()).await);
        assert!(guard.check_copy_protection(&token(), "Y", MINUTE).await.is_ok());

        assert_eq!(guard.sweep(10 * MINUTE).await, 2);
        assert_eq!(guard.token_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_and_stops_on_drop() {
        let guard = Arc::new(CopyProtectionGuard::default());
        let clock = Arc::new(ManualClock::new(0));
        guard.check_copy_protection(&token(), "X", 0).await.unwrap();

        let handle = guard.spawn_sweeper(Duration::from_secs(60), clock.clone());
        clock.set(10 * MINUTE);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(guard.token_count().await, 0);

        drop(handle);
        tokio::task::yield_now().await;
        guard.check_copy_protection(&token(), "X", 10 * MINUTE).await.unwrap();
        clock.set(100 * MINUTE);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(guard.token_count().await, 1);
    }
}
