use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::context::RequestContext;
use super::error::{BrokerError, BrokerResult};
use crate::common::Credentials;

/// Supplies credentials for a role that has already been authorized
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn credentials_for_role(
        &self,
        ctx: &RequestContext,
        role: &str,
    ) -> BrokerResult<Credentials>;
}

/// Mints fresh credentials for a role from the upstream identity service
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(&self, role: &str) -> BrokerResult<Credentials>;
}

/// Cached credentials for one role plus when a request last asked for them
#[derive(Default)]
struct Slot {
    credentials: Mutex<Option<Credentials>>,
    // Milliseconds since the provider's epoch.
    last_used: AtomicU64,
}

/// Caches assumed-role credentials per role.
///
/// Each role has its own async mutex, so concurrent requests for the same role
/// wait on a single upstream call while other roles proceed independently.
/// Roles nobody has requested for `idle_timeout` are dropped by the refresher
/// instead of being renewed.
pub struct CachingCredentialsProvider {
    assumer: Arc<dyn RoleAssumer>,
    slots: RwLock<HashMap<String, Arc<Slot>>>,
    refresh_window: chrono::Duration,
    idle_timeout: Duration,
    epoch: Instant,
}

impl CachingCredentialsProvider {
    pub fn new(
        assumer: Arc<dyn RoleAssumer>,
        refresh_window: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            assumer,
            slots: RwLock::new(HashMap::new()),
            refresh_window: to_chrono(refresh_window),
            idle_timeout,
            epoch: Instant::now(),
        }
    }

    /// The slot for `role`, marked as used now.
    async fn slot(&self, role: &str) -> Arc<Slot> {
        if let Some(slot) = self.slots.read().await.get(role) {
            self.touch(slot);
            return slot.clone();
        }
        let mut slots = self.slots.write().await;
        let slot = slots.entry(role.to_string()).or_default();
        self.touch(slot);
        slot.clone()
    }

    fn touch(&self, slot: &Slot) {
        let now = self.epoch.elapsed().as_millis() as u64;
        slot.last_used.store(now, Ordering::Relaxed);
    }

    fn idle_for(&self, slot: &Slot) -> Duration {
        let last_used = Duration::from_millis(slot.last_used.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last_used)
    }

    async fn cached_or_assume(
        &self,
        slot: &Slot,
        role: &str,
        window: chrono::Duration,
    ) -> BrokerResult<Credentials> {
        let mut cached = slot.credentials.lock().await;
        if let Some(credentials) = cached.as_ref() {
            if credentials.valid_for(Utc::now(), window) {
                return Ok(credentials.clone());
            }
            debug!("Cached credentials for {} are expiring", role);
        }

        let credentials = self.assumer.assume_role(role).await?;
        info!(
            "Assumed role {}, credentials expire at {}",
            role, credentials.expiration
        );
        *cached = Some(credentials.clone());
        Ok(credentials)
    }

    /// Re-assume every cached role whose credentials expire within `lookahead`,
    /// after forgetting roles that have gone unrequested for `idle_timeout`.
    pub async fn refresh_expiring(&self, lookahead: Duration) {
        let lookahead = to_chrono(lookahead);
        let slots: Vec<(String, Arc<Slot>)> = {
            let mut slots = self.slots.write().await;
            slots.retain(|role, slot| {
                let idle = self.idle_for(slot);
                if idle > self.idle_timeout {
                    info!("Dropping credentials for {}, unused for {:?}", role, idle);
                    return false;
                }
                true
            });
            slots
                .iter()
                .map(|(role, slot)| (role.clone(), slot.clone()))
                .collect()
        };

        for (role, slot) in slots {
            if let Err(e) = self.cached_or_assume(&slot, &role, lookahead).await {
                warn!("Failed to refresh credentials for {}: {}", role, e);
            }
        }
    }

    /// Periodically refresh credentials before requests would find them stale.
    pub fn spawn_refresher(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        let lookahead = every + self.refresh_window.to_std().unwrap_or_default();
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.refresh_expiring(lookahead).await;
            }
        })
    }
}

#[async_trait]
impl CredentialsProvider for CachingCredentialsProvider {
    async fn credentials_for_role(
        &self,
        ctx: &RequestContext,
        role: &str,
    ) -> BrokerResult<Credentials> {
        if role.is_empty() {
            return Err(BrokerError::NoRoleSpecified);
        }
        let slot = self.slot(role).await;
        ctx.run(self.cached_or_assume(&slot, role, self.refresh_window))
            .await?
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(3650))
}
