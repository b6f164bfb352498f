use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::context::RequestContext;
use super::error::BrokerResult;

/// Resolves the single role an identity is permitted to assume
#[async_trait]
pub trait RoleFinder: Send + Sync {
    /// Returns the permitted role, or an empty string when the identity is unmapped
    async fn find_role(&self, ctx: &RequestContext, identity: &str) -> BrokerResult<String>;
}

/// Role mappings held in memory, seeded from configuration
#[derive(Clone, Default)]
pub struct StaticRoleFinder {
    roles: Arc<RwLock<HashMap<String, String>>>,
}

impl StaticRoleFinder {
    pub fn new(roles: HashMap<String, String>) -> Self {
        info!("Loaded {} role mappings", roles.len());
        Self {
            roles: Arc::new(RwLock::new(roles)),
        }
    }

    /// Swap in a complete new set of mappings
    pub async fn replace(&self, roles: HashMap<String, String>) {
        let mut current = self.roles.write().await;
        info!(
            "Replacing {} role mappings with {}",
            current.len(),
            roles.len()
        );
        *current = roles;
    }
}

#[async_trait]
impl RoleFinder for StaticRoleFinder {
    async fn find_role(&self, ctx: &RequestContext, identity: &str) -> BrokerResult<String> {
        let roles = ctx.run(self.roles.read()).await?;
        let role = roles.get(identity).cloned().unwrap_or_default();
        debug!("Identity {} maps to role {:?}", identity, role);
        Ok(role)
    }
}
