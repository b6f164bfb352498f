use hyper::header::CONTENT_TYPE;
use hyper::{Body, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::instrument;

use super::find_permitted_role;
use crate::server::context::RequestContext;
use crate::server::error::{BrokerError, BrokerResult};
use crate::server::identity::IdentityResolver;
use crate::server::metrics::{
    MetricsSink, ScopedTimer, EMPTY_ROLE, LOOKUP_ERROR, ROLE_NAME_HANDLER, SUCCESS,
};
use crate::server::roles::RoleFinder;

/// Tells a caller which role it may assume, as SDK credential chains expect
pub struct RoleNameHandler {
    identity: Arc<dyn IdentityResolver>,
    roles: Arc<dyn RoleFinder>,
    metrics: Arc<dyn MetricsSink>,
}

impl RoleNameHandler {
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        roles: Arc<dyn RoleFinder>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            identity,
            roles,
            metrics,
        }
    }

    #[instrument(skip(self, ctx, req))]
    pub async fn handle(
        &self,
        ctx: &RequestContext,
        req: &Request<Body>,
    ) -> BrokerResult<Response<Body>> {
        let _timer = ScopedTimer::start(self.metrics.as_ref(), ROLE_NAME_HANDLER);

        let identity = self.identity.resolve(req)?;
        let role = match find_permitted_role(ctx, self.roles.as_ref(), &identity).await {
            Ok(role) => role,
            Err(e) => {
                self.metrics.mark(ROLE_NAME_HANDLER, LOOKUP_ERROR);
                return Err(e);
            }
        };

        if role.is_empty() {
            self.metrics.mark(ROLE_NAME_HANDLER, EMPTY_ROLE);
            return Err(BrokerError::EmptyRole);
        }
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from(role))
            .map_err(|e| BrokerError::internal(e.to_string()))?;
        self.metrics.mark(ROLE_NAME_HANDLER, SUCCESS);
        Ok(response)
    }
}
