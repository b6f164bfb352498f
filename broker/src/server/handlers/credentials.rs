use hyper::header::CONTENT_TYPE;
use hyper::{Body, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::find_permitted_role;
use crate::common::routing::{validate_query, RoleParam};
use crate::server::context::RequestContext;
use crate::server::credentials::CredentialsProvider;
use crate::server::error::{BrokerError, BrokerResult};
use crate::server::identity::IdentityResolver;
use crate::server::metrics::{
    MetricsSink, ScopedTimer, CREDENTIALS_HANDLER, EMPTY_ROLE, LOOKUP_ERROR, SUCCESS,
};
use crate::server::roles::RoleFinder;

/// Serves credentials for the routed role, but only to callers permitted to assume it
pub struct CredentialsHandler {
    identity: Arc<dyn IdentityResolver>,
    roles: Arc<dyn RoleFinder>,
    credentials: Arc<dyn CredentialsProvider>,
    metrics: Arc<dyn MetricsSink>,
}

impl CredentialsHandler {
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        roles: Arc<dyn RoleFinder>,
        credentials: Arc<dyn CredentialsProvider>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            identity,
            roles,
            credentials,
            metrics,
        }
    }

    /// Runs the authorization pipeline for one request.
    ///
    /// Nothing is produced for the caller unless every check passes and the
    /// credentials encode; failures carry their status via
    /// [`BrokerError::status_code`].
    #[instrument(skip(self, ctx, req), fields(path = %req.uri().path()))]
    pub async fn handle(
        &self,
        ctx: &RequestContext,
        req: &Request<Body>,
    ) -> BrokerResult<Response<Body>> {
        let _timer = ScopedTimer::start(self.metrics.as_ref(), CREDENTIALS_HANDLER);

        validate_query(req.uri().query()).map_err(BrokerError::bad_request)?;

        let identity = self.identity.resolve(req)?;

        let permitted = match find_permitted_role(ctx, self.roles.as_ref(), &identity).await {
            Ok(role) => role,
            Err(e) => {
                self.metrics.mark(CREDENTIALS_HANDLER, LOOKUP_ERROR);
                return Err(e);
            }
        };

        let requested = req
            .extensions()
            .get::<RoleParam>()
            .map(|RoleParam(role)| role.as_str())
            .unwrap_or_default();
        if requested.is_empty() {
            return Err(BrokerError::NoRoleSpecified);
        }

        if permitted.is_empty() {
            self.metrics.mark(CREDENTIALS_HANDLER, EMPTY_ROLE);
            return Err(BrokerError::EmptyRole);
        }

        if permitted != requested {
            return Err(BrokerError::forbidden(requested, permitted));
        }

        let credentials = ctx
            .run(self.credentials.credentials_for_role(ctx, requested))
            .await
            .map_err(BrokerError::from)
            .and_then(|fetched| fetched)
            .map_err(|e| BrokerError::credential_fetch(requested, e))?;

        if let Some(err) = ctx.err() {
            return Err(BrokerError::credential_fetch(requested, err.into()));
        }

        let body = serde_json::to_vec(&credentials)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|e| BrokerError::internal(e.to_string()))?;

        debug!("Issued credentials for {} to {}", requested, identity);
        self.metrics.mark(CREDENTIALS_HANDLER, SUCCESS);
        Ok(response)
    }
}
