use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::context::RequestContext;
use super::credentials::CredentialsProvider;
use super::handlers::{CredentialsHandler, RoleNameHandler};
use super::identity::IdentityResolver;
use super::metrics::PrometheusMetrics;
use super::roles::RoleFinder;
use super::status::{error_response, respond};
use crate::common::routing::{match_route, Route, RoleParam};

/// Metadata API plus internal health and metrics endpoints
#[derive(Clone)]
pub struct BrokerService {
    pub server_instance_id: Uuid,
    pub started_at: SystemTime,

    pub credentials_handler: Arc<CredentialsHandler>,
    pub role_name_handler: Arc<RoleNameHandler>,
    pub metrics: Arc<PrometheusMetrics>,
    request_timeout: Duration,
}

impl BrokerService {
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        roles: Arc<dyn RoleFinder>,
        credentials: Arc<dyn CredentialsProvider>,
        metrics: Arc<PrometheusMetrics>,
        request_timeout: Duration,
    ) -> Self {
        let credentials_handler = Arc::new(CredentialsHandler::new(
            identity.clone(),
            roles.clone(),
            credentials,
            metrics.clone(),
        ));
        let role_name_handler = Arc::new(RoleNameHandler::new(identity, roles, metrics.clone()));

        Self {
            server_instance_id: Uuid::new_v4(),
            started_at: SystemTime::now(),
            credentials_handler,
            role_name_handler,
            metrics,
            request_timeout,
        }
    }

    #[instrument(skip(self, req), fields(method = %req.method(), path = %req.uri().path()))]
    pub async fn handle_metadata_request(
        &self,
        mut req: Request<Body>,
    ) -> Result<Response<Body>, Infallible> {
        if req.method() != Method::GET {
            return Ok(error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "Method Not Allowed",
            ));
        }

        // Cancelled when this request finishes or is dropped.
        let (ctx, _cancel) = RequestContext::with_timeout(self.request_timeout);

        let response = match match_route(req.uri().path()) {
            Route::Credentials { role } => {
                req.extensions_mut().insert(RoleParam(role));
                respond(self.credentials_handler.handle(&ctx, &req).await)
            }
            Route::RoleName => respond(self.role_name_handler.handle(&ctx, &req).await),
            Route::NotFound => {
                debug!("No route for {}", req.uri().path());
                error_response(StatusCode::NOT_FOUND, "Not Found")
            }
        };

        Ok(response)
    }
}
