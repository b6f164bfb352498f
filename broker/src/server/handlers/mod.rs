pub mod credentials;
pub mod health;
pub mod role_name;

pub use credentials::CredentialsHandler;
pub use role_name::RoleNameHandler;

use super::context::RequestContext;
use super::error::{BrokerError, BrokerResult};
use super::roles::RoleFinder;

/// Look up the permitted role for `identity`, bounded by the request context.
async fn find_permitted_role(
    ctx: &RequestContext,
    roles: &dyn RoleFinder,
    identity: &str,
) -> BrokerResult<String> {
    ctx.run(roles.find_role(ctx, identity))
        .await
        .map_err(BrokerError::from)
        .and_then(|found| found)
        .map_err(|e| BrokerError::lookup(identity, e))
}
