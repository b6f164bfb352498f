use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Response, StatusCode};
use tracing::{debug, error, warn};

use super::error::BrokerResult;

/// Turns a handler result into the response written to the caller.
///
/// Errors become their status code plus the error text; nothing else from a
/// failed handler reaches the caller.
pub fn respond(result: BrokerResult<Response<Body>>) -> Response<Body> {
    match result {
        Ok(response) => response,
        Err(e) => {
            let status = e.status_code();
            if e.is_context() {
                warn!(status = status.as_u16(), "Request abandoned: {}", e);
            } else if e.is_empty_role() {
                debug!(status = status.as_u16(), "No role mapped for caller");
            } else if status.is_server_error() {
                error!(status = status.as_u16(), "Request failed: {}", e);
            } else {
                warn!(status = status.as_u16(), "Request rejected: {}", e);
            }
            error_response(status, &e.to_string())
        }
    }
}

pub fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(format!("{}\n", message)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
