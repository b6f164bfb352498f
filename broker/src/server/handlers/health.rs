use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde_json::json;
use std::convert::Infallible;

use crate::server::service::BrokerService;
use crate::server::status::{error_response, respond};

impl BrokerService {
    pub async fn handle_internal_request(
        &self,
        req: Request<Body>,
    ) -> Result<Response<Body>, Infallible> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/health") => {
                let started_at = self
                    .started_at
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_else(|_| std::time::Duration::from_secs(0))
                    .as_secs();

                let health_info = json!({
                    "status": "healthy",
                    "instance_id": self.server_instance_id,
                    "started_at": started_at,
                });

                let mut response = Response::new(Body::from(health_info.to_string()));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Ok(response)
            }
            (&Method::GET, "/metrics") => Ok(respond(self.metrics.render().map(|text| {
                let mut response = Response::new(Body::from(text));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                response
            }))),
            _ => Ok(error_response(StatusCode::NOT_FOUND, "Not Found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::identity::ClientIpResolver;
    use crate::server::metrics::{MetricsSink, PrometheusMetrics, CREDENTIALS_HANDLER, SUCCESS};
    use crate::server::roles::StaticRoleFinder;
    use crate::server::testing::FakeCredentials;
    use std::sync::Arc;
    use std::time::Duration;

    fn service() -> BrokerService {
        BrokerService::new(
            Arc::new(ClientIpResolver::default()),
            Arc::new(StaticRoleFinder::default()),
            Arc::new(FakeCredentials::ok()),
            Arc::new(PrometheusMetrics::new().unwrap()),
            Duration::from_secs(5),
        )
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let service = service();
        let response = service.handle_internal_request(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(
            health["instance_id"],
            service.server_instance_id.to_string()
        );
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let service = service();
        service.metrics.mark(CREDENTIALS_HANDLER, SUCCESS);

        let response = service.handle_internal_request(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(
            "role_broker_handler_events_total{event=\"success\",handler=\"credentialsHandler\"} 1"
        ));
    }

    #[tokio::test]
    async fn test_unknown_internal_path() {
        let service = service();
        let response = service.handle_internal_request(get("/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
