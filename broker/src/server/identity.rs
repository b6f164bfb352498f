use hyper::{Body, Request};
use std::net::{IpAddr, SocketAddr};

use super::error::{BrokerError, BrokerResult};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Peer address of the connection a request arrived on.
///
/// The server inserts this into the request extensions before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// Derives the caller identity used as the role lookup key
pub trait IdentityResolver: Send + Sync {
    /// Resolve an identity from data already present on the request
    fn resolve(&self, req: &Request<Body>) -> BrokerResult<String>;
}

/// Resolves callers by IP address
#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    trust_forwarded_for: bool,
}

impl ClientIpResolver {
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self {
            trust_forwarded_for,
        }
    }

    fn forwarded_ip(req: &Request<Body>) -> BrokerResult<Option<IpAddr>> {
        let mut values = req.headers().get_all(FORWARDED_FOR).iter();
        let value = match (values.next(), values.next()) {
            (None, _) => return Ok(None),
            (Some(value), None) => value,
            (Some(_), Some(_)) => {
                return Err(BrokerError::identity(
                    "multiple X-Forwarded-For headers present",
                ))
            }
        };

        let value = value
            .to_str()
            .map_err(|_| BrokerError::identity("X-Forwarded-For is not valid ASCII"))?;
        let mut hops = value.split(',').map(str::trim).filter(|h| !h.is_empty());
        match (hops.next(), hops.next()) {
            (Some(hop), None) => hop.parse::<IpAddr>().map(Some).map_err(|_| {
                BrokerError::identity(format!("X-Forwarded-For entry {} is not an IP", hop))
            }),
            (None, _) => Err(BrokerError::identity("X-Forwarded-For is empty")),
            (Some(_), Some(_)) => Err(BrokerError::identity(format!(
                "X-Forwarded-For lists more than one hop: {}",
                value
            ))),
        }
    }
}

impl IdentityResolver for ClientIpResolver {
    fn resolve(&self, req: &Request<Body>) -> BrokerResult<String> {
        if self.trust_forwarded_for {
            if let Some(ip) = Self::forwarded_ip(req)? {
                return Ok(ip.to_string());
            }
        }

        req.extensions()
            .get::<RemoteAddr>()
            .map(|RemoteAddr(addr)| addr.ip().to_string())
            .ok_or_else(|| BrokerError::identity("remote address unavailable"))
    }
}
