use percent_encoding::percent_decode_str;

pub const SECURITY_CREDENTIALS_PREFIX: &str = "/latest/meta-data/iam/security-credentials/";

/// Metadata API routes served by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Name of the role permitted for the caller
    RoleName,
    /// Credentials for the routed role
    Credentials { role: String },
    NotFound,
}

/// Role captured from the request path, attached to the request by the router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleParam(pub String);

pub fn match_route(path: &str) -> Route {
    let Some(rest) = path.strip_prefix(SECURITY_CREDENTIALS_PREFIX) else {
        // Some SDKs omit the trailing slash when listing roles.
        if path == SECURITY_CREDENTIALS_PREFIX.trim_end_matches('/') {
            return Route::RoleName;
        }
        return Route::NotFound;
    };

    if rest.is_empty() {
        return Route::RoleName;
    }

    let rest = rest.strip_suffix('/').unwrap_or(rest);
    if rest.contains('/') {
        return Route::NotFound;
    }
    match percent_decode_str(rest).decode_utf8() {
        Ok(role) => Route::Credentials {
            role: role.into_owned(),
        },
        Err(_) => Route::NotFound,
    }
}

/// Checks that a query string decodes cleanly as form data.
pub fn validate_query(query: Option<&str>) -> Result<(), String> {
    let Some(query) = query else {
        return Ok(());
    };
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        for part in [key, value] {
            if has_bad_escape(part) {
                return Err(format!("invalid escape in query: {}", pair));
            }
            percent_decode_str(part)
                .decode_utf8()
                .map_err(|_| format!("query is not valid UTF-8: {}", pair))?;
        }
    }
    Ok(())
}

fn has_bad_escape(part: &str) -> bool {
    let bytes = part.as_bytes();
    bytes.iter().enumerate().any(|(i, b)| {
        *b == b'%'
            && !(i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit())
    })
}
