use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

// Middleware that ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    // If the incoming request already has a request-id, preserve it; otherwise generate one
    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .unwrap_or_else(|| {
            HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
        });

    // Add to request extensions for downstream usage (e.g., logging)
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;

    // Add/propagate the request id header to response
    res.headers_mut().insert(header_name, req_id_value);

    res
}

/// Best-effort client IP: first X-Forwarded-For hop, then X-Real-Ip.
/// Rate-limit keying only, never trust this for auth decisions.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        })
        .unwrap_or("unknown")
        .to_string()
}

/// Browser origin allow-list for the form endpoints.
///
/// A missing Origin header passes (non-browser clients); a present one must
/// match the configured site host or the request's own Host header.
pub fn origin_allowed(headers: &HeaderMap, site_base_url: &str) -> bool {
    let Some(origin) = headers.get("origin").and_then(|v| v.to_str().ok()) else {
        return true;
    };

    let Ok(origin_url) = url::Url::parse(origin) else {
        return false;
    };
    let origin_authority = host_with_port(&origin_url);
    if origin_authority.is_empty() {
        return false;
    }

    if let Ok(site_url) = url::Url::parse(site_base_url)
        && host_with_port(&site_url) == origin_authority
    {
        return true;
    }

    headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .map(|request_host| origin_authority == request_host)
        .unwrap_or(false)
}

fn host_with_port(url: &url::Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(h), Some(p)) => format!("{h}:{p}"),
        (Some(h), None) => h.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let h = headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1"), ("x-real-ip", "10.0.0.2")]);
        assert_eq!(client_ip(&h), "203.0.113.9");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip_then_unknown() {
        let h = headers(&[("x-real-ip", "10.0.0.2")]);
        assert_eq!(client_ip(&h), "10.0.0.2");
        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn missing_origin_is_allowed() {
        assert!(origin_allowed(&HeaderMap::new(), "https://nitnot.com"));
    }

    #[test]
    fn site_origin_is_allowed() {
        let h = headers(&[("origin", "https://nitnot.com")]);
        assert!(origin_allowed(&h, "https://nitnot.com"));
    }

    #[test]
    fn request_host_origin_is_allowed() {
        let h = headers(&[
            ("origin", "http://localhost:3000"),
            ("host", "localhost:3000"),
        ]);
        assert!(origin_allowed(&h, "https://nitnot.com"));
    }

    #[test]
    fn foreign_origin_is_rejected() {
        let h = headers(&[("origin", "https://evil.example"), ("host", "nitnot.com")]);
        assert!(!origin_allowed(&h, "https://nitnot.com"));
    }

    #[test]
    fn malformed_origin_is_rejected() {
        let h = headers(&[("origin", "not a url")]);
        assert!(!origin_allowed(&h, "https://nitnot.com"));
    }
}
