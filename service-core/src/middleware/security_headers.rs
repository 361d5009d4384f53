use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};

const DOCS_CSP: &str = "default-src 'self'; \
                        script-src 'self' 'unsafe-inline'; \
                        style-src 'self' 'unsafe-inline'; \
                        img-src 'self' data:; \
                        font-src 'self'; \
                        connect-src 'self'";

const API_CSP: &str = "default-src 'none'; frame-ancestors 'none'";

fn is_docs_route(path: &str) -> bool {
    path.starts_with("/docs") || path == "/.well-known/openapi.json"
}

fn apply(headers: &mut HeaderMap, docs: bool) {
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));

    if docs {
        headers.insert(header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(DOCS_CSP));
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
    } else {
        headers.insert(header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(API_CSP));
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        // Responses carry bearer tokens and personal health data.
        headers
            .entry(header::CACHE_CONTROL)
            .or_insert(HeaderValue::from_static("no-store"));
    }
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let docs = is_docs_route(req.uri().path());
    let mut response = next.run(req).await;
    apply(response.headers_mut(), docs);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_routes_are_locked_down() {
        let mut headers = HeaderMap::new();
        apply(&mut headers, is_docs_route("/login"));
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(headers[header::CONTENT_SECURITY_POLICY], API_CSP);
    }

    #[test]
    fn docs_routes_may_be_framed() {
        let mut headers = HeaderMap::new();
        apply(&mut headers, is_docs_route("/docs/index.html"));
        assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
        assert!(headers.get(header::CACHE_CONTROL).is_none());
    }
}
