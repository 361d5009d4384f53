use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Carries the caller's `x-request-id` through the request (minting one when
/// absent or unusable) and echoes it on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let header_value = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .filter(|h| !h.is_empty() && h.len() <= 128)
        .cloned()
        .unwrap_or_else(new_request_id);

    req.headers_mut()
        .insert(REQUEST_ID_HEADER, header_value.clone());

    let mut response = next.run(req).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    response
}

fn new_request_id() -> HeaderValue {
    // A hyphenated UUID is always a valid header value.
    HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap_or(HeaderValue::from_static("unknown"))
}
