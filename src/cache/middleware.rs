//! Axum glue for the ISR layer.
//!
//! Extracts a [`RequestIdentity`] from incoming requests and turns an
//! [`IsrResponse`] into a response carrying `X-Cache` and `Cache-Control`.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap, HeaderName, HeaderValue,
        header::{CACHE_CONTROL, CONTENT_TYPE},
        request::Parts,
    },
    response::{IntoResponse, Response},
};

use super::isr::IsrResponse;
use super::keys::RequestIdentity;

/// Header marking an incremental-update request that expects a fragment.
pub const PARTIAL_REQUEST_HEADER: HeaderName = HeaderName::from_static("hx-request");

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// True when `headers` mark the request as a partial update.
pub fn is_partial_request(headers: &HeaderMap) -> bool {
    headers
        .get(&PARTIAL_REQUEST_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| !value.eq_ignore_ascii_case("false"))
}

impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = RequestIdentity::new(parts.uri.path())
            .with_query(parts.uri.query().unwrap_or_default())
            .partial(is_partial_request(&parts.headers));
        Ok(identity)
    }
}

impl IntoResponse for IsrResponse {
    fn into_response(self) -> Response {
        let content_type = self.content.kind().content_type();
        let mut response = self.content.body().to_owned().into_response();
        let headers = response.headers_mut();

        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(X_CACHE, HeaderValue::from_static(self.status.as_str()));
        if let Ok(value) = HeaderValue::from_str(&self.cache_control) {
            headers.insert(CACHE_CONTROL, value);
        }

        response
    }
}
