//! Request-body extractor accepting form-encoded and JSON payloads with
//! identical field names, as the token and auth endpoints require.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;

use crate::error::OAuth2Error;

/// Deserializes the body as JSON when the Content-Type says so, and as
/// `application/x-www-form-urlencoded` otherwise.
pub struct FormOrJson<T>(pub T);

impl<S, T> FromRequest<S> for FormOrJson<T>
where
    S: Send + Sync,
    T: serde::de::DeserializeOwned,
{
    type Rejection = OAuth2Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|_| OAuth2Error::invalid_request("unreadable request body"))?;

        if is_json {
            serde_json::from_slice(&bytes)
                .map(FormOrJson)
                .map_err(|_| OAuth2Error::invalid_request("malformed JSON body"))
        } else {
            serde_urlencoded::from_bytes(&bytes)
                .map(FormOrJson)
                .map_err(|_| OAuth2Error::invalid_request("malformed form body"))
        }
    }
}
