//! Caller identification.
//!
//! The router bridge authenticates bus peers itself and forwards the verified
//! identity and public key of each caller in request headers. This module
//! provides the `BusCaller` extractor that reads them.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use fleetlink_auth::Caller;

use crate::error::ApiError;

/// Header carrying the caller's bus identity.
pub const IDENTITY_HEADER: &str = "x-bus-identity";

/// Header carrying the caller's public key.
pub const PUBLIC_KEY_HEADER: &str = "x-bus-publickey";

/// The verified bus peer that sent a request.
#[derive(Debug, Clone)]
pub struct BusCaller(pub Caller);

impl BusCaller {
    /// Read the caller from request headers.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` if the identity header is missing or
    /// empty.
    pub fn from_parts(parts: &Parts) -> Result<Self, ApiError> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
        };

        let identity = header(IDENTITY_HEADER).ok_or(ApiError::Unauthorized)?;
        Ok(Self(Caller::new(identity, header(PUBLIC_KEY_HEADER))))
    }
}

impl<S> FromRequestParts<S> for BusCaller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        _state: &'life1 S,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move { Self::from_parts(parts) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/v1/rpc");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn caller_from_headers() {
        let parts = parts(&[
            (IDENTITY_HEADER, "volttron.central"),
            (PUBLIC_KEY_HEADER, "vc-key"),
        ]);
        let BusCaller(caller) = BusCaller::from_parts(&parts).unwrap();
        assert_eq!(caller.identity, "volttron.central");
        assert_eq!(caller.public_key.as_deref(), Some("vc-key"));
    }

    #[test]
    fn key_is_optional() {
        let parts = parts(&[(IDENTITY_HEADER, "listener")]);
        let BusCaller(caller) = BusCaller::from_parts(&parts).unwrap();
        assert!(caller.public_key.is_none());
    }

    #[test]
    fn identity_is_required() {
        let parts = parts(&[(PUBLIC_KEY_HEADER, "vc-key")]);
        assert!(matches!(
            BusCaller::from_parts(&parts),
            Err(ApiError::Unauthorized)
        ));
    }
}
