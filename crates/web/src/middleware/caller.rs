use axum::{
    async_trait,
    extract::{FromRequestParts, OriginalUri},
    http::{request::Parts, HeaderMap, StatusCode},
};
use model::account::{Caller, Role};
use utility::id::Id;

use crate::common::RouteErrorResponse;

/// Opaque account id, set by the gateway after authenticating the request.
pub const ACCOUNT_ID_HEADER: &str = "x-account-id";

/// Role of the authenticated account, `driver` if absent.
pub const ACCOUNT_ROLE_HEADER: &str = "x-account-role";

/// Extracts the caller of a protected route. Requests without an account id
/// are rejected with `401 Unauthorized`.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Caller);

pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, String> {
    let account = headers
        .get(ACCOUNT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("missing `{}` header", ACCOUNT_ID_HEADER))?;
    let role = match headers.get(ACCOUNT_ROLE_HEADER) {
        None => Role::default(),
        Some(value) => value
            .to_str()
            .map_err(|why| why.to_string())?
            .parse::<Role>()
            .map_err(|why| why.to_string())?,
    };
    Ok(Caller::new(Id::new(account.to_owned()), role))
}

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = RouteErrorResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers)
            .map(Authenticated)
            .map_err(|why| {
                let path = parts
                    .extensions
                    .get::<OriginalUri>()
                    .map(|uri| uri.path().to_owned())
                    .unwrap_or_else(|| parts.uri.path().to_owned());
                log::debug!("rejected unauthenticated {} {}: {}", parts.method, path, why);
                RouteErrorResponse::new(StatusCode::UNAUTHORIZED)
                    .with_method(&parts.method)
                    .with_uri(path)
                    .with_message("Not authorized")
                    .with_detailed_information(why)
            })
    }
}
