use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::ServerError;

/// The streaming access token a request carries, forwarded as is
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|x| x.to_str().ok())
            .ok_or(ServerError::MissingToken)?;

        let parts: Vec<_> = authorization.split_ascii_whitespace().collect();

        match parts.as_slice() {
            ["Bearer", token] => Ok(Self(token.to_string())),
            ["Bearer"] => Err(ServerError::MissingToken),
            _ => Err(ServerError::MalformedAuthorization),
        }
    }
}
