use std::collections::HashMap;

use axum::http::HeaderMap;
use scrawl_core::OwnerId;

use crate::error::AppError;

/// Owner resolved from the request's bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedOwner {
    pub owner_id: OwnerId,
}

/// Static token table loaded from configuration.
#[derive(Clone)]
pub struct TokenVerifier {
    tokens: HashMap<String, OwnerId>,
}

impl TokenVerifier {
    pub const fn new(tokens: HashMap<String, OwnerId>) -> Self {
        Self { tokens }
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AuthenticatedOwner, AppError> {
        self.tokens
            .get(token)
            .map(|owner_id| AuthenticatedOwner {
                owner_id: owner_id.clone(),
            })
            .ok_or_else(|| AppError::unauthorized("Unknown access token"))
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn bearer_token_extractor_accepts_valid_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer tok-a"));

        assert_eq!(extract_bearer_token(&headers).unwrap(), "tok-a");
    }

    #[test]
    fn bearer_token_extractor_rejects_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Bearer   "));
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn verifier_maps_token_to_owner() {
        let verifier = TokenVerifier::new(HashMap::from([(
            "tok-a".to_string(),
            OwnerId::new("alice").unwrap(),
        )]));

        assert_eq!(
            verifier.verify_access_token("tok-a").unwrap().owner_id.as_str(),
            "alice"
        );
        assert!(verifier.verify_access_token("tok-z").is_err());
    }
}
