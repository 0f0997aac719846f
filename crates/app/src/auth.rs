use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use metrics::counter;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

use inventory_core::Role;

use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Validates HS256 bearer tokens issued by the login service.
#[derive(Clone)]
pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time-based claims are checked against the application clock below.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<AuthUser, TokenError> {
        let claims = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| TokenError::Invalid(format!("{err}")))?
            .claims;

        let now_ts = now.timestamp();
        if let Some(nbf) = claims.nbf {
            if now_ts < nbf {
                return Err(TokenError::NotYetValid);
            }
        }
        if let Some(exp) = claims.exp {
            if now_ts >= exp {
                return Err(TokenError::Expired);
            }
        }

        Ok(AuthUser {
            subject: claims.sub,
            role: Role::from_claim(claims.role.as_deref().unwrap_or_default()),
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TokenClaims {
    #[serde(deserialize_with = "subject_from_string_or_number")]
    pub sub: String,
    #[serde(default, alias = "rol", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

fn subject_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Subject {
        Text(String),
        Number(i64),
    }

    Ok(match Subject::deserialize(deserializer)? {
        Subject::Text(value) => value,
        Subject::Number(value) => value.to_string(),
    })
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
}

impl TokenError {
    fn reason(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "invalid",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
        }
    }
}

/// Authenticated caller, inserted into request extensions by [`require_bearer`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub subject: String,
    pub role: Role,
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), ProblemResponse> {
        if self.role.is_admin() {
            Ok(())
        } else {
            counter!("auth_rejections_total", "reason" => "forbidden").increment(1);
            Err(ProblemResponse::new(
                StatusCode::FORBIDDEN,
                "admin_only",
                "only administrators may perform this action",
            ))
        }
    }
}

/// Rejects requests without a valid bearer credential.
///
/// The token is read from `Authorization: Bearer ...`; a `token` query
/// parameter is accepted as a fallback because `EventSource` cannot set
/// headers.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ProblemResponse> {
    let token = bearer_from_headers(req.headers())
        .or_else(|| token_from_query(req.uri()))
        .ok_or_else(|| {
            counter!("auth_rejections_total", "reason" => "missing").increment(1);
            ProblemResponse::new(StatusCode::UNAUTHORIZED, "missing_token", "token required")
        })?;

    let user = state
        .token_validator()
        .validate(&token, state.now())
        .map_err(|err| {
            counter!("auth_rejections_total", "reason" => err.reason()).increment(1);
            debug!(stage = "auth", error = %err, "bearer token rejected");
            ProblemResponse::new(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "token invalid or expired",
            )
        })?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    #[serde(default)]
    token: Option<String>,
}

fn token_from_query(uri: &Uri) -> Option<String> {
    let Query(query) = Query::<TokenQuery>::try_from_uri(uri).ok()?;
    let token = query.token?.trim().to_string();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
pub(crate) fn mint_token(secret: &[u8], sub: &str, role: &str, exp: i64) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = TokenClaims {
        sub: sub.to_string(),
        role: Some(role.to_string()),
        exp: Some(exp),
        nbf: None,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).expect("encode token")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &[u8] = b"unit-secret";

    #[test]
    fn accepts_valid_admin_token() {
        let now = Utc::now();
        let token = mint_token(SECRET, "42", "Admin", (now + Duration::hours(1)).timestamp());

        let user = TokenValidator::new(SECRET)
            .validate(&token, now)
            .expect("token should validate");
        assert_eq!(user.subject, "42");
        assert!(user.role.is_admin());
    }

    #[test]
    fn accepts_numeric_subject_and_rol_claim() {
        let now = Utc::now();
        let claims = json!({
            "sub": 7,
            "email": "staff@example.com",
            "rol": "bodeguero",
            "exp": (now + Duration::hours(8)).timestamp(),
        });
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET))
            .expect("encode");

        let user = TokenValidator::new(SECRET)
            .validate(&token, now)
            .expect("token should validate");
        assert_eq!(user.subject, "7");
        assert_eq!(user.role, Role::Staff);
    }

    #[test]
    fn rejects_expired_token() {
        let now = Utc::now();
        let token = mint_token(SECRET, "1", "admin", (now - Duration::seconds(1)).timestamp());

        let err = TokenValidator::new(SECRET).validate(&token, now).unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[test]
    fn rejects_wrong_signature() {
        let now = Utc::now();
        let token = mint_token(b"other", "1", "admin", (now + Duration::hours(1)).timestamp());

        let err = TokenValidator::new(SECRET).validate(&token, now).unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[test]
    fn extracts_bearer_header_and_query_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_from_headers(&headers).as_deref(), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, "Basic xyz".parse().unwrap());
        assert!(bearer_from_headers(&headers).is_none());

        let uri: Uri = "/api/warehouses/1/sse?foo=1&token=abc".parse().unwrap();
        assert_eq!(token_from_query(&uri).as_deref(), Some("abc"));

        let uri: Uri = "/api/warehouses/1/sse?token=".parse().unwrap();
        assert!(token_from_query(&uri).is_none());

        let uri: Uri = "/api/warehouses/1/sse".parse().unwrap();
        assert!(token_from_query(&uri).is_none());
    }

    #[test]
    fn query_token_is_percent_decoded() {
        let uri: Uri = "/api/warehouses/1/sse?token=aaa%2Ebbb%2Eccc".parse().unwrap();
        assert_eq!(token_from_query(&uri).as_deref(), Some("aaa.bbb.ccc"));
    }

    #[test]
    fn accepts_token_without_expiry() {
        let claims = json!({ "sub": "9", "role": "admin" });
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET))
            .expect("encode");

        let user = TokenValidator::new(SECRET)
            .validate(&token, Utc::now())
            .expect("token without exp should validate");
        assert_eq!(user.subject, "9");
        assert!(user.role.is_admin());
    }
}
