use std::sync::Arc;

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

use super::service::SurveyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalRole {
    Admin,
    SurveyUser,
    QualityEngineer,
}

impl PrincipalRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::SurveyUser => "SURVEY_USER",
            Self::QualityEngineer => "QUALITY_ENGINEER",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        [Self::Admin, Self::SurveyUser, Self::QualityEngineer]
            .into_iter()
            .find(|role| role.label() == raw)
    }
}

/// Authenticated caller as reported by the session verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    pub role: PrincipalRole,
}

/// Token verification is owned by the identity provider; the survey routes only consume it.
pub trait SessionVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Option<Principal>;
}

pub type SessionHandle = Arc<dyn SessionVerifier>;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve the caller from the `Authorization: Bearer` header without checking its role.
pub fn authenticate(
    headers: &HeaderMap,
    sessions: &dyn SessionVerifier,
) -> Result<Principal, SurveyError> {
    bearer_token(headers)
        .and_then(|token| sessions.verify(token))
        .ok_or_else(|| SurveyError::Unauthorized("Unauthorized".to_string()))
}

pub fn require_role(
    headers: &HeaderMap,
    sessions: &dyn SessionVerifier,
    role: PrincipalRole,
) -> Result<Principal, SurveyError> {
    let principal = authenticate(headers, sessions)?;
    if principal.role != role {
        let message = match role {
            PrincipalRole::Admin => "Admin access only",
            PrincipalRole::QualityEngineer => "Quality Engineer access only",
            PrincipalRole::SurveyUser => "Survey user access only",
        };
        return Err(SurveyError::Forbidden(message.to_string()));
    }
    Ok(principal)
}
