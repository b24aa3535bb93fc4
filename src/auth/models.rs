//! Authentication data models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::common::{ValidationResult, Validator};

/// Body of `POST /auth/oauth`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthRequest {
    pub provider: String,
    pub identity_token: String,
    pub provider_user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

pub struct AuthRequestValidator;

impl Validator<AuthRequest> for AuthRequestValidator {
    fn validate(&self, data: &AuthRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require("provider", &data.provider);
        result.require("identity_token", &data.identity_token);
        result.require("provider_user_id", &data.provider_user_id);
        result
    }
}

/// User database model
#[derive(FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: String,
    pub provider: String,
    pub provider_user_id: String,
    pub email: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// `aud` may be a single string or a list.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|a| a == expected),
        }
    }
}

/// Verified claims of a provider identity token
#[derive(Deserialize, Debug, Clone)]
pub struct IdentityClaims {
    pub sub: String,
    pub iss: Option<String>,
    pub aud: Option<Audience>,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Claims of a locally issued session token
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token, so two sessions issued in the same second differ.
    pub jti: String,
}

/// Successful sign-in response
#[derive(Serialize, Debug, Clone)]
pub struct SignInResponse {
    pub user: LocalUser,
    pub token: String,
}
