use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::{AppError, AppResult},
    models::{SessionToken, User, UserProfile},
    policy::Actor,
    repository::RepositoryState,
};

/// Length of a generated activation token.
pub const ACTIVATION_TOKEN_LEN: usize = 32;

// --- Credentials ---

/// Hashes a password into an argon2 PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

/// Checks a candidate against a stored PHC string. A malformed hash never verifies.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("stored password hash is unreadable: {}", e);
            false
        }
    }
}

/// Opaque, unguessable single-use token for account activation.
pub fn generate_activation_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ACTIVATION_TOKEN_LEN)
        .map(char::from)
        .collect()
}

// --- Sessions ---

/// Claims
///
/// Payload of a session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The account id.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// Signs a session token for an active account.
pub fn issue_session(user: &User, config: &AppConfig) -> AppResult<SessionToken> {
    let now = Utc::now();
    let expires_at = TimeDelta::try_hours(config.session_ttl_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            AppError::Internal(format!(
                "session lifetime of {} hours is out of range",
                config.session_ttl_hours
            ))
        })?;
    let claims = Claims {
        sub: user.id,
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.session_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("session signing failed: {}", e)))?;

    Ok(SessionToken {
        token,
        expires_at,
        user: UserProfile::from(user),
    })
}

/// Decodes and validates a session token, returning the account id it names.
pub fn decode_session(token: &str, config: &AppConfig) -> Option<Uuid> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.session_secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => Some(data.claims.sub),
        Err(e) => {
            tracing::debug!("rejected session token: {:?}", e.kind());
            None
        }
    }
}

/// Maps a stored account to the actor it acts as. Only active accounts count.
pub fn actor_for(user: Option<&User>) -> Actor {
    match user {
        Some(user) if user.is_active() && user.is_admin() => Actor::Admin(user.id),
        Some(user) if user.is_active() => Actor::User(user.id),
        _ => Actor::Guest,
    }
}

/// Actor Extractor
///
/// Resolves the identity behind a request. Never rejects: a request without credentials,
/// with an invalid or expired token, or naming a pending or deleted account, acts as
/// `Actor::Guest`. Whether the actor may do what it asks is decided later by the
/// authorization gate.
///
/// In `Env::Local` an `x-user-id` header naming an existing account is accepted in place
/// of a session token.
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let user_id = local_bypass(parts, &config).or_else(|| {
            parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .and_then(|token| decode_session(token, &config))
        });

        let Some(user_id) = user_id else {
            return Ok(Actor::Guest);
        };

        match repo.get_user(user_id).await {
            Ok(user) => Ok(actor_for(user.as_ref())),
            Err(e) => {
                tracing::error!("actor lookup failed: {}", e);
                Ok(Actor::Guest)
            }
        }
    }
}

fn local_bypass(parts: &Parts, config: &AppConfig) -> Option<Uuid> {
    if config.env != Env::Local {
        return None;
    }
    parts
        .headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|id| Uuid::parse_str(id).ok())
}
