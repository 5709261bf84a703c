//! Bearer-token authentication for the protected routes.
//!
//! Tokens are HS256 compact JWTs assembled from primitives: a base64url
//! header and claims section signed with HMAC-SHA256. Claims carry the
//! username, its roles and an expiry seven days out. The signing key and the
//! built-in accounts are sourced from secret files named by environment
//! variables, with development fallbacks.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;

use crate::error::IngressError;
use crate::server::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime.
pub const TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Roles accepted on the bundle endpoints.
const REQUIRED_ROLES: &[&str] = &["user"];

/// Environment variable naming the signing-key secret file.
const JWT_KEY_FILE_VAR: &str = "SEQUENCER_JWT_KEY";
/// Environment variables naming the default account password files.
const ADMIN_PASSWORD_FILE_VAR: &str = "SEQUENCER_DEFAULT_ADMIN_PASSWORD_FILE";
const USER1_PASSWORD_FILE_VAR: &str = "SEQUENCER_DEFAULT_USER1_PASSWORD_FILE";

/// Claims carried inside a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username the token was issued to.
    pub sub: String,
    /// Roles granted to the user.
    pub roles: Vec<String>,
    /// Expiry as unix seconds.
    pub exp: i64,
}

/// Token verification failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,
    #[error("signature mismatch")]
    Signature,
    #[error("token expired")]
    Expired,
    #[error("claims encoding failed: {0}")]
    Encoding(String),
}

/// Issues and verifies HS256 tokens under one signing key.
pub struct TokenAuthority {
    key: Vec<u8>,
}

impl TokenAuthority {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC-SHA256 accepts keys of any length.
        HmacSha256::new_from_slice(&self.key).expect("hmac key")
    }

    /// Issue a token for `username` carrying `roles`.
    pub fn issue(&self, username: &str, roles: &[String]) -> Result<String, AuthError> {
        self.issue_with_expiry(username, roles, unix_now() + TOKEN_TTL.as_secs() as i64)
    }

    fn issue_with_expiry(
        &self,
        username: &str,
        roles: &[String],
        exp: i64,
    ) -> Result<String, AuthError> {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = Claims {
            sub: username.to_string(),
            roles: roles.to_vec(),
            exp,
        };
        let claims_json =
            serde_json::to_vec(&claims).map_err(|e| AuthError::Encoding(e.to_string()))?;
        let signing_input = format!("{header}.{}", URL_SAFE_NO_PAD.encode(claims_json));

        let mut mac = self.mac();
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }

    /// Verify a token's signature and expiry, returning its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut parts = token.splitn(3, '.');
        let (Some(header), Some(payload), Some(signature)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed);
        };

        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::Malformed)?;
        let mut mac = self.mac();
        mac.update(format!("{header}.{payload}").as_bytes());
        mac.verify_slice(&signature_bytes)
            .map_err(|_| AuthError::Signature)?;

        let claims_bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&claims_bytes).map_err(|_| AuthError::Malformed)?;

        if claims.exp <= unix_now() {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }

    /// Keyed digest of a password, for constant-time storage comparison.
    fn password_mac(&self, password: &str) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(password.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn verify_password(&self, password: &str, stored_mac: &[u8]) -> bool {
        let mut mac = self.mac();
        mac.update(password.as_bytes());
        mac.verify_slice(stored_mac).is_ok()
    }
}

struct User {
    password_mac: Vec<u8>,
    roles: Vec<String>,
}

/// In-process user database plus the token authority.
pub struct UserStore {
    authority: TokenAuthority,
    users: HashMap<String, User>,
}

impl UserStore {
    /// Build the store from environment-named secret files, falling back to
    /// development defaults.
    pub fn from_env() -> Self {
        let key = read_secret(JWT_KEY_FILE_VAR, "defaultJwtKey");
        let mut store = Self::new(key.into_bytes());
        store.insert_user(
            "admin",
            &read_secret(ADMIN_PASSWORD_FILE_VAR, "defaultAdminPassword"),
            &["admin"],
        );
        store.insert_user(
            "user1",
            &read_secret(USER1_PASSWORD_FILE_VAR, "defaultUser1Password"),
            &["user"],
        );
        store
    }

    /// Empty store with the given signing key.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            authority: TokenAuthority::new(key),
            users: HashMap::new(),
        }
    }

    /// Register a user with a plain-text password (digested before storage).
    pub fn insert_user(&mut self, username: &str, password: &str, roles: &[&str]) {
        self.users.insert(
            username.to_string(),
            User {
                password_mac: self.authority.password_mac(password),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
    }

    /// Check credentials and issue a token.
    pub fn login(&self, username: &str, password: &str) -> Result<String, IngressError> {
        let Some(user) = self.users.get(username) else {
            return Err(IngressError::InvalidCredentials);
        };
        if !self.authority.verify_password(password, &user.password_mac) {
            return Err(IngressError::InvalidCredentials);
        }
        self.authority
            .issue(username, &user.roles)
            .map_err(|_| IngressError::TokenGeneration)
    }

    pub fn authority(&self) -> &TokenAuthority {
        &self.authority
    }
}

/// Body of a login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Handler for `POST /sequencer/login`.
pub async fn handle_login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(login)) = payload else {
        return IngressError::InvalidPayload("Invalid request".to_string()).into_response();
    };

    match state.users.login(&login.username, &login.password) {
        Ok(token) => (StatusCode::OK, Json(json!({ "token": token }))).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Middleware requiring a bearer token with the `user` role.
pub async fn user_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let Some(raw) = header else {
        return IngressError::MissingAuth.into_response();
    };
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw);

    let claims = match state.users.authority().verify(token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::warn!(error = %err, "rejected token");
            return IngressError::InvalidToken.into_response();
        }
    };

    if !claims
        .roles
        .iter()
        .any(|role| REQUIRED_ROLES.contains(&role.as_str()))
    {
        return IngressError::Forbidden.into_response();
    }

    tracing::debug!(username = %claims.sub, "authenticated user");
    request.extensions_mut().insert(claims);
    next.run(request).await
}

/// Read a secret from the file named by `path_var`, or fall back.
fn read_secret(path_var: &str, default: &str) -> String {
    if let Ok(path) = std::env::var(path_var) {
        if let Ok(data) = std::fs::read_to_string(path) {
            return data;
        }
    }
    default.to_string()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let authority = TokenAuthority::new(b"test-key".to_vec());
        let token = authority.issue("user1", &roles(&["user"])).unwrap();

        let claims = authority.verify(&token).unwrap();
        assert_eq!(claims.sub, "user1");
        assert_eq!(claims.roles, vec!["user"]);
        assert!(claims.exp > unix_now());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let issuer = TokenAuthority::new(b"key-a".to_vec());
        let verifier = TokenAuthority::new(b"key-b".to_vec());

        let token = issuer.issue("user1", &roles(&["user"])).unwrap();
        assert!(matches!(
            verifier.verify(&token),
            Err(AuthError::Signature)
        ));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let authority = TokenAuthority::new(b"test-key".to_vec());
        let token = authority.issue("user1", &roles(&["user"])).unwrap();

        // Swap the claims section for one granting admin.
        let parts: Vec<&str> = token.split('.').collect();
        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Claims {
                sub: "user1".to_string(),
                roles: roles(&["admin"]),
                exp: unix_now() + 1000,
            })
            .unwrap(),
        );
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);

        assert!(matches!(
            authority.verify(&forged),
            Err(AuthError::Signature)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let authority = TokenAuthority::new(b"test-key".to_vec());
        let token = authority
            .issue_with_expiry("user1", &roles(&["user"]), unix_now() - 1)
            .unwrap();

        assert!(matches!(authority.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let authority = TokenAuthority::new(b"test-key".to_vec());
        assert!(matches!(
            authority.verify("not-a-token"),
            Err(AuthError::Malformed)
        ));
        assert!(matches!(
            authority.verify("a.b.!!!"),
            Err(AuthError::Malformed)
        ));
    }

    #[test]
    fn test_login_checks_password() {
        let mut store = UserStore::new(b"test-key".to_vec());
        store.insert_user("user1", "hunter2", &["user"]);

        assert!(store.login("user1", "hunter2").is_ok());
        assert!(matches!(
            store.login("user1", "wrong"),
            Err(IngressError::InvalidCredentials)
        ));
        assert!(matches!(
            store.login("nobody", "hunter2"),
            Err(IngressError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_login_token_carries_roles() {
        let mut store = UserStore::new(b"test-key".to_vec());
        store.insert_user("admin", "secret", &["admin"]);

        let token = store.login("admin", "secret").unwrap();
        let claims = store.authority().verify(&token).unwrap();
        assert_eq!(claims.roles, vec!["admin"]);
    }
}
