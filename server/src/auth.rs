//! The auth collaborator: credential checks, bcrypt hashing and HS256
//! bearer tokens. The core only ever sees the `(user_id, username)` pair a
//! verified token resolves to.

use std::collections::HashMap;
use std::sync::Mutex;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Bearer tokens expire after a day.
const TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username must be 3 to 24 word characters")]
    InvalidUsername,
    #[error("Password must be at least 8 characters")]
    WeakPassword,
    #[error("Username is already taken")]
    UsernameTaken,
    #[error("Invalid username or password")]
    BadCredentials,
    #[error("Invalid or missing token")]
    InvalidToken,
    #[error("Internal error")]
    Internal,
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidUsername | AuthError::WeakPassword => StatusCode::BAD_REQUEST,
            AuthError::UsernameTaken => StatusCode::CONFLICT,
            AuthError::BadCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Request body for `/api/register` and `/api/login`.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Success body for `/api/register` and `/api/login`.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub username: String,
    pub user_id: String,
}

/// The identity a verified token resolves to.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: String,
    pub username: String,
}

/// A stored user. The password never leaves this module; only the bcrypt
/// hash is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
    password_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    username: String,
    iat: u64,
    exp: u64,
}

pub struct AuthService {
    users: Mutex<HashMap<String, UserRecord>>,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthService {
    /// Creates the service with a process-local signing key; tokens do not
    /// survive a restart.
    pub fn new(users: Vec<UserRecord>) -> AuthService {
        let secret: [u8; 32] = rand::thread_rng().gen();

        AuthService {
            users: Mutex::new(
                users
                    .into_iter()
                    .map(|user| (user.username.clone(), user))
                    .collect(),
            ),
            encoding: EncodingKey::from_secret(&secret),
            decoding: DecodingKey::from_secret(&secret),
        }
    }

    pub fn register(&self, username: &str, password: &str) -> Result<TokenResponse, AuthError> {
        let name_ok = (3..=24).contains(&username.len())
            && username
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !name_ok {
            return Err(AuthError::InvalidUsername);
        }

        if password.len() < 8 {
            return Err(AuthError::WeakPassword);
        }

        let password_hash =
            bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|_| AuthError::Internal)?;

        let mut users = self.users.lock().expect("user store lock");

        if users.contains_key(username) {
            return Err(AuthError::UsernameTaken);
        }

        let user = UserRecord {
            user_id: generate_user_id(),
            username: username.to_string(),
            password_hash,
        };

        let response = self.issue(&user)?;
        users.insert(username.to_string(), user);

        Ok(response)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<TokenResponse, AuthError> {
        let users = self.users.lock().expect("user store lock");
        let user = users.get(username).ok_or(AuthError::BadCredentials)?;

        let matches =
            bcrypt::verify(password, &user.password_hash).map_err(|_| AuthError::Internal)?;

        if !matches {
            return Err(AuthError::BadCredentials);
        }

        self.issue(user)
    }

    /// Resolves a bearer token to its user, rejecting bad signatures and
    /// expired claims.
    pub fn verify(&self, token: &str) -> Result<AuthedUser, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AuthError::InvalidToken)?;

        Ok(AuthedUser {
            user_id: data.claims.sub,
            username: data.claims.username,
        })
    }

    /// A copy of the stored users, for the snapshot collaborator.
    pub fn export_users(&self) -> Vec<UserRecord> {
        self.users
            .lock()
            .expect("user store lock")
            .values()
            .cloned()
            .collect()
    }

    fn issue(&self, user: &UserRecord) -> Result<TokenResponse, AuthError> {
        let now = jsonwebtoken::get_current_timestamp();
        let claims = Claims {
            sub: user.user_id.clone(),
            username: user.username.clone(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };

        let token =
            encode(&Header::default(), &claims, &self.encoding).map_err(|_| AuthError::Internal)?;

        Ok(TokenResponse {
            token,
            username: user.username.clone(),
            user_id: user.user_id.clone(),
        })
    }
}

fn generate_user_id() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_login_verify_round_trip() {
        let auth = AuthService::new(Vec::new());

        let registered = auth.register("ada_l", "correct horse").unwrap();
        let user = auth.verify(&registered.token).unwrap();

        assert_eq!(user.username, "ada_l");
        assert_eq!(user.user_id, registered.user_id);

        let logged_in = auth.login("ada_l", "correct horse").unwrap();
        assert_eq!(logged_in.user_id, registered.user_id);
    }

    #[test]
    fn bad_credentials_are_rejected() {
        let auth = AuthService::new(Vec::new());

        auth.register("ada_l", "correct horse").unwrap();

        assert!(matches!(
            auth.login("ada_l", "wrong horse"),
            Err(AuthError::BadCredentials)
        ));
        assert!(matches!(
            auth.login("nobody", "correct horse"),
            Err(AuthError::BadCredentials)
        ));
        assert!(matches!(auth.verify("not-a-token"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn weak_registrations_are_rejected() {
        let auth = AuthService::new(Vec::new());

        assert!(matches!(
            auth.register("x", "long enough password"),
            Err(AuthError::InvalidUsername)
        ));
        assert!(matches!(
            auth.register("ada_l", "short"),
            Err(AuthError::WeakPassword)
        ));

        auth.register("ada_l", "correct horse").unwrap();

        assert!(matches!(
            auth.register("ada_l", "correct horse"),
            Err(AuthError::UsernameTaken)
        ));
    }
}
