// src/auth.rs
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{Filter, Rejection};

use crate::config::Config;
use crate::db::Store;
use crate::error::ApiError;
use crate::models::{Credentials, LoginResponse, User};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Password hashing and bearer token issuance. Stateless: no session table.
pub struct Authenticator {
    secret: Vec<u8>,
    token_ttl: Duration,
    bcrypt_cost: u32,
}

impl Authenticator {
    pub fn new(secret: &str, token_ttl: Duration, bcrypt_cost: u32) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            token_ttl,
            bcrypt_cost,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            Duration::days(config.token_ttl_days),
            config.bcrypt_cost,
        )
    }

    pub fn create_token(&self, username: &str) -> Result<String, ApiError> {
        let exp = (Utc::now() + self.token_ttl).timestamp();
        let claims = Claims {
            sub: username.to_string(),
            exp: exp as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| ApiError::Internal(e.to_string()))
    }

    /// Returns the username the token was issued to.
    pub fn verify(&self, token: &str) -> Result<String, ApiError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )
        .map(|data| data.claims.sub)
        .map_err(|e| {
            warn!("Rejected bearer token: {}", e);
            ApiError::Unauthorized
        })
    }

    pub async fn hash_password(&self, password: &str) -> Result<String, ApiError> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .map_err(|e| ApiError::Internal(e.to_string()))
    }

    pub async fn check_password(&self, password: &str, hash: &str) -> Result<bool, ApiError> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .map_err(|e| ApiError::Internal(e.to_string()))
    }

    pub async fn register(&self, store: &dyn Store, creds: &Credentials) -> Result<(), ApiError> {
        let username = creds.username.trim();
        if username.is_empty() || creds.password.is_empty() {
            return Err(ApiError::BadRequest(
                "Username and password required".into(),
            ));
        }
        if store.find_user(username).await?.is_some() {
            return Err(ApiError::Conflict("Username already exists".into()));
        }

        let user = User {
            username: username.to_string(),
            password: self.hash_password(&creds.password).await?,
        };
        if !store.insert_user(&user).await? {
            return Err(ApiError::Conflict("Username already exists".into()));
        }
        info!("Registered user {}.", user.username);
        Ok(())
    }

    pub async fn login(
        &self,
        store: &dyn Store,
        creds: &Credentials,
    ) -> Result<LoginResponse, ApiError> {
        let username = creds.username.trim();
        if username.is_empty() || creds.password.is_empty() {
            return Err(ApiError::BadRequest(
                "Username and password required".into(),
            ));
        }
        let user = store
            .find_user(username)
            .await?
            .ok_or(ApiError::InvalidCredentials)?;
        if !self.check_password(&creds.password, &user.password).await? {
            return Err(ApiError::InvalidCredentials);
        }

        Ok(LoginResponse {
            token: self.create_token(&user.username)?,
            username: user.username,
        })
    }
}

/// Extracts the caller's username from `Authorization: Bearer <token>`.
pub fn with_auth(
    auth: Arc<Authenticator>,
) -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let auth = auth.clone();
        async move {
            let header = header.ok_or(ApiError::Unauthorized)?;
            let token = header
                .strip_prefix("Bearer ")
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or(ApiError::Unauthorized)?;
            auth.verify(token).map_err(Rejection::from)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn authenticator() -> Authenticator {
        Authenticator::new("test-secret", Duration::days(7), 4)
    }

    #[test]
    fn token_round_trips_username() {
        let auth = authenticator();
        let token = auth.create_token("alice").unwrap();
        assert_eq!(auth.verify(&token).unwrap(), "alice");
    }

    #[test]
    fn tampered_or_foreign_tokens_fail() {
        let auth = authenticator();
        let token = auth.create_token("alice").unwrap();
        let (body, signature) = token.rsplit_once('.').unwrap();
        let flipped = if signature.starts_with('A') { 'B' } else { 'A' };
        let tampered = format!("{}.{}{}", body, flipped, &signature[1..]);
        assert!(matches!(auth.verify(&tampered), Err(ApiError::Unauthorized)));

        let other = Authenticator::new("another-secret", Duration::days(7), 4);
        assert!(other.verify(&token).is_err());
        assert!(auth.verify("not.a.token").is_err());
    }

    #[test]
    fn expired_tokens_fail() {
        let claims = Claims {
            sub: "alice".into(),
            exp: (Utc::now() - Duration::hours(1)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(
            authenticator().verify(&token),
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn passwords_are_hashed() {
        let auth = authenticator();
        let hash = auth.hash_password("secret123").await.unwrap();
        assert_ne!(hash, "secret123");
        assert!(auth.check_password("secret123", &hash).await.unwrap());
        assert!(!auth.check_password("wrong", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn register_then_login() {
        let auth = authenticator();
        let store = MemoryStore::new();
        let creds = Credentials::new("alice", "secret123");

        auth.register(&store, &creds).await.unwrap();
        let stored = store.find_user("alice").await.unwrap().unwrap();
        assert_ne!(stored.password, "secret123");

        let response = auth.login(&store, &creds).await.unwrap();
        assert_eq!(response.username, "alice");
        assert_eq!(auth.verify(&response.token).unwrap(), "alice");
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_blanks() {
        let auth = authenticator();
        let store = MemoryStore::new();
        auth.register(&store, &Credentials::new("alice", "pw"))
            .await
            .unwrap();

        let dup = auth.register(&store, &Credentials::new("alice", "other")).await;
        assert!(matches!(dup, Err(ApiError::Conflict(_))));

        let blank = auth.register(&store, &Credentials::new("bob", "")).await;
        assert!(matches!(blank, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn login_rejects_unknown_user_and_wrong_password() {
        let auth = authenticator();
        let store = MemoryStore::new();
        auth.register(&store, &Credentials::new("alice", "pw"))
            .await
            .unwrap();

        let wrong = auth.login(&store, &Credentials::new("alice", "nope")).await;
        assert!(matches!(wrong, Err(ApiError::InvalidCredentials)));
        let missing = auth.login(&store, &Credentials::new("carol", "pw")).await;
        assert!(matches!(missing, Err(ApiError::InvalidCredentials)));
    }
}
