// src/auth.rs
use crate::db;
use crate::error::AppError;
use crate::models::UserId;
use argon2::password_hash::{
    Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::info;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const SESSION_COOKIE: &str = "session";

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// Signs and checks the session token carried in the `session` cookie.
#[derive(Clone)]
pub struct SessionKeys {
    secret: Arc<Vec<u8>>,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: Vec<u8>, ttl: Duration) -> Self {
        SessionKeys {
            secret: Arc::new(secret),
            ttl,
        }
    }

    pub fn create_token(&self, user_id: UserId) -> Result<String, AppError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AppError::Session(e.to_string()))?;
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + self.ttl).as_secs() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| AppError::Session(e.to_string()))
    }

    /// Returns the user a token belongs to, or `None` for any token that is
    /// malformed, forged or expired.
    pub fn verify_token(&self, token: &str) -> Option<UserId> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )
        .ok()?;
        data.claims.sub.parse().ok()
    }

    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            token,
            self.ttl.as_secs()
        )
    }

    pub fn clear_cookie(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
            SESSION_COOKIE
        )
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Password(e.to_string()))
}

pub fn verify_password(hash: &str, candidate: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AppError::Password(e.to_string()))?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(e) => Err(AppError::Password(e.to_string())),
    }
}

/// Argon2 is deliberately slow; keep it off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Password(e.to_string()))?
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub confirmation: Option<String>,
}

#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl LoginForm {
    pub fn validate(self) -> Result<Credentials, AppError> {
        let username =
            non_empty(self.username).ok_or(AppError::MissingCredential("username"))?;
        let password =
            non_empty(self.password).ok_or(AppError::MissingCredential("password"))?;
        Ok(Credentials {
            username: username.trim().to_string(),
            password,
        })
    }
}

impl RegisterForm {
    pub fn validate(self) -> Result<Credentials, AppError> {
        let username = non_empty(self.username).ok_or(AppError::MissingField("username"))?;
        let password = non_empty(self.password).ok_or(AppError::MissingField("password"))?;
        if self.confirmation.as_deref() != Some(password.as_str()) {
            return Err(AppError::PasswordMismatch);
        }
        Ok(Credentials {
            username: username.trim().to_string(),
            password,
        })
    }
}

pub async fn register(pool: &SqlitePool, credentials: Credentials) -> Result<UserId, AppError> {
    let password = credentials.password;
    let hash = run_blocking(move || hash_password(&password)).await?;

    let user_id = match db::insert_user(pool, &credentials.username, &hash).await {
        Ok(id) => id,
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::UsernameTaken)
        }
        Err(e) => return Err(e.into()),
    };
    info!("Registered user {} ({})", credentials.username, user_id);
    Ok(user_id)
}

pub async fn authenticate(pool: &SqlitePool, credentials: Credentials) -> Result<UserId, AppError> {
    let user = db::find_user_by_username(pool, &credentials.username)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let hash = user.hash;
    let password = credentials.password;
    if !run_blocking(move || verify_password(&hash, &password)).await? {
        return Err(AppError::InvalidCredentials);
    }
    info!("User {} ({}) logged in", user.username, user.id);
    Ok(user.id)
}

pub async fn username_available(pool: &SqlitePool, username: &str) -> Result<bool, AppError> {
    let username = username.trim();
    if username.is_empty() {
        return Ok(false);
    }
    Ok(db::find_user_by_username(pool, username).await?.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::STARTING_CASH_CENTS;

    fn credentials(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn keys() -> SessionKeys {
        SessionKeys::new(SECRET.to_vec(), Duration::from_secs(60))
    }

    #[test]
    fn tokens_round_trip_and_reject_tampering() {
        let keys = keys();
        let token = keys.create_token(42).unwrap();
        assert_eq!(keys.verify_token(&token), Some(42));

        let other = SessionKeys::new(b"another-secret".to_vec(), Duration::from_secs(60));
        assert_eq!(other.verify_token(&token), None);
        assert_eq!(keys.verify_token("not.a.token"), None);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let claims = Claims {
            sub: "7".to_string(),
            exp: 1_000,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert_eq!(keys().verify_token(&token), None);
    }

    #[test]
    fn password_hashes_verify() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "hunter2").unwrap());
        assert!(!verify_password(&hash, "hunter3").unwrap());
        assert!(matches!(
            verify_password("garbage", "hunter2"),
            Err(AppError::Password(_))
        ));
    }

    #[test]
    fn register_form_checks_fields_in_order() {
        let form = |u: &str, p: &str, c: &str| RegisterForm {
            username: Some(u.to_string()),
            password: Some(p.to_string()),
            confirmation: Some(c.to_string()),
        };
        assert!(matches!(
            form("", "pw", "pw").validate(),
            Err(AppError::MissingField("username"))
        ));
        assert!(matches!(
            form("alice", "", "").validate(),
            Err(AppError::MissingField("password"))
        ));
        assert!(matches!(
            form("alice", "pw", "wp").validate(),
            Err(AppError::PasswordMismatch)
        ));
        assert_eq!(
            form(" alice ", "pw", "pw").validate().unwrap().username,
            "alice"
        );
    }

    #[test]
    fn login_form_missing_fields_are_forbidden() {
        let err = LoginForm::default().validate().unwrap_err();
        assert!(matches!(err, AppError::MissingCredential("username")));
        assert_eq!(err.status(), warp::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let pool = db::test_pool().await;
        let id = register(&pool, credentials("alice", "s3cret")).await.unwrap();

        assert_eq!(
            authenticate(&pool, credentials("alice", "s3cret"))
                .await
                .unwrap(),
            id
        );
        assert!(matches!(
            authenticate(&pool, credentials("alice", "wrong")).await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            authenticate(&pool, credentials("mallory", "s3cret")).await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn duplicate_username_leaves_first_user_intact() {
        let pool = db::test_pool().await;
        let id = register(&pool, credentials("alice", "first")).await.unwrap();
        let before = db::find_user_by_username(&pool, "alice").await.unwrap().unwrap();

        assert!(matches!(
            register(&pool, credentials("alice", "second")).await,
            Err(AppError::UsernameTaken)
        ));

        let after = db::find_user_by_username(&pool, "alice").await.unwrap().unwrap();
        assert_eq!(after.id, id);
        assert_eq!(after.hash, before.hash);
        assert_eq!(db::fetch_cash(&pool, id).await.unwrap(), STARTING_CASH_CENTS);
        assert_eq!(
            authenticate(&pool, credentials("alice", "first"))
                .await
                .unwrap(),
            id
        );
    }

    #[tokio::test]
    async fn username_availability() {
        let pool = db::test_pool().await;
        register(&pool, credentials("alice", "pw")).await.unwrap();

        assert!(!username_available(&pool, "alice").await.unwrap());
        assert!(username_available(&pool, "bob").await.unwrap());
        assert!(!username_available(&pool, "  ").await.unwrap());
    }
}
