//! Authentication service: signup, signin and token issuance

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{SignIn, SignUp, User, UserClaims},
    repository::Repository,
};

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Register a new user
    pub async fn sign_up(&self, request: &SignUp) -> AppResult<User> {
        let hash = hash_password(&request.password)?;
        let user = self.repository.users.create(request, &hash).await?;
        tracing::info!(user_id = user.id, username = %user.username, "User signed up");
        Ok(user)
    }

    /// Check credentials and return a JWT along with the user
    pub async fn sign_in(&self, request: &SignIn) -> AppResult<(String, User)> {
        let user = self
            .repository
            .users
            .get_by_username(&request.username)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

        if !verify_password(&user.password, &request.password)? {
            tracing::warn!(username = %request.username, "Rejected signin");
            return Err(AppError::Authentication("Invalid credentials".to_string()));
        }

        let token = self.issue_token(&user)?;
        Ok((token, user))
    }

    /// Get user by ID
    pub async fn get_user(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    fn issue_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = UserClaims {
            sub: user.username.clone(),
            user_id: user.id,
            exp: now + (self.config.jwt_expiration_hours as i64 * 3600),
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2 hash
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
