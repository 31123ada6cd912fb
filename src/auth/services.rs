use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use super::{
    dto::{LoginRequest, PublicUser, RegisterRequest},
    jwt::JwtKeys,
    password::Passwords,
    repo::{NewUser, UserRepo},
};
use crate::error::{AppError, AppResult, StoreError};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A registration that passed validation.
#[derive(Debug)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub about: Option<String>,
}

impl TryFrom<RegisterRequest> for Registration {
    type Error = AppError;

    fn try_from(req: RegisterRequest) -> Result<Self, Self::Error> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("Name is required"));
        }
        let email = normalize_email(&req.email);
        if !is_valid_email(&email) {
            return Err(AppError::validation("Invalid email"));
        }
        if req.password.chars().count() < 8 {
            return Err(AppError::validation("Password too short"));
        }
        let about = req
            .about
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        Ok(Self {
            name,
            email,
            password: req.password,
            about,
        })
    }
}

/// Login input. Nothing is rejected up front so a malformed email fails the
/// same way as a wrong password.
#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl From<LoginRequest> for Credentials {
    fn from(req: LoginRequest) -> Self {
        Self {
            email: normalize_email(&req.email),
            password: req.password,
        }
    }
}

/// Result of a successful register or login.
#[derive(Debug)]
pub struct Session {
    pub user: PublicUser,
    pub token: String,
}

/// Registration and login over the credential store.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepo>,
    passwords: Passwords,
    keys: JwtKeys,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepo>, passwords: Passwords, keys: JwtKeys) -> Self {
        Self {
            users,
            passwords,
            keys,
        }
    }

    #[instrument(skip_all, fields(email = %reg.email))]
    pub async fn register(&self, reg: Registration) -> AppResult<Session> {
        let password_hash = self.hash_blocking(reg.password).await?;

        let user = match self
            .users
            .create(NewUser {
                name: reg.name,
                email: reg.email,
                password_hash,
                about: reg.about,
            })
            .await
        {
            Ok(u) => u,
            Err(StoreError::UniqueViolation) => {
                warn!("email already registered");
                return Err(AppError::DuplicateIdentity);
            }
            Err(e) => return Err(e.into()),
        };

        let token = self.keys.issue(user.id).map_err(AppError::Internal)?;
        info!(user_id = %user.id, "user registered");
        Ok(Session {
            user: user.into(),
            token,
        })
    }

    #[instrument(skip_all, fields(email = %creds.email))]
    pub async fn login(&self, creds: Credentials) -> AppResult<Session> {
        let user = self.users.find_by_email(&creds.email).await?;

        // An unknown email still runs one verification against the decoy hash.
        let stored = user
            .as_ref()
            .map(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.passwords.decoy_hash().to_string());
        let matches = self.verify_blocking(creds.password, stored).await?;

        let user = match (user, matches) {
            (Some(u), true) => u,
            (None, _) => {
                warn!("login unknown email");
                return Err(AppError::InvalidCredentials);
            }
            (Some(u), false) => {
                warn!(user_id = %u.id, "login invalid password");
                return Err(AppError::InvalidCredentials);
            }
        };

        let token = self.keys.issue(user.id).map_err(AppError::Internal)?;
        info!(user_id = %user.id, "user logged in");
        Ok(Session {
            user: user.into(),
            token,
        })
    }

    // argon2 is CPU bound; keep it off the async workers.
    async fn hash_blocking(&self, password: String) -> AppResult<String> {
        let passwords = self.passwords.clone();
        tokio::task::spawn_blocking(move || passwords.hash(&password))
            .await
            .map_err(|e| AppError::Internal(e.into()))?
            .map_err(AppError::Internal)
    }

    async fn verify_blocking(&self, password: String, hash: String) -> AppResult<bool> {
        let passwords = self.passwords.clone();
        tokio::task::spawn_blocking(move || passwords.verify(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(e.into()))?
            .map_err(AppError::Internal)
    }
}
