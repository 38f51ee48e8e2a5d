//! Session lifecycle: register, login, refresh and revoke.
//!
//! All session state lives on the user row; this type holds no mutable state
//! of its own, so one instance is shared by every request.

use std::sync::Arc;

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest},
        errors::AuthError,
        jwt::TokenIssuer,
        password::PasswordHasher,
        repo::UserStore,
        repo_types::{SessionClass, SessionGrant, User},
    },
    config::SessionLifetimes,
};

const MAX_EMAIL_LEN: usize = 255;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 100;
const MIN_NAME_LEN: usize = 1;
const MAX_NAME_LEN: usize = 100;
const MAX_AVATAR_LEN: usize = 500;

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= MAX_EMAIL_LEN && EMAIL_RE.is_match(email)
}

impl SessionLifetimes {
    pub fn duration(&self, class: SessionClass) -> Duration {
        match class {
            SessionClass::Normal => Duration::days(self.normal_days),
            SessionClass::Extended => Duration::days(self.remember_me_days),
        }
    }

    /// Guesses the class of a session stored without one, from how much of
    /// its lifetime is left. Anything past the (integer) midpoint of the two
    /// lifetimes counts as extended.
    pub fn infer_class(&self, remaining: Duration) -> SessionClass {
        let midpoint = (self.normal_days + self.remember_me_days) / 2;
        let remaining_days = remaining.as_seconds_f64() / 86_400.0;
        if remaining_days > midpoint as f64 {
            SessionClass::Extended
        } else {
            SessionClass::Normal
        }
    }
}

pub struct SessionService {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    tokens: TokenIssuer,
    lifetimes: SessionLifetimes,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        tokens: TokenIssuer,
        lifetimes: SessionLifetimes,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            lifetimes,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    #[instrument(skip_all)]
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(&req.email);
        if !is_valid_email(&email) {
            return Err(AuthError::validation("invalid email"));
        }
        let password_len = req.password.chars().count();
        if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&password_len) {
            return Err(AuthError::validation(format!(
                "password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
            )));
        }
        let name = req.name.trim().to_string();
        if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&name.chars().count()) {
            return Err(AuthError::validation(format!(
                "name must be between {MIN_NAME_LEN} and {MAX_NAME_LEN} characters"
            )));
        }
        let avatar = req
            .avatar
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        if let Some(a) = &avatar {
            let is_url = a.starts_with("http://") || a.starts_with("https://");
            if !is_url || a.len() > MAX_AVATAR_LEN {
                return Err(AuthError::validation("invalid avatar url"));
            }
        }

        if self.store.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = self.hash(req.password).await?;
        let now = OffsetDateTime::now_utc();
        let user = User::new(email, password_hash, name, avatar, now);

        // A concurrent registration may have claimed the email since the lookup.
        if !self.store.insert(&user).await? {
            warn!(email = %user.email, "email already registered");
            return Err(AuthError::DuplicateEmail);
        }

        info!(user_id = %user.id, email = %user.email, "user registered");
        self.open_session(user, SessionClass::Normal, now).await
    }

    #[instrument(skip_all)]
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(&req.email);

        let Some(user) = self.store.find_by_email(&email).await? else {
            self.burn_verification(req.password).await?;
            warn!(email = %email, "login failed");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.verify(req.password, user.password_hash.clone()).await? {
            warn!(email = %email, "login failed");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            warn!(user_id = %user.id, "login on inactive account");
            return Err(AuthError::InactiveAccount);
        }

        let class = SessionClass::from_remember_me(req.remember_me);
        let now = OffsetDateTime::now_utc();
        info!(user_id = %user.id, class = class.as_str(), "user logged in");
        self.open_session(user, class, now).await
    }

    /// Exchanges a live refresh token for a new pair. The presented token is
    /// consumed: at most one refresh token is valid per user at any time.
    #[instrument(skip_all)]
    pub async fn refresh(&self, req: RefreshRequest) -> Result<AuthResponse, AuthError> {
        let presented = req.refresh_token;
        if presented.is_empty() {
            return Err(AuthError::InvalidRefreshToken);
        }

        let user = self
            .store
            .find_by_refresh_token(&presented)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        let now = OffsetDateTime::now_utc();
        let expiry = match user.refresh_token_expiry {
            Some(exp) if exp > now => exp,
            _ => {
                warn!(user_id = %user.id, "refresh token expired");
                return Err(AuthError::ExpiredRefreshToken);
            }
        };

        if !user.is_active {
            warn!(user_id = %user.id, "refresh on inactive account");
            return Err(AuthError::InactiveAccount);
        }

        let class = user
            .session_class
            .unwrap_or_else(|| self.lifetimes.infer_class(expiry - now));
        let grant = self.grant(class, now);
        let (access_token, expires_at) = self.tokens.issue_access_token(&user)?;

        if !self
            .store
            .rotate_session(user.id, &presented, &grant, now)
            .await?
        {
            warn!(user_id = %user.id, "refresh token rotated concurrently");
            return Err(AuthError::InvalidRefreshToken);
        }

        debug!(user_id = %user.id, class = class.as_str(), "session renewed");
        Ok(AuthResponse {
            access_token,
            refresh_token: grant.token,
            expires_at,
            user: PublicUser::from(&user),
        })
    }

    /// Ends the user's session. Unknown users are not an error.
    #[instrument(skip(self))]
    pub async fn revoke(&self, user_id: Uuid) -> Result<(), AuthError> {
        let now = OffsetDateTime::now_utc();
        if self.store.clear_session(user_id, now).await? {
            info!(%user_id, "session revoked");
        } else {
            debug!(%user_id, "revoke for unknown user");
        }
        Ok(())
    }

    /// Current profile of an authenticated user.
    pub async fn profile(&self, user_id: Uuid) -> Result<PublicUser, AuthError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidAccessToken)?;
        Ok(PublicUser::from(&user))
    }

    async fn open_session(
        &self,
        user: User,
        class: SessionClass,
        now: OffsetDateTime,
    ) -> Result<AuthResponse, AuthError> {
        let (access_token, expires_at) = self.tokens.issue_access_token(&user)?;
        let grant = self.grant(class, now);
        self.store.store_session(user.id, &grant, now).await?;

        Ok(AuthResponse {
            access_token,
            refresh_token: grant.token,
            expires_at,
            user: PublicUser::from(&user),
        })
    }

    fn grant(&self, class: SessionClass, now: OffsetDateTime) -> SessionGrant {
        SessionGrant {
            token: self.tokens.issue_refresh_token(),
            expires_at: now + self.lifetimes.duration(class),
            class,
        }
    }

    async fn hash(&self, password: String) -> anyhow::Result<String> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("password hashing task")?
    }

    async fn verify(&self, password: String, hash: String) -> anyhow::Result<bool> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .context("password verification task")
    }

    async fn burn_verification(&self, password: String) -> anyhow::Result<()> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify_dummy(&password))
            .await
            .context("password verification task")
    }
}
