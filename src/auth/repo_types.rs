use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// How long a refresh token lives, chosen at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionClass {
    Normal,
    Extended,
}

impl SessionClass {
    pub fn from_remember_me(remember_me: bool) -> Self {
        if remember_me {
            SessionClass::Extended
        } else {
            SessionClass::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionClass::Normal => "normal",
            SessionClass::Extended => "extended",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "normal" => Some(SessionClass::Normal),
            "extended" => Some(SessionClass::Extended),
            _ => None,
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String, // normalized (trimmed, lowercase)
    pub password_hash: String,
    pub name: String,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub refresh_token: Option<String>,
    pub refresh_token_expiry: Option<OffsetDateTime>,
    pub session_class: Option<SessionClass>,
}

impl User {
    pub fn new(
        email: String,
        password_hash: String,
        name: String,
        avatar: Option<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            name,
            avatar,
            is_active: true,
            created_at: now,
            updated_at: now,
            refresh_token: None,
            refresh_token_expiry: None,
            session_class: None,
        }
    }
}

/// Row shape as stored by Postgres; `session_class` is plain TEXT.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub refresh_token: Option<String>,
    pub refresh_token_expiry: Option<OffsetDateTime>,
    pub session_class: Option<String>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            name: r.name,
            avatar: r.avatar,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
            refresh_token: r.refresh_token,
            refresh_token_expiry: r.refresh_token_expiry,
            session_class: r.session_class.as_deref().and_then(SessionClass::parse),
        }
    }
}

/// A freshly issued refresh token together with its expiry and class.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub token: String,
    pub expires_at: OffsetDateTime,
    pub class: SessionClass,
}
