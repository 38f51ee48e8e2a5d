use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default, alias = "remember_me")]
    pub remember_me: bool,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(alias = "refresh_token")]
    pub refresh_token: String,
}

/// Response returned after register, login or refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime, // access token expiry
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            name: u.name.clone(),
            avatar: u.avatar.clone(),
            is_active: u.is_active,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub service: &'static str,
    pub status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_response_uses_camel_case_and_hides_secrets() {
        let user = User::new(
            "test@example.com".into(),
            "$argon2id$secret".into(),
            "Test".into(),
            None,
            OffsetDateTime::now_utc(),
        );
        let response = AuthResponse {
            access_token: "a.b.c".into(),
            refresh_token: "r".into(),
            expires_at: OffsetDateTime::now_utc(),
            user: PublicUser::from(&user),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["accessToken"], "a.b.c");
        assert_eq!(json["refreshToken"], "r");
        assert!(json["expiresAt"].is_string());
        assert_eq!(json["user"]["email"], "test@example.com");
        assert_eq!(json["user"]["isActive"], true);
        let raw = json.to_string();
        assert!(!raw.contains("argon2"));
        assert!(!raw.contains("passwordHash"));
    }

    #[test]
    fn login_request_accepts_both_casings() {
        let a: LoginRequest =
            serde_json::from_str(r#"{"email":"a@x.com","password":"p","rememberMe":true}"#).unwrap();
        let b: LoginRequest =
            serde_json::from_str(r#"{"email":"a@x.com","password":"p","remember_me":true}"#).unwrap();
        let c: LoginRequest = serde_json::from_str(r#"{"email":"a@x.com","password":"p"}"#).unwrap();
        assert!(a.remember_me);
        assert!(b.remember_me);
        assert!(!c.remember_me);
    }
}
