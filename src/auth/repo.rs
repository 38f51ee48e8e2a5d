use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{SessionGrant, User, UserRow};

/// Persistence seam for user credentials and the single live refresh token.
///
/// Every mutation is scoped to one row; nothing here locks across users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Case-insensitive lookup; callers pass the normalized email.
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    /// Exact match against the stored refresh token.
    async fn find_by_refresh_token(&self, token: &str) -> anyhow::Result<Option<User>>;

    /// Inserts a new user. Returns `false` when the email is already taken.
    async fn insert(&self, user: &User) -> anyhow::Result<bool>;

    /// Unconditionally replaces the user's refresh token.
    async fn store_session(
        &self,
        user_id: Uuid,
        grant: &SessionGrant,
        now: OffsetDateTime,
    ) -> anyhow::Result<()>;

    /// Replaces the refresh token only while it still equals `presented`.
    /// Returns `false` if another writer rotated or cleared it first.
    async fn rotate_session(
        &self,
        user_id: Uuid,
        presented: &str,
        grant: &SessionGrant,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool>;

    /// Drops the refresh token. Returns `false` if the user does not exist.
    async fn clear_session(&self, user_id: Uuid, now: OffsetDateTime) -> anyhow::Result<bool>;
}

const SELECT_USER: &str = r#"
    SELECT id, email, password_hash, name, avatar, is_active, created_at, updated_at,
           refresh_token, refresh_token_expiry, session_class
    FROM users
"#;

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_where(&self, predicate: &str, value: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("{SELECT_USER} WHERE {predicate}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(User::from))
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.fetch_one_where("lower(email) = lower($1)", email)
            .await
            .context("find user by email")
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("{SELECT_USER} WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find user by id")?;
        Ok(row.map(User::from))
    }

    async fn find_by_refresh_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        self.fetch_one_where("refresh_token = $1", token)
            .await
            .context("find user by refresh token")
    }

    async fn insert(&self, user: &User) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, avatar, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.avatar)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e).context("insert user"),
        }
    }

    async fn store_session(
        &self,
        user_id: Uuid,
        grant: &SessionGrant,
        now: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $2, refresh_token_expiry = $3, session_class = $4, updated_at = $5
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&grant.token)
        .bind(grant.expires_at)
        .bind(grant.class.as_str())
        .bind(now)
        .execute(&self.db)
        .await
        .context("store refresh token")?;
        Ok(())
    }

    async fn rotate_session(
        &self,
        user_id: Uuid,
        presented: &str,
        grant: &SessionGrant,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let done = sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $3, refresh_token_expiry = $4, session_class = $5, updated_at = $6
             WHERE id = $1 AND refresh_token = $2
            "#,
        )
        .bind(user_id)
        .bind(presented)
        .bind(&grant.token)
        .bind(grant.expires_at)
        .bind(grant.class.as_str())
        .bind(now)
        .execute(&self.db)
        .await
        .context("rotate refresh token")?;
        Ok(done.rows_affected() == 1)
    }

    async fn clear_session(&self, user_id: Uuid, now: OffsetDateTime) -> anyhow::Result<bool> {
        let done = sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = NULL, refresh_token_expiry = NULL, session_class = NULL, updated_at = $2
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.db)
        .await
        .context("clear refresh token")?;
        Ok(done.rows_affected() == 1)
    }
}


#[cfg(test)]
mod tests {
    use time::Duration;

    use super::memory::MemoryUserStore;
    use super::*;
    use crate::auth::repo_types::SessionClass;

    fn user(email: &str) -> User {
        User::new(
            email.into(),
            "$argon2id$stub".into(),
            "Ann".into(),
            None,
            OffsetDateTime::now_utc(),
        )
    }

    fn grant(token: &str) -> SessionGrant {
        SessionGrant {
            token: token.into(),
            expires_at: OffsetDateTime::now_utc() + Duration::days(7),
            class: SessionClass::Normal,
        }
    }

    #[tokio::test]
    async fn insert_rejects_email_differing_only_in_case() {
        let store = MemoryUserStore::default();
        assert!(store.insert(&user("a@x.com")).await.unwrap());
        assert!(!store.insert(&user("A@X.COM")).await.unwrap());

        let stored = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.email, "a@x.com");
    }

    #[tokio::test]
    async fn rotate_with_stale_token_leaves_row_unchanged() {
        let store = MemoryUserStore::default();
        let u = user("a@x.com");
        store.insert(&u).await.unwrap();
        let now = OffsetDateTime::now_utc();
        store.store_session(u.id, &grant("current"), now).await.unwrap();
        let before = store.find_by_id(u.id).await.unwrap().unwrap();

        let rotated = store
            .rotate_session(u.id, "stale-token", &grant("next"), now + Duration::minutes(1))
            .await
            .unwrap();
        assert!(!rotated);

        let after = store.find_by_id(u.id).await.unwrap().unwrap();
        assert_eq!(after.refresh_token.as_deref(), Some("current"));
        assert_eq!(after.refresh_token_expiry, before.refresh_token_expiry);
        assert_eq!(after.updated_at, before.updated_at);

        assert!(store
            .rotate_session(u.id, "current", &grant("next"), now)
            .await
            .unwrap());
        let after = store.find_by_id(u.id).await.unwrap().unwrap();
        assert_eq!(after.refresh_token.as_deref(), Some("next"));
    }

    #[tokio::test]
    async fn rotate_after_clear_fails() {
        let store = MemoryUserStore::default();
        let u = user("a@x.com");
        store.insert(&u).await.unwrap();
        let now = OffsetDateTime::now_utc();
        store.store_session(u.id, &grant("current"), now).await.unwrap();
        assert!(store.clear_session(u.id, now).await.unwrap());

        assert!(!store
            .rotate_session(u.id, "current", &grant("next"), now)
            .await
            .unwrap());
        let after = store.find_by_id(u.id).await.unwrap().unwrap();
        assert_eq!(after.refresh_token, None);
    }
}
