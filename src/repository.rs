use crate::{
    error::{AppError, AppResult},
    models::{
        ActivationState, AuthoredComment, Comment, CommentBody, CommentOrder, NewUser,
        PageRequest, Post, PostOrder, REDACTION_MARKER, Role, User, UserChanges,
    },
    validation::FieldErrors,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Persistence contract for the three entity tables. Each method touches a single entity
/// atomically, except `delete_post` (post plus its comments) and `delete_user` (account
/// plus comment anonymization), which run as one unit each.
///
/// Implemented by [`PostgresRepository`] and by the in-process
/// [`MemoryRepository`](crate::memory::MemoryRepository).
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    /// Inserts a pending account. A clashing email surfaces as a `taken` validation error.
    async fn insert_user(&self, user: NewUser) -> AppResult<User>;
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;
    /// Case-insensitive lookup.
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    /// Whether another account (other than `except`) already uses `email`.
    async fn email_taken(&self, email: &str, except: Option<Uuid>) -> AppResult<bool>;
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> AppResult<Option<User>>;
    /// Removes the account and detaches it from its comments. Returns the removed record.
    async fn delete_user(&self, id: Uuid) -> AppResult<Option<User>>;
    /// Oldest account first.
    async fn list_users(&self, page: PageRequest) -> AppResult<Vec<User>>;
    async fn count_users(&self) -> AppResult<i64>;
    /// Check-then-set in one step: the pending account holding `token` becomes active and
    /// loses its token. `None` when no pending account holds it.
    async fn activate_user(&self, token: &str) -> AppResult<Option<User>>;

    // --- Posts ---
    async fn insert_post(&self, title: &str, content: &str) -> AppResult<Post>;
    async fn get_post(&self, id: Uuid) -> AppResult<Option<Post>>;
    async fn update_post(&self, id: Uuid, title: &str, content: &str) -> AppResult<Option<Post>>;
    /// Hard delete of the post and every comment under it, all or nothing.
    async fn delete_post(&self, id: Uuid) -> AppResult<Option<Post>>;
    async fn list_posts(&self, order: PostOrder, page: PageRequest) -> AppResult<Vec<Post>>;
    async fn count_posts(&self) -> AppResult<i64>;

    // --- Comments ---
    async fn insert_comment(
        &self,
        post_id: Uuid,
        body: &str,
        author_id: Option<Uuid>,
    ) -> AppResult<Comment>;
    async fn get_comment(&self, id: i64) -> AppResult<Option<AuthoredComment>>;
    /// Idempotent: the body becomes the marker, the first `redacted_at` is kept.
    async fn redact_comment(&self, id: i64) -> AppResult<Option<AuthoredComment>>;
    async fn comments_for(
        &self,
        post_id: Uuid,
        order: CommentOrder,
    ) -> AppResult<Vec<AuthoredComment>>;
    async fn count_comments(&self, post_id: Uuid) -> AppResult<i64>;
}

/// RepositoryState
///
/// Shared handle to the persistence layer held by the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Name of the case-insensitive unique index on `users.email` (see migrations).
const EMAIL_INDEX: &str = "users_email_lower_idx";

const USER_COLUMNS: &str = "id, name, email, password_hash, role, state, activation_token, \
                            created_at, updated_at, activated_at";

const POST_COLUMNS: &str = "id, title, content, created_at, updated_at";

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.post_id, c.user_id, c.body, c.created_at, c.redacted_at, u.name AS author_name
    FROM comments c
    LEFT JOIN users u ON c.user_id = u.id
"#;

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    state: String,
    activation_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    activated_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse::<Role>()?,
            state: row.state.parse::<ActivationState>()?,
            activation_token: row.activation_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
            activated_at: row.activated_at,
        })
    }
}

#[derive(FromRow)]
struct CommentRow {
    id: i64,
    post_id: Uuid,
    user_id: Option<Uuid>,
    body: String,
    created_at: DateTime<Utc>,
    redacted_at: Option<DateTime<Utc>>,
    author_name: Option<String>,
}

impl From<CommentRow> for AuthoredComment {
    fn from(row: CommentRow) -> Self {
        let body = match row.redacted_at {
            Some(_) => CommentBody::Redacted,
            None => CommentBody::Live(row.body),
        };
        AuthoredComment {
            comment: Comment {
                id: row.id,
                post_id: row.post_id,
                author_id: row.user_id,
                body,
                created_at: row.created_at,
                redacted_at: row.redacted_at,
            },
            author_name: row.author_name,
        }
    }
}

fn to_user(row: Option<UserRow>) -> AppResult<Option<User>> {
    row.map(User::try_from).transpose()
}

/// A unique violation on the email index is a user mistake, not an outage.
fn map_email_conflict(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() && db.constraint() == Some(EMAIL_INDEX) {
            let mut errors = FieldErrors::new();
            errors.taken("email", "Email");
            return AppError::Validation(errors);
        }
    }
    AppError::from(e)
}

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Queries are checked at runtime so the crate builds
/// without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        let sql = format!(
            "INSERT INTO users (id, name, email, password_hash, role, state, activation_token, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW()) RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(ActivationState::Pending.as_str())
            .bind(&user.activation_token)
            .fetch_one(&self.pool)
            .await
            .map_err(map_email_conflict)?;
        User::try_from(row)
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        to_user(row)
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        to_user(row)
    }

    async fn email_taken(&self, email: &str, except: Option<Uuid>) -> AppResult<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(email)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    /// Uses `COALESCE` so a missing password hash leaves the stored credential alone.
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> AppResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET name = $2, email = $3, password_hash = COALESCE($4, password_hash), updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(&changes.name)
            .bind(&changes.email)
            .bind(&changes.password_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_email_conflict)?;
        to_user(row)
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE comments SET user_id = NULL WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let sql = format!("DELETE FROM users WHERE id = $1 RETURNING {}", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        to_user(row)
    }

    async fn list_users(&self, page: PageRequest) -> AppResult<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY created_at ASC, id ASC LIMIT $1 OFFSET $2",
            USER_COLUMNS
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn count_users(&self) -> AppResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?)
    }

    /// A single conditional UPDATE closes the race between two concurrent activations of
    /// the same token: only one of them can match `state = 'pending'`.
    async fn activate_user(&self, token: &str) -> AppResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET state = 'active', activation_token = NULL, activated_at = NOW(), updated_at = NOW() \
             WHERE activation_token = $1 AND state = 'pending' RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        to_user(row)
    }

    async fn insert_post(&self, title: &str, content: &str) -> AppResult<Post> {
        let sql = format!(
            "INSERT INTO posts (id, title, content, created_at, updated_at) VALUES ($1, $2, $3, NOW(), NOW()) RETURNING {}",
            POST_COLUMNS
        );
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(Uuid::new_v4())
            .bind(title)
            .bind(content)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_post(&self, id: Uuid) -> AppResult<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE id = $1", POST_COLUMNS);
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_post(&self, id: Uuid, title: &str, content: &str) -> AppResult<Option<Post>> {
        let sql = format!(
            "UPDATE posts SET title = $2, content = $3, updated_at = NOW() WHERE id = $1 RETURNING {}",
            POST_COLUMNS
        );
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .bind(title)
            .bind(content)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_post(&self, id: Uuid) -> AppResult<Option<Post>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM comments WHERE post_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let sql = format!("DELETE FROM posts WHERE id = $1 RETURNING {}", POST_COLUMNS);
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(post)
    }

    async fn list_posts(&self, order: PostOrder, page: PageRequest) -> AppResult<Vec<Post>> {
        let order_by = match order {
            PostOrder::NewestFirst => "created_at DESC, id DESC",
            PostOrder::OldestFirst => "created_at ASC, id ASC",
        };
        let sql = format!(
            "SELECT {} FROM posts ORDER BY {} LIMIT $1 OFFSET $2",
            POST_COLUMNS, order_by
        );
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_posts(&self) -> AppResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Inserts and re-reads through the author join in one statement.
    async fn insert_comment(
        &self,
        post_id: Uuid,
        body: &str,
        author_id: Option<Uuid>,
    ) -> AppResult<Comment> {
        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (post_id, user_id, body, created_at)
                VALUES ($1, $2, $3, NOW())
                RETURNING id, post_id, user_id, body, created_at, redacted_at
            )
            SELECT i.id, i.post_id, i.user_id, i.body, i.created_at, i.redacted_at, u.name AS author_name
            FROM inserted i LEFT JOIN users u ON i.user_id = u.id
            "#,
        )
        .bind(post_id)
        .bind(author_id)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        Ok(AuthoredComment::from(row).comment)
    }

    async fn get_comment(&self, id: i64) -> AppResult<Option<AuthoredComment>> {
        let sql = format!("{} WHERE c.id = $1", COMMENT_SELECT);
        let row = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AuthoredComment::from))
    }

    async fn redact_comment(&self, id: i64) -> AppResult<Option<AuthoredComment>> {
        let updated = sqlx::query(
            "UPDATE comments SET body = $2, redacted_at = COALESCE(redacted_at, NOW()) WHERE id = $1",
        )
        .bind(id)
        .bind(REDACTION_MARKER)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_comment(id).await
    }

    async fn comments_for(
        &self,
        post_id: Uuid,
        order: CommentOrder,
    ) -> AppResult<Vec<AuthoredComment>> {
        let order_by = match order {
            CommentOrder::OldestFirst => "c.created_at ASC, c.id ASC",
            CommentOrder::NewestFirst => "c.created_at DESC, c.id DESC",
        };
        let sql = format!("{} WHERE c.post_id = $1 ORDER BY {}", COMMENT_SELECT, order_by);
        let rows = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AuthoredComment::from).collect())
    }

    async fn count_comments(&self, post_id: Uuid) -> AppResult<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE post_id = $1")
                .bind(post_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }
}
