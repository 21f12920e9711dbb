use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

/// Text that replaces the body of a redacted comment.
pub const REDACTION_MARKER: &str = "......";

/// Display name of a comment with no resolvable author.
pub const GUEST_NAME: &str = "Guest";

// --- Users ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    Regular,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Regular => "regular",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "regular" => Ok(Role::Regular),
            other => Err(AppError::Internal(format!("unknown role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ActivationState {
    Pending,
    Active,
}

impl ActivationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationState::Pending => "pending",
            ActivationState::Active => "active",
        }
    }
}

impl FromStr for ActivationState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActivationState::Pending),
            "active" => Ok(ActivationState::Active),
            other => Err(AppError::Internal(format!(
                "unknown activation state '{}'",
                other
            ))),
        }
    }
}

/// User
///
/// The account record as held by the identity store. Never serialized to clients directly;
/// see [`UserProfile`] for the public projection.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Lowercased on write; uniqueness is case-insensitive.
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub role: Role,
    pub state: ActivationState,
    /// Present only while the account is pending.
    pub activation_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.state == ActivationState::Active
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Fields the identity store needs to insert a new pending account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub activation_token: String,
}

/// A validated profile change. `password_hash` is `None` when the credential stays as is.
#[derive(Debug, Clone)]
pub struct UserChanges {
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
}

/// UserProfile
///
/// Public view of an account: everything except the credential and the activation token.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub state: ActivationState,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        UserProfile {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            state: user.state,
            created_at: user.created_at,
        }
    }
}

/// RegisterUserRequest
///
/// Signup form (POST /signup).
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
}

/// UpdateUserRequest
///
/// Profile form (PUT /users/{id}). Leaving both password fields blank keeps the
/// current credential.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// SessionToken
///
/// Bearer credential handed out on sign-in and on successful activation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionToken {
    pub token: String,
    #[ts(type = "string")]
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

// --- Posts ---

/// Post
///
/// Posts have no owner: every mutation is reserved to admins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// PostRequest
///
/// Create and update payload for posts (POST /posts, PUT /posts/{id}).
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// A post as listed on the index, with the size of its thread.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: Post,
    pub comment_count: i64,
}

/// A post with its whole comment thread.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<CommentView>,
    pub comment_count: i64,
}

/// Listing order for posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

// --- Comments ---

/// CommentBody
///
/// A comment is either live, with the text its author wrote, or redacted. Redaction is
/// recorded in the state itself, not inferred from the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum CommentBody {
    Live(String),
    Redacted,
}

impl CommentBody {
    pub fn display_text(&self) -> &str {
        match self {
            CommentBody::Live(text) => text,
            CommentBody::Redacted => REDACTION_MARKER,
        }
    }

    pub fn is_redacted(&self) -> bool {
        matches!(self, CommentBody::Redacted)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub post_id: Uuid,
    /// `None` for guest comments and for comments whose author was deleted.
    pub author_id: Option<Uuid>,
    pub body: CommentBody,
    pub created_at: DateTime<Utc>,
    /// Set by the first redaction and never touched again.
    pub redacted_at: Option<DateTime<Utc>>,
}

/// A comment joined with its author's current name, if the author still exists.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthoredComment {
    pub comment: Comment,
    pub author_name: Option<String>,
}

/// CommentView
///
/// What a reader sees for one comment in a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CommentView {
    pub id: i64,
    pub post_id: Uuid,
    pub author_id: Option<Uuid>,
    /// Author's name, or "Guest" when there is no resolvable author.
    pub author: String,
    /// Comment text, or the redaction marker.
    pub body: String,
    pub redacted: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<AuthoredComment> for CommentView {
    fn from(authored: AuthoredComment) -> Self {
        let AuthoredComment {
            comment,
            author_name,
        } = authored;
        CommentView {
            id: comment.id,
            post_id: comment.post_id,
            author_id: author_name.as_ref().and(comment.author_id),
            author: author_name.unwrap_or_else(|| GUEST_NAME.to_string()),
            body: comment.body.display_text().to_string(),
            redacted: comment.body.is_redacted(),
            created_at: comment.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub body: String,
}

/// Thread order for comments under a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

// --- Pagination & outcomes ---

/// PageRequest
///
/// One-based page index plus page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Page 0 is treated as page 1, and a page always holds at least one item.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let per_page = request.per_page as i64;
        let total_pages = ((total.max(0) + per_page - 1) / per_page) as u32;
        Page {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
        }
    }
}

/// Query string for paged listings (`?page=2`). Any integer is accepted; values below 1
/// land on the first page.
#[derive(Debug, Clone, Copy, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub page: Option<i64>,
}

impl PageQuery {
    pub fn request(&self, per_page: u32) -> PageRequest {
        let page = self.page.unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
        PageRequest::new(page, per_page)
    }
}

/// Outcome
///
/// Successful result handed to the rendering layer: a notice to flash, where to go next,
/// and the data itself.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Outcome<T> {
    pub notice: Option<String>,
    pub redirect_to: Option<String>,
    pub data: T,
}

impl<T> Outcome<T> {
    pub fn data(data: T) -> Self {
        Outcome {
            notice: None,
            redirect_to: None,
            data,
        }
    }

    pub fn notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    pub fn redirect(mut self, to: impl fmt::Display) -> Self {
        self.redirect_to = Some(to.to_string());
        self
    }
}
