//! In-process implementation of [`Repository`].
//!
//! Every operation holds one async mutex for its whole duration, which makes each call
//! atomic: activation's check-then-set and the cascading deletes cannot interleave with
//! anything else.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        ActivationState, AuthoredComment, Comment, CommentBody, CommentOrder, NewUser,
        PageRequest, Post, PostOrder, User, UserChanges,
    },
    repository::Repository,
    validation::FieldErrors,
};

#[derive(Default)]
struct Tables {
    /// Insertion sequence doubles as the tie-breaker for equal timestamps.
    users: Vec<(u64, User)>,
    posts: Vec<(u64, Post)>,
    comments: Vec<Comment>,
    next_seq: u64,
    next_comment_id: i64,
}

impl Tables {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn user(&self, id: Uuid) -> Option<&User> {
        self.users.iter().map(|(_, u)| u).find(|u| u.id == id)
    }

    fn email_in_use(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .iter()
            .any(|(_, u)| u.email.eq_ignore_ascii_case(email) && Some(u.id) != except)
    }

    fn authored(&self, comment: &Comment) -> AuthoredComment {
        let author_name = comment
            .author_id
            .and_then(|id| self.user(id))
            .map(|u| u.name.clone());
        AuthoredComment {
            comment: comment.clone(),
            author_name,
        }
    }
}

fn slice<T: Clone>(items: &[T], page: PageRequest) -> Vec<T> {
    items
        .iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .cloned()
        .collect()
}

/// MemoryRepository
///
/// Keeps all three tables in memory. Used by the test suites and by local runs started
/// with `DATABASE_URL=memory`.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test and seeding helper: changes an account's role directly.
    pub async fn set_role(&self, id: Uuid, role: crate::models::Role) -> bool {
        let mut tables = self.tables.lock().await;
        match tables.users.iter_mut().find(|(_, u)| u.id == id) {
            Some((_, user)) => {
                user.role = role;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        let mut tables = self.tables.lock().await;

        if tables.email_in_use(&user.email, None) {
            let mut errors = FieldErrors::new();
            errors.taken("email", "Email");
            return Err(AppError::Validation(errors));
        }
        let token_clash = tables
            .users
            .iter()
            .any(|(_, u)| u.activation_token.as_deref() == Some(user.activation_token.as_str()));
        if token_clash {
            return Err(AppError::Internal("activation token collision".to_string()));
        }

        let now = Utc::now();
        let record = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            state: ActivationState::Pending,
            activation_token: Some(user.activation_token),
            created_at: now,
            updated_at: now,
            activated_at: None,
        };
        let seq = tables.seq();
        tables.users.push((seq, record.clone()));
        Ok(record)
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.tables.lock().await.user(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .map(|(_, u)| u)
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn email_taken(&self, email: &str, except: Option<Uuid>) -> AppResult<bool> {
        Ok(self.tables.lock().await.email_in_use(email, except))
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> AppResult<Option<User>> {
        let mut tables = self.tables.lock().await;

        if tables.email_in_use(&changes.email, Some(id)) {
            let mut errors = FieldErrors::new();
            errors.taken("email", "Email");
            return Err(AppError::Validation(errors));
        }

        let Some((_, user)) = tables.users.iter_mut().find(|(_, u)| u.id == id) else {
            return Ok(None);
        };
        user.name = changes.name;
        user.email = changes.email;
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let mut tables = self.tables.lock().await;

        let Some(index) = tables.users.iter().position(|(_, u)| u.id == id) else {
            return Ok(None);
        };
        let (_, removed) = tables.users.remove(index);
        for comment in tables
            .comments
            .iter_mut()
            .filter(|c| c.author_id == Some(id))
        {
            comment.author_id = None;
        }
        Ok(Some(removed))
    }

    async fn list_users(&self, page: PageRequest) -> AppResult<Vec<User>> {
        let tables = self.tables.lock().await;
        let mut users: Vec<&(u64, User)> = tables.users.iter().collect();
        users.sort_by(|(sa, a), (sb, b)| a.created_at.cmp(&b.created_at).then(sa.cmp(sb)));
        let users: Vec<User> = users.into_iter().map(|(_, u)| u.clone()).collect();
        Ok(slice(&users, page))
    }

    async fn count_users(&self) -> AppResult<i64> {
        Ok(self.tables.lock().await.users.len() as i64)
    }

    async fn activate_user(&self, token: &str) -> AppResult<Option<User>> {
        let mut tables = self.tables.lock().await;

        let Some((_, user)) = tables.users.iter_mut().find(|(_, u)| {
            u.state == ActivationState::Pending && u.activation_token.as_deref() == Some(token)
        }) else {
            return Ok(None);
        };
        let now = Utc::now();
        user.state = ActivationState::Active;
        user.activation_token = None;
        user.activated_at = Some(now);
        user.updated_at = now;
        Ok(Some(user.clone()))
    }

    async fn insert_post(&self, title: &str, content: &str) -> AppResult<Post> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            title: title.to_string(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };
        let seq = tables.seq();
        tables.posts.push((seq, post.clone()));
        Ok(post)
    }

    async fn get_post(&self, id: Uuid) -> AppResult<Option<Post>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .iter()
            .map(|(_, p)| p)
            .find(|p| p.id == id)
            .cloned())
    }

    async fn update_post(&self, id: Uuid, title: &str, content: &str) -> AppResult<Option<Post>> {
        let mut tables = self.tables.lock().await;
        let Some((_, post)) = tables.posts.iter_mut().find(|(_, p)| p.id == id) else {
            return Ok(None);
        };
        post.title = title.to_string();
        post.content = content.to_string();
        post.updated_at = Utc::now();
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, id: Uuid) -> AppResult<Option<Post>> {
        let mut tables = self.tables.lock().await;
        let Some(index) = tables.posts.iter().position(|(_, p)| p.id == id) else {
            return Ok(None);
        };
        let (_, removed) = tables.posts.remove(index);
        tables.comments.retain(|c| c.post_id != id);
        Ok(Some(removed))
    }

    async fn list_posts(&self, order: PostOrder, page: PageRequest) -> AppResult<Vec<Post>> {
        let tables = self.tables.lock().await;
        let mut posts: Vec<&(u64, Post)> = tables.posts.iter().collect();
        posts.sort_by(|(sa, a), (sb, b)| {
            let oldest_first = a.created_at.cmp(&b.created_at).then(sa.cmp(sb));
            match order {
                PostOrder::OldestFirst => oldest_first,
                PostOrder::NewestFirst => oldest_first.reverse(),
            }
        });
        let posts: Vec<Post> = posts.into_iter().map(|(_, p)| p.clone()).collect();
        Ok(slice(&posts, page))
    }

    async fn count_posts(&self) -> AppResult<i64> {
        Ok(self.tables.lock().await.posts.len() as i64)
    }

    async fn insert_comment(
        &self,
        post_id: Uuid,
        body: &str,
        author_id: Option<Uuid>,
    ) -> AppResult<Comment> {
        let mut tables = self.tables.lock().await;
        if !tables.posts.iter().any(|(_, p)| p.id == post_id) {
            return Err(AppError::not_found("Post", post_id));
        }
        tables.next_comment_id += 1;
        let comment = Comment {
            id: tables.next_comment_id,
            post_id,
            author_id,
            body: CommentBody::Live(body.to_string()),
            created_at: Utc::now(),
            redacted_at: None,
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, id: i64) -> AppResult<Option<AuthoredComment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .comments
            .iter()
            .find(|c| c.id == id)
            .map(|c| tables.authored(c)))
    }

    async fn redact_comment(&self, id: i64) -> AppResult<Option<AuthoredComment>> {
        let mut tables = self.tables.lock().await;
        let Some(comment) = tables.comments.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        comment.body = CommentBody::Redacted;
        if comment.redacted_at.is_none() {
            comment.redacted_at = Some(Utc::now());
        }
        let comment = comment.clone();
        Ok(Some(tables.authored(&comment)))
    }

    async fn comments_for(
        &self,
        post_id: Uuid,
        order: CommentOrder,
    ) -> AppResult<Vec<AuthoredComment>> {
        let tables = self.tables.lock().await;
        let mut comments: Vec<&Comment> = tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .collect();
        comments.sort_by(|a, b| {
            let oldest_first = a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id));
            match order {
                CommentOrder::OldestFirst => oldest_first,
                CommentOrder::NewestFirst => oldest_first.reverse(),
            }
        });
        Ok(comments.into_iter().map(|c| tables.authored(c)).collect())
    }

    async fn count_comments(&self, post_id: Uuid) -> AppResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .count() as i64)
    }
}
