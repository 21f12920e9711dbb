//! Content store operations for posts and their comment threads.

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        Comment, CommentOrder, CommentView, Page, PageRequest, Post, PostDetail, PostOrder,
        PostRequest, PostSummary,
    },
    repository::Repository,
    validation::{FieldErrors, check_text, is_blank},
};

pub const TITLE_MAX: usize = 100;

fn check_post(form: &PostRequest) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    check_text(&mut errors, "title", "Title", &form.title, None, TITLE_MAX);
    if is_blank(&form.content) {
        errors.blank("content", "Content");
    }
    errors.into_result()
}

async fn require_post(repo: &dyn Repository, id: Uuid) -> AppResult<Post> {
    repo.get_post(id)
        .await?
        .ok_or_else(|| AppError::not_found("Post", id))
}

/// list_posts
///
/// One page of posts in the requested order, each with its comment count.
pub async fn list_posts(
    repo: &dyn Repository,
    page: PageRequest,
    order: PostOrder,
) -> AppResult<Page<PostSummary>> {
    let posts = repo.list_posts(order, page).await?;
    let total = repo.count_posts().await?;

    let mut items = Vec::with_capacity(posts.len());
    for post in posts {
        let comment_count = repo.count_comments(post.id).await?;
        items.push(PostSummary {
            post,
            comment_count,
        });
    }
    Ok(Page::new(items, page, total))
}

/// PostCursor
///
/// Walks the post listing one page at a time. Nothing is fetched until [`next_page`] is
/// called, and [`rewind`] starts the walk over from the first page.
///
/// [`next_page`]: PostCursor::next_page
/// [`rewind`]: PostCursor::rewind
#[derive(Debug, Clone)]
pub struct PostCursor {
    per_page: u32,
    order: PostOrder,
    next: u32,
    done: bool,
}

impl PostCursor {
    pub fn new(per_page: u32, order: PostOrder) -> Self {
        Self {
            per_page,
            order,
            next: 1,
            done: false,
        }
    }

    pub async fn next_page(&mut self, repo: &dyn Repository) -> AppResult<Option<Page<PostSummary>>> {
        if self.done {
            return Ok(None);
        }
        let page = list_posts(repo, PageRequest::new(self.next, self.per_page), self.order).await?;
        if page.items.is_empty() {
            self.done = true;
            return Ok(None);
        }
        self.done = !page.has_next();
        self.next += 1;
        Ok(Some(page))
    }

    pub fn rewind(&mut self) {
        self.next = 1;
        self.done = false;
    }
}

/// A post with its comment thread in `order`.
pub async fn get_post(repo: &dyn Repository, id: Uuid, order: CommentOrder) -> AppResult<PostDetail> {
    let post = require_post(repo, id).await?;
    let comments: Vec<CommentView> = repo
        .comments_for(id, order)
        .await?
        .into_iter()
        .map(CommentView::from)
        .collect();
    Ok(PostDetail {
        post,
        comment_count: comments.len() as i64,
        comments,
    })
}

pub async fn create_post(repo: &dyn Repository, form: PostRequest) -> AppResult<Post> {
    check_post(&form)?;
    let post = repo
        .insert_post(form.title.trim(), &form.content)
        .await?;
    tracing::info!(post_id = %post.id, "post created");
    Ok(post)
}

pub async fn update_post(repo: &dyn Repository, id: Uuid, form: PostRequest) -> AppResult<Post> {
    require_post(repo, id).await?;
    check_post(&form)?;
    let post = repo
        .update_post(id, form.title.trim(), &form.content)
        .await?
        .ok_or_else(|| AppError::not_found("Post", id))?;
    tracing::info!(post_id = %post.id, "post updated");
    Ok(post)
}

/// delete_post
///
/// Removes the post and, in the same unit of work, every comment under it.
pub async fn delete_post(repo: &dyn Repository, id: Uuid) -> AppResult<Post> {
    let post = repo
        .delete_post(id)
        .await?
        .ok_or_else(|| AppError::not_found("Post", id))?;
    tracing::info!(post_id = %post.id, "post deleted with its comments");
    Ok(post)
}

/// add_comment
///
/// Attaches a comment to a post. `author_id` is `None` for guests.
pub async fn add_comment(
    repo: &dyn Repository,
    post_id: Uuid,
    body: &str,
    author_id: Option<Uuid>,
) -> AppResult<Comment> {
    require_post(repo, post_id).await?;

    let mut errors = FieldErrors::new();
    if is_blank(body) {
        errors.blank("body", "Body");
    }
    errors.into_result()?;

    let comment = repo.insert_comment(post_id, body.trim(), author_id).await?;
    tracing::info!(comment_id = comment.id, post_id = %post_id, guest = author_id.is_none(), "comment added");
    Ok(comment)
}

/// redact_comment
///
/// Logical delete. Redacting an already redacted comment changes nothing and is not an
/// error.
pub async fn redact_comment(repo: &dyn Repository, id: i64) -> AppResult<CommentView> {
    let authored = repo
        .redact_comment(id)
        .await?
        .ok_or_else(|| AppError::not_found("Comment", id))?;
    tracing::info!(comment_id = id, "comment redacted");
    Ok(CommentView::from(authored))
}

/// comments_for
///
/// Exactly the comments attached to `post_id`, authors resolved to names or "Guest".
pub async fn comments_for(
    repo: &dyn Repository,
    post_id: Uuid,
    order: CommentOrder,
) -> AppResult<Vec<CommentView>> {
    require_post(repo, post_id).await?;
    let comments = repo.comments_for(post_id, order).await?;
    Ok(comments.into_iter().map(CommentView::from).collect())
}
