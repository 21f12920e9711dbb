use quillpost::{
    content::{self, PostCursor},
    error::AppError,
    identity,
    mailer::MockMailer,
    memory::MemoryRepository,
    models::{
        CommentOrder, GUEST_NAME, PageRequest, Post, PostOrder, PostRequest, REDACTION_MARKER,
        RegisterUserRequest,
    },
    repository::Repository,
    validation::FieldErrors,
};
use uuid::Uuid;

// --- Helpers ---

fn post_form(title: &str, body: &str) -> PostRequest {
    PostRequest {
        title: title.to_string(),
        content: body.to_string(),
    }
}

async fn seed_post(repo: &MemoryRepository, title: &str) -> Post {
    content::create_post(repo, post_form(title, "Some content"))
        .await
        .expect("failed to seed post")
}

fn expect_validation<T: std::fmt::Debug>(result: Result<T, AppError>) -> FieldErrors {
    match result {
        Err(AppError::Validation(errors)) => errors,
        other => panic!("expected validation failure, got {:?}", other),
    }
}

fn titles(items: &[quillpost::models::PostSummary]) -> Vec<&str> {
    items.iter().map(|s| s.post.title.as_str()).collect()
}

// --- Posts ---

#[tokio::test]
async fn test_created_post_leads_the_index() {
    let repo = MemoryRepository::new();
    seed_post(&repo, "First").await;
    seed_post(&repo, "Second").await;
    let newest = seed_post(&repo, "Third").await;

    let page = content::list_posts(&repo, PageRequest::new(1, 10), PostOrder::NewestFirst)
        .await
        .unwrap();

    assert_eq!(page.items[0].post.id, newest.id);
    assert_eq!(titles(&page.items), vec!["Third", "Second", "First"]);

    let oldest_first = content::list_posts(&repo, PageRequest::new(1, 10), PostOrder::OldestFirst)
        .await
        .unwrap();
    assert_eq!(titles(&oldest_first.items), vec!["First", "Second", "Third"]);
}

#[tokio::test]
async fn test_index_pages_by_ten() {
    let repo = MemoryRepository::new();
    for i in 0..25 {
        seed_post(&repo, &format!("Post {}", i)).await;
    }

    let first = content::list_posts(&repo, PageRequest::new(1, 10), PostOrder::NewestFirst)
        .await
        .unwrap();
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total, 25);
    assert_eq!(first.total_pages, 3);
    assert!(first.has_next());
    assert_eq!(first.items[0].post.title, "Post 24");

    let last = content::list_posts(&repo, PageRequest::new(3, 10), PostOrder::NewestFirst)
        .await
        .unwrap();
    assert_eq!(last.items.len(), 5);
    assert!(!last.has_next());
    assert_eq!(last.items[4].post.title, "Post 0");

    let beyond = content::list_posts(&repo, PageRequest::new(4, 10), PostOrder::NewestFirst)
        .await
        .unwrap();
    assert!(beyond.items.is_empty());
}

#[tokio::test]
async fn test_cursor_walks_every_page_and_rewinds() {
    let repo = MemoryRepository::new();
    for i in 0..25 {
        seed_post(&repo, &format!("Post {}", i)).await;
    }

    let mut cursor = PostCursor::new(10, PostOrder::NewestFirst);
    let mut sizes = Vec::new();
    while let Some(page) = cursor.next_page(&repo).await.unwrap() {
        sizes.push(page.items.len());
    }
    assert_eq!(sizes, vec![10, 10, 5]);
    assert!(cursor.next_page(&repo).await.unwrap().is_none());

    cursor.rewind();
    let again = cursor.next_page(&repo).await.unwrap().unwrap();
    assert_eq!(again.page, 1);
    assert_eq!(again.items[0].post.title, "Post 24");
}

#[tokio::test]
async fn test_cursor_on_empty_store_yields_nothing() {
    let repo = MemoryRepository::new();
    let mut cursor = PostCursor::new(10, PostOrder::NewestFirst);
    assert!(cursor.next_page(&repo).await.unwrap().is_none());
}

#[tokio::test]
async fn test_post_validation_reports_all_fields() {
    let repo = MemoryRepository::new();

    let result = content::create_post(&repo, post_form(&"x".repeat(content::TITLE_MAX + 1), "")).await;
    let errors = expect_validation(result);
    assert!(errors.has("title", "too_long"));
    assert!(errors.has("content", "blank"));
    assert_eq!(errors.len(), 2);

    let result = content::create_post(&repo, post_form("  ", "text")).await;
    let errors = expect_validation(result);
    assert!(errors.has("title", "blank"));

    assert_eq!(repo.count_posts().await.unwrap(), 0);
}

#[tokio::test]
async fn test_title_at_limit_is_accepted() {
    let repo = MemoryRepository::new();
    let title = "y".repeat(content::TITLE_MAX);
    let post = content::create_post(&repo, post_form(&title, "body")).await.unwrap();
    assert_eq!(post.title.chars().count(), content::TITLE_MAX);
}

#[tokio::test]
async fn test_update_post_changes_fields() {
    let repo = MemoryRepository::new();
    let post = seed_post(&repo, "Draft").await;

    let updated = content::update_post(&repo, post.id, post_form("Final", "Better content"))
        .await
        .unwrap();
    assert_eq!(updated.id, post.id);
    assert_eq!(updated.title, "Final");
    assert_eq!(updated.content, "Better content");
    assert!(updated.updated_at >= post.updated_at);

    let missing = content::update_post(&repo, Uuid::new_v4(), post_form("Final", "x")).await;
    assert!(matches!(missing, Err(AppError::NotFound("Post", _))));
}

#[tokio::test]
async fn test_get_unknown_post_is_not_found() {
    let repo = MemoryRepository::new();
    let result = content::get_post(&repo, Uuid::new_v4(), CommentOrder::OldestFirst).await;
    assert!(matches!(result, Err(AppError::NotFound("Post", _))));
}

#[tokio::test]
async fn test_delete_post_removes_its_comments() {
    let repo = MemoryRepository::new();
    let doomed = seed_post(&repo, "Doomed").await;
    let kept = seed_post(&repo, "Kept").await;

    let gone = content::add_comment(&repo, doomed.id, "bye", None).await.unwrap();
    content::add_comment(&repo, kept.id, "stay", None).await.unwrap();

    content::delete_post(&repo, doomed.id).await.unwrap();

    assert!(repo.get_post(doomed.id).await.unwrap().is_none());
    assert!(repo.get_comment(gone.id).await.unwrap().is_none());
    assert_eq!(repo.count_comments(doomed.id).await.unwrap(), 0);
    assert_eq!(repo.count_comments(kept.id).await.unwrap(), 1);

    let again = content::delete_post(&repo, doomed.id).await;
    assert!(matches!(again, Err(AppError::NotFound(..))));
}

// --- Comments ---

#[tokio::test]
async fn test_comment_on_missing_post_is_not_found() {
    let repo = MemoryRepository::new();
    let result = content::add_comment(&repo, Uuid::new_v4(), "hello", None).await;
    assert!(matches!(result, Err(AppError::NotFound("Post", _))));
}

#[tokio::test]
async fn test_blank_comment_is_rejected() {
    let repo = MemoryRepository::new();
    let post = seed_post(&repo, "Quiet").await;

    let result = content::add_comment(&repo, post.id, "   ", None).await;
    let errors = expect_validation(result);
    assert!(errors.has("body", "blank"));
    assert_eq!(repo.count_comments(post.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_redacted_comment_keeps_its_place() {
    let repo = MemoryRepository::new();
    let post = seed_post(&repo, "Thread").await;

    content::add_comment(&repo, post.id, "before", None).await.unwrap();
    let target = content::add_comment(&repo, post.id, "#deleted#", None).await.unwrap();
    content::add_comment(&repo, post.id, "after", None).await.unwrap();

    let before = content::comments_for(&repo, post.id, CommentOrder::OldestFirst)
        .await
        .unwrap();
    assert_eq!(before[1].body, "#deleted#");
    assert!(!before[1].redacted);

    content::redact_comment(&repo, target.id).await.unwrap();

    let after = content::comments_for(&repo, post.id, CommentOrder::OldestFirst)
        .await
        .unwrap();
    assert_eq!(after.len(), before.len());
    assert_eq!(after[1].id, target.id);
    assert_eq!(after[1].body, REDACTION_MARKER);
    assert!(after[1].redacted);
    assert_eq!(after[0].body, "before");
    assert_eq!(after[2].body, "after");
}

#[tokio::test]
async fn test_redaction_is_idempotent() {
    let repo = MemoryRepository::new();
    let post = seed_post(&repo, "Thread").await;
    let comment = content::add_comment(&repo, post.id, "rude", None).await.unwrap();

    let first = content::redact_comment(&repo, comment.id).await.unwrap();
    let first_at = repo
        .get_comment(comment.id)
        .await
        .unwrap()
        .unwrap()
        .comment
        .redacted_at
        .expect("redaction time not recorded");

    let second = content::redact_comment(&repo, comment.id).await.unwrap();
    let second_at = repo
        .get_comment(comment.id)
        .await
        .unwrap()
        .unwrap()
        .comment
        .redacted_at;

    assert_eq!(first, second);
    assert_eq!(second_at, Some(first_at));
    assert_eq!(repo.count_comments(post.id).await.unwrap(), 1);

    let missing = content::redact_comment(&repo, comment.id + 1000).await;
    assert!(matches!(missing, Err(AppError::NotFound("Comment", _))));
}

#[tokio::test]
async fn test_comments_stay_with_their_post() {
    let repo = MemoryRepository::new();
    let a = seed_post(&repo, "A").await;
    let b = seed_post(&repo, "B").await;

    content::add_comment(&repo, a.id, "on a", None).await.unwrap();
    content::add_comment(&repo, b.id, "on b", None).await.unwrap();
    content::add_comment(&repo, a.id, "also on a", None).await.unwrap();

    let thread = content::comments_for(&repo, a.id, CommentOrder::OldestFirst)
        .await
        .unwrap();
    assert_eq!(thread.len(), 2);
    assert!(thread.iter().all(|c| c.post_id == a.id));

    let newest_first = content::comments_for(&repo, a.id, CommentOrder::NewestFirst)
        .await
        .unwrap();
    assert_eq!(newest_first[0].body, "also on a");

    let detail = content::get_post(&repo, b.id, CommentOrder::OldestFirst).await.unwrap();
    assert_eq!(detail.comment_count, 1);
    assert_eq!(detail.comments[0].body, "on b");
}

#[tokio::test]
async fn test_comment_author_is_named_or_guest() {
    let repo = MemoryRepository::new();
    let mailer = MockMailer::new();
    let registration = identity::register(
        &repo,
        &mailer,
        RegisterUserRequest {
            name: "Joe".to_string(),
            email: "joe@example.com".to_string(),
            password: "foobar".to_string(),
            password_confirmation: "foobar".to_string(),
        },
    )
    .await
    .unwrap();

    let post = seed_post(&repo, "Thread").await;
    content::add_comment(&repo, post.id, "signed", Some(registration.user.id))
        .await
        .unwrap();
    content::add_comment(&repo, post.id, "anonymous", None).await.unwrap();

    let thread = content::comments_for(&repo, post.id, CommentOrder::OldestFirst)
        .await
        .unwrap();
    assert_eq!(thread[0].author, "Joe");
    assert_eq!(thread[0].author_id, Some(registration.user.id));
    assert_eq!(thread[1].author, GUEST_NAME);
    assert_eq!(thread[1].author_id, None);
}

#[tokio::test]
async fn test_index_carries_comment_counts() {
    let repo = MemoryRepository::new();
    let busy = seed_post(&repo, "Busy").await;
    seed_post(&repo, "Quiet").await;
    for text in ["one", "two", "three"] {
        content::add_comment(&repo, busy.id, text, None).await.unwrap();
    }

    let page = content::list_posts(&repo, PageRequest::new(1, 10), PostOrder::OldestFirst)
        .await
        .unwrap();
    assert_eq!(page.items[0].comment_count, 3);
    assert_eq!(page.items[1].comment_count, 0);
}
