use crate::{
    AppState, activation, auth,
    content,
    error::{AppError, AppResult, ErrorBody, HOME_PATH},
    extract::{JsonBody, PathParam, QueryParams},
    identity,
    models::{
        CommentView, CreateCommentRequest, LoginRequest, Outcome, Page, PageQuery, Post, PostDetail, PostOrder, PostRequest, PostSummary, RegisterUserRequest, SessionToken,
        UpdateUserRequest, UserProfile,
    },
    policy::{Action, Actor, Resource, ensure},
};
use axum::{Json, extract::State, http::StatusCode};
use uuid::Uuid;

fn post_path(id: Uuid) -> String {
    format!("/posts/{}", id)
}

fn comments_path(post_id: Uuid) -> String {
    format!("/posts/{}#comments", post_id)
}

async fn comment_view(state: &AppState, id: i64) -> AppResult<CommentView> {
    state
        .repo
        .get_comment(id)
        .await?
        .map(CommentView::from)
        .ok_or_else(|| AppError::not_found("Comment", id))
}

// --- Accounts ---

/// signup
///
/// [Public Route] Registers a pending account and mails its activation link.
#[utoipa::path(
    post,
    path = "/signup",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered, activation pending", body = Outcome<UserProfile>),
        (status = 422, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn signup(
    actor: Actor,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterUserRequest>,
) -> AppResult<(StatusCode, Json<Outcome<UserProfile>>)> {
    ensure(&actor, Action::Create, &Resource::User(None))?;

    let registration =
        identity::register(state.repo.as_ref(), state.mailer.as_ref(), payload).await?;

    let outcome = Outcome::data(UserProfile::from(&registration.user))
        .notice("Activation link was sent")
        .redirect(HOME_PATH);
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// activate_account
///
/// [Public Route] Follows an activation link. The token is the credential here: a match
/// activates the account and signs it in, anything else is a 404.
#[utoipa::path(
    get,
    path = "/activate/{token}",
    params(("token" = String, Path, description = "Activation token")),
    responses(
        (status = 200, description = "Activated and signed in", body = Outcome<SessionToken>),
        (status = 404, description = "Unknown or used token", body = ErrorBody)
    )
)]
pub async fn activate_account(
    State(state): State<AppState>,
    PathParam(token): PathParam<String>,
) -> AppResult<Json<Outcome<SessionToken>>> {
    let user = activation::activate(state.repo.as_ref(), &token).await?;
    let session = auth::issue_session(&user, &state.config)?;

    Ok(Json(
        Outcome::data(session)
            .notice("Your account was activated")
            .redirect(HOME_PATH),
    ))
}

/// login
///
/// [Public Route] Exchanges email and password for a session token.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = Outcome<SessionToken>),
        (status = 401, description = "Bad credentials", body = ErrorBody),
        (status = 403, description = "Account not activated", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> AppResult<Json<Outcome<SessionToken>>> {
    let user = identity::authenticate(state.repo.as_ref(), &payload.email, &payload.password).await?;
    let session = auth::issue_session(&user, &state.config)?;
    tracing::info!(user_id = %user.id, "signed in");

    Ok(Json(
        Outcome::data(session)
            .notice("Signed in")
            .redirect(HOME_PATH),
    ))
}

/// get_users
///
/// [Public Route] Users index, paged by the users page size.
#[utoipa::path(
    get,
    path = "/users",
    params(PageQuery),
    responses((status = 200, description = "Users", body = Page<UserProfile>))
)]
pub async fn get_users(
    actor: Actor,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<PageQuery>,
) -> AppResult<Json<Page<UserProfile>>> {
    ensure(&actor, Action::View, &Resource::User(None))?;
    let page = query.request(state.config.pagination.users_per_page);
    Ok(Json(identity::list_users(state.repo.as_ref(), page).await?))
}

/// get_user
///
/// [Public Route] One user's profile.
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_user(
    actor: Actor,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<Json<UserProfile>> {
    ensure(&actor, Action::View, &Resource::User(Some(id)))?;
    Ok(Json(identity::get_profile(state.repo.as_ref(), id).await?))
}

/// update_user
///
/// [Member Route] Edits a profile. Regular users may only edit their own; admins any.
#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = Outcome<UserProfile>),
        (status = 403, description = "Access denied", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody),
        (status = 422, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn update_user(
    actor: Actor,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateUserRequest>,
) -> AppResult<Json<Outcome<UserProfile>>> {
    ensure(&actor, Action::Update, &Resource::User(Some(id)))?;

    let user = identity::update(state.repo.as_ref(), id, payload).await?;
    Ok(Json(
        Outcome::data(UserProfile::from(&user))
            .notice("Profile was updated!")
            .redirect(format!("/users/{}", user.id)),
    ))
}

/// delete_user
///
/// [Member Route] Removes an account. Regular users may only remove their own; admins any.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Deleted", body = Outcome<UserProfile>),
        (status = 403, description = "Access denied", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn delete_user(
    actor: Actor,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<Json<Outcome<UserProfile>>> {
    ensure(&actor, Action::Delete, &Resource::User(Some(id)))?;

    let user = identity::delete(state.repo.as_ref(), id).await?;
    Ok(Json(
        Outcome::data(UserProfile::from(&user))
            .notice("User was deleted!")
            .redirect("/users"),
    ))
}

// --- Posts ---

/// get_posts
///
/// [Public Route] Posts index, newest first, paged by the posts page size.
#[utoipa::path(
    get,
    path = "/posts",
    params(PageQuery),
    responses((status = 200, description = "Posts", body = Page<PostSummary>))
)]
pub async fn get_posts(
    actor: Actor,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<PageQuery>,
) -> AppResult<Json<Page<PostSummary>>> {
    ensure(&actor, Action::View, &Resource::Post)?;
    let page = query.request(state.config.pagination.posts_per_page);
    Ok(Json(
        content::list_posts(state.repo.as_ref(), page, PostOrder::NewestFirst).await?,
    ))
}

/// get_post
///
/// [Public Route] A post with its comment thread.
#[utoipa::path(
    get,
    path = "/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = PostDetail),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_post(
    actor: Actor,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<Json<PostDetail>> {
    ensure(&actor, Action::View, &Resource::Post)?;
    Ok(Json(
        content::get_post(state.repo.as_ref(), id, state.config.comment_order).await?,
    ))
}

/// create_post
///
/// [Admin Route] Publishes a new post.
#[utoipa::path(
    post,
    path = "/posts",
    request_body = PostRequest,
    responses(
        (status = 201, description = "Created", body = Outcome<Post>),
        (status = 403, description = "Access denied", body = ErrorBody),
        (status = 422, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn create_post(
    actor: Actor,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<PostRequest>,
) -> AppResult<(StatusCode, Json<Outcome<Post>>)> {
    ensure(&actor, Action::Create, &Resource::Post)?;

    let post = content::create_post(state.repo.as_ref(), payload).await?;
    let redirect = post_path(post.id);
    Ok((
        StatusCode::CREATED,
        Json(
            Outcome::data(post)
                .notice("New post created!")
                .redirect(redirect),
        ),
    ))
}

/// update_post
///
/// [Admin Route] Edits a post's title and content.
#[utoipa::path(
    put,
    path = "/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = PostRequest,
    responses(
        (status = 200, description = "Updated", body = Outcome<Post>),
        (status = 403, description = "Access denied", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody),
        (status = 422, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn update_post(
    actor: Actor,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<PostRequest>,
) -> AppResult<Json<Outcome<Post>>> {
    ensure(&actor, Action::Update, &Resource::Post)?;

    let post = content::update_post(state.repo.as_ref(), id, payload).await?;
    let redirect = post_path(post.id);
    Ok(Json(
        Outcome::data(post)
            .notice("Post updated!")
            .redirect(redirect),
    ))
}

/// delete_post
///
/// [Admin Route] Deletes a post together with its comments.
#[utoipa::path(
    delete,
    path = "/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Deleted", body = Outcome<Post>),
        (status = 403, description = "Access denied", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn delete_post(
    actor: Actor,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<Json<Outcome<Post>>> {
    ensure(&actor, Action::Delete, &Resource::Post)?;

    let post = content::delete_post(state.repo.as_ref(), id).await?;
    Ok(Json(
        Outcome::data(post)
            .notice("Post was deleted!")
            .redirect(HOME_PATH),
    ))
}

// --- Comments ---

/// get_comments
///
/// [Public Route] The comment thread of one post.
#[utoipa::path(
    get,
    path = "/posts/{id}/comments",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Comments", body = [CommentView]),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_comments(
    actor: Actor,
    State(state): State<AppState>,
    PathParam(post_id): PathParam<Uuid>,
) -> AppResult<Json<Vec<CommentView>>> {
    ensure(&actor, Action::View, &Resource::Comment)?;
    Ok(Json(
        content::comments_for(state.repo.as_ref(), post_id, state.config.comment_order).await?,
    ))
}

/// add_comment
///
/// [Public Route] Comments on a post. Signed-in actors are recorded as the author;
/// guests are shown as "Guest".
#[utoipa::path(
    post,
    path = "/posts/{id}/comments",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment Added", body = Outcome<CommentView>),
        (status = 404, description = "Not Found", body = ErrorBody),
        (status = 422, description = "Invalid form", body = ErrorBody)
    )
)]
pub async fn add_comment(
    actor: Actor,
    State(state): State<AppState>,
    PathParam(post_id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Outcome<CommentView>>)> {
    ensure(&actor, Action::Create, &Resource::Comment)?;

    let comment =
        content::add_comment(state.repo.as_ref(), post_id, &payload.body, actor.user_id()).await?;
    let view = comment_view(&state, comment.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(
            Outcome::data(view)
                .notice("Comment was added!")
                .redirect(comments_path(post_id)),
        ),
    ))
}

/// delete_comment
///
/// [Admin Route] Redacts a comment. The comment keeps its place in the thread; its text
/// is replaced by the redaction marker.
#[utoipa::path(
    delete,
    path = "/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 200, description = "Redacted", body = Outcome<CommentView>),
        (status = 403, description = "Access denied", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn delete_comment(
    actor: Actor,
    State(state): State<AppState>,
    PathParam(id): PathParam<i64>,
) -> AppResult<Json<Outcome<CommentView>>> {
    ensure(&actor, Action::Delete, &Resource::Comment)?;

    let view = content::redact_comment(state.repo.as_ref(), id).await?;
    let redirect = comments_path(view.post_id);
    Ok(Json(
        Outcome::data(view)
            .notice("Comment was deleted!")
            .redirect(redirect),
    ))
}
