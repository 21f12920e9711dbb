use quillpost::{
    AppConfig, AppState, create_router,
    mailer::{MailerState, MockMailer},
    memory::MemoryRepository,
    models::{REDACTION_MARKER, Role},
    repository::{Repository, RepositoryState},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

pub struct TestApp {
    pub address: String,
    pub repo: Arc<MemoryRepository>,
    pub mailer: MockMailer,
    pub client: reqwest::Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Signs up, follows the mailed activation link and returns `(user id, session token)`.
    async fn activated_member(&self, name: &str, email: &str) -> (Uuid, String) {
        let response = self
            .client
            .post(self.url("/signup"))
            .json(&json!({
                "name": name,
                "email": email,
                "password": "foobar",
                "password_confirmation": "foobar"
            }))
            .send()
            .await
            .expect("signup request failed");
        assert_eq!(response.status(), 201);

        let token = self
            .mailer
            .last_to(email)
            .await
            .expect("no activation message")
            .token;
        let response = self
            .client
            .get(self.url(&format!("/activate/{}", token)))
            .send()
            .await
            .expect("activation request failed");
        assert_eq!(response.status(), 200);

        let body: Value = response.json().await.unwrap();
        let id = Uuid::parse_str(body["data"]["user"]["id"].as_str().unwrap()).unwrap();
        let session = body["data"]["token"].as_str().unwrap().to_string();
        (id, session)
    }
}

async fn spawn_app() -> TestApp {
    let repo = Arc::new(MemoryRepository::new());
    let mailer = MockMailer::new();

    let state = AppState {
        repo: repo.clone() as RepositoryState,
        mailer: Arc::new(mailer.clone()) as MailerState,
        config: AppConfig::default(),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        repo,
        mailer,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/health")).send().await.expect("req fail");
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app().await;
    let response = app
        .client
        .get(app.url("/api-docs/openapi.json"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let doc: Value = response.json().await.unwrap();
    assert!(doc["paths"]["/signup"].is_object());
}

#[tokio::test]
async fn test_signup_activate_login_flow() {
    let app = spawn_app().await;
    let (joe_id, _) = app.activated_member("Joe", "example@example.com").await;

    // The link is single-use.
    let token_reuse = app.mailer.last_to("example@example.com").await.unwrap().token;
    let replay = app
        .client
        .get(app.url(&format!("/activate/{}", token_reuse)))
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), 404);

    let login = app
        .client
        .post(app.url("/login"))
        .json(&json!({ "email": "Example@Example.com", "password": "foobar" }))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), 200);
    let body: Value = login.json().await.unwrap();
    assert_eq!(body["notice"], "Signed in");
    assert_eq!(body["data"]["user"]["id"], joe_id.to_string());
    assert_eq!(body["data"]["user"]["state"], "active");

    let bad = app
        .client
        .post(app.url("/login"))
        .json(&json!({ "email": "example@example.com", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 401);
}

#[tokio::test]
async fn test_pending_account_cannot_sign_in() {
    let app = spawn_app().await;
    let response = app
        .client
        .post(app.url("/signup"))
        .json(&json!({
            "name": "Joe",
            "email": "joe@example.com",
            "password": "foobar",
            "password_confirmation": "foobar"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["notice"], "Activation link was sent");
    assert_eq!(body["data"]["state"], "pending");

    let login = app
        .client
        .post(app.url("/login"))
        .json(&json!({ "email": "joe@example.com", "password": "foobar" }))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), 403);
}

#[tokio::test]
async fn test_invalid_signup_reports_every_field() {
    let app = spawn_app().await;
    let response = app
        .client
        .post(app.url("/signup"))
        .json(&json!({
            "name": "a",
            "email": "example.example.com",
            "password": "",
            "password_confirmation": ""
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    let body: Value = response.json().await.unwrap();
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    for field in ["name", "email", "password", "password_confirmation"] {
        assert!(fields.contains(&field), "missing error for {}", field);
    }
    assert!(app.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_guest_post_deletion_is_refused() {
    let app = spawn_app().await;
    let (admin_id, _) = app.activated_member("Ada", "ada@example.com").await;
    assert!(app.repo.set_role(admin_id, Role::Admin).await);

    let created = app
        .client
        .post(app.url("/posts"))
        .header("x-user-id", admin_id.to_string())
        .json(&json!({ "title": "Hello", "content": "World" }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let created: Value = created.json().await.unwrap();
    let post_id = created["data"]["id"].as_str().unwrap().to_string();

    let denied = app
        .client
        .delete(app.url(&format!("/posts/{}", post_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);
    let body: Value = denied.json().await.unwrap();
    assert_eq!(body["alert"], "Access denied!");
    assert_eq!(body["redirect_to"], "/");

    let index: Value = app
        .client
        .get(app.url("/posts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(index["total"], 1);
}

#[tokio::test]
async fn test_session_token_identifies_member() {
    let app = spawn_app().await;
    let (joe_id, joe_session) = app.activated_member("Joe", "joe@example.com").await;
    let (ann_id, _) = app.activated_member("Ann", "ann@example.com").await;

    let own = app
        .client
        .put(app.url(&format!("/users/{}", joe_id)))
        .bearer_auth(&joe_session)
        .json(&json!({ "name": "Joseph", "email": "joe@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(own.status(), 200);
    let body: Value = own.json().await.unwrap();
    assert_eq!(body["data"]["name"], "Joseph");

    let other = app
        .client
        .put(app.url(&format!("/users/{}", ann_id)))
        .bearer_auth(&joe_session)
        .json(&json!({ "name": "Pwned", "email": "ann@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(other.status(), 403);

    // A forged token is just a guest.
    let forged = app
        .client
        .put(app.url(&format!("/users/{}", joe_id)))
        .bearer_auth("not.a.token")
        .json(&json!({ "name": "Joe", "email": "joe@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), 403);
}

#[tokio::test]
async fn test_pending_admin_acts_as_guest() {
    let app = spawn_app().await;
    app.client
        .post(app.url("/signup"))
        .json(&json!({
            "name": "Ada",
            "email": "ada@example.com",
            "password": "foobar",
            "password_confirmation": "foobar"
        }))
        .send()
        .await
        .unwrap();

    let pending = app
        .repo
        .find_user_by_email("ada@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(app.repo.set_role(pending.id, Role::Admin).await);

    let response = app
        .client
        .post(app.url("/posts"))
        .header("x-user-id", pending.id.to_string())
        .json(&json!({ "title": "Too early", "content": "Not yet" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_comment_thread_round_trip() {
    let app = spawn_app().await;
    let (admin_id, admin_session) = app.activated_member("Ada", "ada@example.com").await;
    assert!(app.repo.set_role(admin_id, Role::Admin).await);

    let created: Value = app
        .client
        .post(app.url("/posts"))
        .bearer_auth(&admin_session)
        .json(&json!({ "title": "Thread", "content": "Discuss" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let post_id = created["data"]["id"].as_str().unwrap().to_string();

    let comment = app
        .client
        .post(app.url(&format!("/posts/{}/comments", post_id)))
        .json(&json!({ "body": "#deleted#" }))
        .send()
        .await
        .unwrap();
    assert_eq!(comment.status(), 201);
    let comment: Value = comment.json().await.unwrap();
    assert_eq!(comment["data"]["author"], "Guest");
    let comment_id = comment["data"]["id"].as_i64().unwrap();

    let redacted = app
        .client
        .delete(app.url(&format!("/comments/{}", comment_id)))
        .bearer_auth(&admin_session)
        .send()
        .await
        .unwrap();
    assert_eq!(redacted.status(), 200);

    let detail: Value = app
        .client
        .get(app.url(&format!("/posts/{}", post_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["comment_count"], 1);
    assert_eq!(detail["comments"][0]["body"], REDACTION_MARKER);
    assert_eq!(detail["comments"][0]["redacted"], true);
}

#[tokio::test]
async fn test_malformed_json_is_answered_with_error_body() {
    let app = spawn_app().await;
    let response = app
        .client
        .post(app.url("/signup"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert!(body["alert"].as_str().unwrap().starts_with("The request could not be read"));
    assert!(body["redirect_to"].is_null());
    assert_eq!(body["errors"], json!([]));
    assert!(app.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_unparseable_id_is_not_found() {
    let app = spawn_app().await;
    for (method, path) in [
        (reqwest::Method::DELETE, "/posts/not-a-uuid"),
        (reqwest::Method::GET, "/users/42"),
        (reqwest::Method::DELETE, "/comments/abc"),
    ] {
        let response = app
            .client
            .request(method, app.url(path))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404, "{}", path);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["alert"], "Resource not found", "{}", path);
        assert_eq!(body["errors"], json!([]));
    }
}

#[tokio::test]
async fn test_page_query_is_lenient_but_typed() {
    let app = spawn_app().await;

    let negative = app.client.get(app.url("/posts?page=-1")).send().await.unwrap();
    assert_eq!(negative.status(), 200);
    let page: Value = negative.json().await.unwrap();
    assert_eq!(page["page"], 1);

    let garbage = app.client.get(app.url("/users?page=two")).send().await.unwrap();
    assert_eq!(garbage.status(), 400);
    let body: Value = garbage.json().await.unwrap();
    assert!(body["alert"].as_str().unwrap().starts_with("The request could not be read"));
    assert_eq!(body["errors"], json!([]));
}
