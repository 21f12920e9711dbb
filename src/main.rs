use quillpost::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    mailer::{HttpMailer, MailerState, MockMailer},
    memory::MemoryRepository,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, the store and the mailer, then serves HTTP.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast in production)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise crate-level debug.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "quillpost=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Store
    let repo: RepositoryState = if config.db_url == "memory" {
        tracing::warn!("DATABASE_URL=memory: using the in-process store, data is not persisted");
        Arc::new(MemoryRepository::new())
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.db_url)
            .await
            .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("FATAL: Failed to run database migrations.");

        Arc::new(PostgresRepository::new(pool))
    };

    // 4. Mailer: the relay when configured. `load` guarantees one in production, so the
    // in-memory mailer only ever serves local runs.
    let mailer: MailerState = match &config.mail_relay_url {
        Some(url) => Arc::new(HttpMailer::new(
            url,
            config.mail_relay_key.clone(),
            &config.public_base_url,
        )),
        None => {
            tracing::info!("MAIL_RELAY_URL is not set: activation messages stay in memory");
            Arc::new(MockMailer::new())
        }
    };

    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState {
        repo,
        mailer,
        config,
    });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {}", e);
    }
}
