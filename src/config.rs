use std::env;

use crate::models::CommentOrder;

/// Posts shown per index page.
pub const DEFAULT_POSTS_PER_PAGE: u32 = 10;
/// Users shown per users-index page.
pub const DEFAULT_USERS_PER_PAGE: u32 = 30;

/// Session lifetime used when `SESSION_TTL_HOURS` is unset or out of range.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
/// Longest accepted session lifetime (one year).
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

const LOCAL_SESSION_SECRET: &str = "local-session-secret-change-me";

/// AppConfig
///
/// Immutable runtime configuration, loaded once at startup and shared through the
/// application state.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Postgres connection string, or `memory` for the in-process store.
    pub db_url: String,
    pub env: Env,
    /// HMAC secret for session tokens.
    pub session_secret: String,
    /// Always within `1..=MAX_SESSION_TTL_HOURS` when loaded from the environment.
    pub session_ttl_hours: i64,
    /// Base URL used to build activation links.
    pub public_base_url: String,
    /// HTTP endpoint of the mail relay. Required in production; locally, without it,
    /// activation messages are kept in memory and logged.
    pub mail_relay_url: Option<String>,
    pub mail_relay_key: Option<String>,
    pub pagination: PaginationPolicy,
    pub comment_order: CommentOrder,
    pub bind_addr: String,
}

/// Env
///
/// Runtime context. `Local` enables development conveniences (pretty logs, the
/// `x-user-id` bypass, relaxed defaults).
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PaginationPolicy {
    pub posts_per_page: u32,
    pub users_per_page: u32,
}

impl Default for PaginationPolicy {
    fn default() -> Self {
        Self {
            posts_per_page: DEFAULT_POSTS_PER_PAGE,
            users_per_page: DEFAULT_USERS_PER_PAGE,
        }
    }
}

impl Default for AppConfig {
    /// Non-panicking configuration for tests and scaffolding.
    fn default() -> Self {
        Self {
            db_url: "memory".to_string(),
            env: Env::Local,
            session_secret: LOCAL_SESSION_SECRET.to_string(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            public_base_url: "http://localhost:3000".to_string(),
            mail_relay_url: None,
            mail_relay_key: None,
            pagination: PaginationPolicy::default(),
            comment_order: CommentOrder::OldestFirst,
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// The canonical function for initializing the configuration at startup. Every value
    /// comes from an environment variable; the fail-fast principle applies to anything the
    /// server cannot safely run without.
    ///
    /// Optional values that are missing or unparseable fall back to their defaults, and a
    /// `SESSION_TTL_HOURS` outside `1..=MAX_SESSION_TTL_HOURS` is treated as missing, so
    /// session expiry arithmetic can never overflow later.
    ///
    /// # Panics
    /// In production, panics when `DATABASE_URL`, `SESSION_SECRET` or `MAIL_RELAY_URL` is
    /// missing. Without a relay, activation links could only end up in the logs.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };
        let defaults = Self::default();

        // 1. Secrets and infrastructure
        // Production demands explicit values; locally the in-memory store, a fixed
        // secret and the in-memory mailer are used.
        let mail_relay_url = env::var("MAIL_RELAY_URL").ok().filter(|v| !v.is_empty());
        let (db_url, session_secret, mail_relay_url) = match env {
            Env::Production => (
                env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod"),
                env::var("SESSION_SECRET").expect("FATAL: SESSION_SECRET must be set in production."),
                Some(mail_relay_url.expect("FATAL: MAIL_RELAY_URL required in prod")),
            ),
            Env::Local => (
                env::var("DATABASE_URL").unwrap_or(defaults.db_url),
                env::var("SESSION_SECRET").unwrap_or(defaults.session_secret),
                mail_relay_url,
            ),
        };

        // 2. Sessions
        let session_ttl_hours = parse_var("SESSION_TTL_HOURS")
            .filter(|hours| (1..=MAX_SESSION_TTL_HOURS).contains(hours))
            .unwrap_or(DEFAULT_SESSION_TTL_HOURS);

        // 3. Presentation
        let pagination = PaginationPolicy {
            posts_per_page: parse_var("POSTS_PER_PAGE").unwrap_or(DEFAULT_POSTS_PER_PAGE),
            users_per_page: parse_var("USERS_PER_PAGE").unwrap_or(DEFAULT_USERS_PER_PAGE),
        };

        let comment_order = match env::var("COMMENT_ORDER").as_deref() {
            Ok("newest") => CommentOrder::NewestFirst,
            _ => CommentOrder::OldestFirst,
        };

        Self {
            db_url,
            env,
            session_secret,
            session_ttl_hours,
            public_base_url: env::var("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            mail_relay_url,
            mail_relay_key: env::var("MAIL_RELAY_KEY").ok().filter(|v| !v.is_empty()),
            pagination,
            comment_order,
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
