use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::db::PgStore;

/// Session keys written by the auth service that shares this session store
pub const SESSION_KEY_USER_ID: &str = "user_id";
pub const SESSION_KEY_ROLE: &str = "role";

/// Creates a session layer for Axum
pub async fn create_session_layer(
    pool: PgPool,
    base_url: &str,
) -> Result<SessionManagerLayer<PostgresStore>, sqlx::Error> {
    let session_store = PostgresStore::new(pool);
    session_store.migrate().await?;

    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(base_url.starts_with("https://"))
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(24)));

    Ok(session_layer)
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: PgStore,
}
