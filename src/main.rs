use std::sync::Arc;

use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod database;
mod error;
mod events;
mod models;
mod routes;
mod state;

use config::Config;
use events::EventBus;
use state::AppState;

#[tokio::main]
async fn main() {
    // Load environment from a .env file when present
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().expect("DATABASE_URL and JWT_SECRET must be set");

    // Connection pool + migrations
    let pool = database::create_database_connection(&config.database_url)
        .await
        .expect("Failed to connect to PostgreSQL");
    database::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    tracing::info!("database connected and migrations applied");

    // Process-wide change bus: the write coordinator publishes, websocket
    // clients subscribe. Lives for the whole process.
    let bus = Arc::new(EventBus::new(256));

    let state = AppState {
        db: pool,
        bus,
        auth_keys: auth::AuthKeys::new(&config.jwt_secret),
    };

    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!("server running at http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
