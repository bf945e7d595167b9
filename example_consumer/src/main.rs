//! Example consumer: serves every table of an existing database as REST resources.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Configure with `RESTAPI_DIALECT`, `RESTAPI_MAIN_DB` and `DATABASE_URL`; a `.env` file is read if present.

use schema_rest::{app_router, ApiSettings, AppState, Dialect, PgExecutor, RestEngine, SqlExecutor, SqliteExecutor};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("schema_rest=info")),
        )
        .init();

    let settings = ApiSettings::from_env()?;
    let database_url = settings
        .database_url
        .clone()
        .ok_or("DATABASE_URL or RESTAPI_DATABASE_URL must be set")?;
    let executor: Arc<dyn SqlExecutor> = match settings.dialect {
        Dialect::Postgres => Arc::new(PgExecutor::connect(&database_url).await?),
        Dialect::Sqlite => Arc::new(SqliteExecutor::connect(&database_url).await?),
        other => return Err(format!("no bundled executor for the {} dialect", other.name()).into()),
    };

    let engine = Arc::new(RestEngine::bootstrap(executor, settings).await?);
    let _refresh = engine.spawn_catalog_refresh();
    let app = app_router(AppState::new(engine));

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
