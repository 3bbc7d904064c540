//! Example consumer: serves an admin described by a config directory.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! `ADMIN_CONFIG_DIR` points at the JSON documents (default `./admin`). With `DATABASE_URL`
//! set the views are backed by PostgreSQL, otherwise by an in-memory store.

use adminkit::{common_routes, init_tracing, Admin, AdminConfig, AdminSettings, MemoryBackend, ModelBackend, PgBackend};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("adminkit=info,example_consumer=info");

    let settings = Arc::new(AdminSettings::from_env());
    let config_dir = std::env::var("ADMIN_CONFIG_DIR").unwrap_or_else(|_| "admin".into());
    let config = AdminConfig::from_dir(&config_dir).await?;

    let backend: Arc<dyn ModelBackend> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?;
            Arc::new(PgBackend::new(pool))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, using in-memory backend");
            Arc::new(MemoryBackend::new())
        }
    };

    let admin = Admin::from_config(settings.clone(), &config, backend)?;
    let app = common_routes().merge(admin.router());
    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("admin listening on http://127.0.0.1:{}{}/", port, settings.url_prefix);
    axum::serve(listener, app).await?;
    Ok(())
}
