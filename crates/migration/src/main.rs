use sea_orm_migration::prelude::*;
use std::env;

#[tokio::main]
async fn main() {
    // Compose DATABASE_URL from the individual DB_* variables when the
    // caller did not provide one directly.
    if env::var("DATABASE_URL").is_err() {
        let host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".into());
        let port = env::var("DB_PORT").unwrap_or_else(|_| "5432".into());
        let user = env::var("DB_USER").unwrap_or_else(|_| "postgres".into());
        let password = env::var("DB_PASSWORD").unwrap_or_default();
        let name = env::var("DB_NAME").unwrap_or_else(|_| "noraneko_id".into());
        let ssl_mode = env::var("DB_SSL_MODE").unwrap_or_else(|_| "disable".into());
        unsafe {
            env::set_var(
                "DATABASE_URL",
                format!("postgres://{user}:{password}@{host}:{port}/{name}?sslmode={ssl_mode}"),
            );
        }
    }
    cli::run_cli(migration::Migrator).await;
}
