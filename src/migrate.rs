use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    if let Some(parent) = config.db.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let pool = db::connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            business_id TEXT NOT NULL UNIQUE,
            customer_name TEXT NOT NULL,
            phone TEXT,
            email TEXT,
            program TEXT NOT NULL,
            work_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'received',
            notes TEXT,
            customer_image TEXT,
            work_image TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_work_date ON records(work_date)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_status ON records(status)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at DESC)")
        .execute(&pool)
        .await?;

    // Image directory is part of "init" so first upload never races mkdir
    std::fs::create_dir_all(&config.images.dir)?;

    pool.close().await;
    Ok(())
}
