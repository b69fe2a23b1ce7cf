use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32, sqlx::Error> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    debug!("Running migration v1: creating posts table");

    // publish_time is fixed-width RFC 3339 UTC so text order is time order.
    // labels holds a JSON array of label strings.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY NOT NULL CHECK (length(id) > 0),
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            publish_time TEXT NOT NULL,
            excerpt TEXT NOT NULL,
            labels TEXT NOT NULL DEFAULT '[]',
            comment_count INTEGER NOT NULL DEFAULT 0 CHECK (comment_count >= 0),
            cover TEXT,
            html_content TEXT,
            content_hash TEXT NOT NULL,
            cached_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_posts_publish_time ON posts(publish_time DESC, id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
