use sqlx::{SqliteConnection, SqlitePool};

use super::models::{CachedPostRow, PostColumns, UpsertSummary};
use super::StorageError;
use crate::model::PostRecord;

fn failed(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StorageError {
    move |source| StorageError::Query { operation, source }
}

// ========== Writes ==========

/// Insert or overwrite every post inside one transaction.
///
/// Rows whose content hash matches the incoming post are left untouched.
pub async fn upsert_posts(
    pool: &SqlitePool,
    posts: &[PostRecord],
) -> Result<UpsertSummary, StorageError> {
    let mut tx = pool.begin().await.map_err(failed("begin upsert"))?;
    let mut summary = UpsertSummary::default();

    for post in posts {
        let columns = PostColumns::new(post);

        match get_content_hash(&mut *tx, post.id()).await? {
            None => {
                insert_post(&mut *tx, &columns).await?;
                summary.inserted += 1;
            }
            Some(existing) if existing == columns.content_hash => {
                summary.unchanged += 1;
            }
            Some(_) => {
                update_post(&mut *tx, &columns).await?;
                summary.updated += 1;
            }
        }
    }

    tx.commit().await.map_err(failed("commit upsert"))?;

    Ok(summary)
}

async fn get_content_hash(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<String>, StorageError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT content_hash FROM posts WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(failed("read content hash"))?;

    Ok(row.map(|(hash,)| hash))
}

async fn insert_post(
    conn: &mut SqliteConnection,
    columns: &PostColumns<'_>,
) -> Result<(), StorageError> {
    let post = columns.post;
    sqlx::query(
        r"
        INSERT INTO posts (id, title, author, publish_time, excerpt, labels,
                           comment_count, cover, html_content, content_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(post.id())
    .bind(post.title())
    .bind(post.author())
    .bind(&columns.publish_time)
    .bind(post.excerpt())
    .bind(&columns.labels)
    .bind(i64::from(post.comment_count()))
    .bind(post.cover().map(|c| c.as_str()))
    .bind(post.html_content())
    .bind(&columns.content_hash)
    .execute(conn)
    .await
    .map_err(failed("insert post"))?;

    Ok(())
}

async fn update_post(
    conn: &mut SqliteConnection,
    columns: &PostColumns<'_>,
) -> Result<(), StorageError> {
    let post = columns.post;
    sqlx::query(
        r"
        UPDATE posts
        SET title = ?, author = ?, publish_time = ?, excerpt = ?, labels = ?,
            comment_count = ?, cover = ?, html_content = ?, content_hash = ?,
            cached_at = datetime('now')
        WHERE id = ?
        ",
    )
    .bind(post.title())
    .bind(post.author())
    .bind(&columns.publish_time)
    .bind(post.excerpt())
    .bind(&columns.labels)
    .bind(i64::from(post.comment_count()))
    .bind(post.cover().map(|c| c.as_str()))
    .bind(post.html_content())
    .bind(&columns.content_hash)
    .bind(post.id())
    .execute(conn)
    .await
    .map_err(failed("update post"))?;

    Ok(())
}

/// Delete every cached post, returning how many rows were removed.
pub async fn delete_all_posts(pool: &SqlitePool) -> Result<u64, StorageError> {
    let result = sqlx::query("DELETE FROM posts")
        .execute(pool)
        .await
        .map_err(failed("clear posts"))?;

    Ok(result.rows_affected())
}

// ========== Reads ==========

/// All cached posts, newest first; ties broken by id.
pub async fn get_all_posts(pool: &SqlitePool) -> Result<Vec<PostRecord>, StorageError> {
    let rows: Vec<CachedPostRow> =
        sqlx::query_as("SELECT * FROM posts ORDER BY publish_time DESC, id ASC")
            .fetch_all(pool)
            .await
            .map_err(failed("fetch posts"))?;

    rows.into_iter().map(CachedPostRow::into_record).collect()
}

/// One window of posts in the same order as [`get_all_posts`].
pub async fn get_posts_page(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> Result<Vec<PostRecord>, StorageError> {
    let rows: Vec<CachedPostRow> = sqlx::query_as(
        "SELECT * FROM posts ORDER BY publish_time DESC, id ASC LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(failed("fetch posts page"))?;

    rows.into_iter().map(CachedPostRow::into_record).collect()
}

/// Get a post by its id.
pub async fn get_post(pool: &SqlitePool, id: &str) -> Result<Option<PostRecord>, StorageError> {
    let row: Option<CachedPostRow> = sqlx::query_as("SELECT * FROM posts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(failed("fetch post"))?;

    row.map(CachedPostRow::into_record).transpose()
}

/// Count cached posts.
pub async fn count_posts(pool: &SqlitePool) -> Result<i64, StorageError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
        .fetch_one(pool)
        .await
        .map_err(failed("count posts"))?;

    Ok(count)
}
