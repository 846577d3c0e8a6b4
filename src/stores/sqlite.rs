use crate::error::AppError;
use crate::metadata::{ImageDetail, ImageId, ImageRecord};
use crate::store::MetadataStore;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;

const COLUMNS: &str =
    "image_id, original_url, like_cnt, width, height, src_url, caption, cloud_url, status";

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS image (
        image_id INTEGER PRIMARY KEY,
        original_url TEXT,
        like_cnt INTEGER NOT NULL DEFAULT 0 CHECK (like_cnt >= 0),
        width INTEGER,
        height INTEGER,
        src_url TEXT,
        caption TEXT,
        cloud_url TEXT,
        status TEXT
    )",
    "CREATE TABLE IF NOT EXISTS tag (
        tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
        tag_name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS image_tag (
        image_id INTEGER NOT NULL REFERENCES image(image_id),
        tag_id INTEGER NOT NULL REFERENCES tag(tag_id),
        PRIMARY KEY (image_id, tag_id)
    )",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        log::debug!("Opening SQLite metadata store at {}", database_url);
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // An in-memory database lives only as long as its connection.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        log::trace!("SQLite pool ready.");
        Ok(Self { pool })
    }
}

fn select_in<'a>(ids: &'a [ImageId]) -> QueryBuilder<'a, Sqlite> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM image WHERE image_id IN (", COLUMNS));
    {
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
    }
    qb.push(")");
    qb
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn ensure_schema(&self) -> Result<(), AppError> {
        log::debug!("Ensuring SQLite schema exists.");
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn upsert_image(&self, detail: ImageDetail) -> Result<(), AppError> {
        let image = detail.image;
        log::trace!("Upserting image {} into SQLite store", image.image_id);
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO image ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(image_id) DO UPDATE SET
                original_url = excluded.original_url,
                like_cnt = excluded.like_cnt,
                width = excluded.width,
                height = excluded.height,
                src_url = excluded.src_url,
                caption = excluded.caption,
                cloud_url = excluded.cloud_url,
                status = excluded.status",
            COLUMNS
        ))
        .bind(image.image_id)
        .bind(&image.original_url)
        .bind(image.like_cnt.max(0))
        .bind(image.width)
        .bind(image.height)
        .bind(&image.src_url)
        .bind(&image.caption)
        .bind(&image.cloud_url)
        .bind(&image.status)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM image_tag WHERE image_id = ?")
            .bind(image.image_id)
            .execute(&mut *tx)
            .await?;

        for tag in &detail.tags {
            sqlx::query("INSERT INTO tag (tag_name) VALUES (?) ON CONFLICT(tag_name) DO NOTHING")
                .bind(tag)
                .execute(&mut *tx)
                .await?;
            let tag_id: i64 = sqlx::query_scalar("SELECT tag_id FROM tag WHERE tag_name = ?")
                .bind(tag)
                .fetch_one(&mut *tx)
                .await?;
            sqlx::query("INSERT OR IGNORE INTO image_tag (image_id, tag_id) VALUES (?, ?)")
                .bind(image.image_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: ImageId) -> Result<Option<ImageRecord>, AppError> {
        let record = sqlx::query_as::<_, ImageRecord>(&format!(
            "SELECT {} FROM image WHERE image_id = ?",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_tags(&self, id: ImageId) -> Result<Vec<String>, AppError> {
        let tags = sqlx::query_scalar::<_, String>(
            "SELECT t.tag_name FROM image_tag it
             JOIN tag t ON t.tag_id = it.tag_id
             WHERE it.image_id = ?
             ORDER BY t.tag_name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tags)
    }

    async fn find_many(&self, ids: &[ImageId]) -> Result<Vec<ImageRecord>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = select_in(ids);
        Ok(qb.build_query_as::<ImageRecord>().fetch_all(&self.pool).await?)
    }

    async fn find_many_by_likes(
        &self,
        ids: &[ImageId],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ImageRecord>, AppError> {
        if ids.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let mut qb = select_in(ids);
        qb.push(" ORDER BY like_cnt DESC, image_id ASC LIMIT ");
        qb.push_bind(limit as i64);
        qb.push(" OFFSET ");
        qb.push_bind(offset as i64);
        Ok(qb.build_query_as::<ImageRecord>().fetch_all(&self.pool).await?)
    }

    async fn top_by_likes(&self, limit: usize) -> Result<Vec<ImageRecord>, AppError> {
        let records = sqlx::query_as::<_, ImageRecord>(&format!(
            "SELECT {} FROM image ORDER BY like_cnt DESC, image_id ASC LIMIT ?",
            COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn increment_likes(&self, id: ImageId) -> Result<Option<ImageRecord>, AppError> {
        let record = sqlx::query_as::<_, ImageRecord>(&format!(
            "UPDATE image SET like_cnt = like_cnt + 1 WHERE image_id = ? RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn decrement_likes(&self, id: ImageId) -> Result<Option<ImageRecord>, AppError> {
        // The floor is evaluated inside the UPDATE, so concurrent unlikes cannot
        // observe a stale count.
        let record = sqlx::query_as::<_, ImageRecord>(&format!(
            "UPDATE image SET like_cnt = MAX(like_cnt - 1, 0) WHERE image_id = ? RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }
}
