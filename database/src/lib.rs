//! SQLite persistence for search keywords and seen job postings.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use upwatch_core::{CoreError, DatabaseError, JobPosting, Keyword};


pub struct Database {
    pool: SqlitePool,
}

#[derive(Debug, FromRow)]
struct KeywordRow {
    id: i64,
    keyword: String,
    processed: bool,
}

impl From<KeywordRow> for Keyword {
    fn from(row: KeywordRow) -> Self {
        Self {
            id: row.id,
            text: row.keyword,
            processed: row.processed,
        }
    }
}

#[derive(Debug, FromRow)]
struct PostingRow {
    id: String,
    title: String,
    url: String,
    description: String,
    posted_at: String,
    category: String,
    skills: String,
    price_type: String,
    price_value: String,
    keyword: String,
}

impl PostingRow {
    fn into_posting(self) -> Result<JobPosting, CoreError> {
        let posted_at = DateTime::parse_from_rfc3339(&self.posted_at)
            .map_err(|e| DatabaseError::CorruptRecord {
                id: self.id.clone(),
                details: format!("invalid posted_at: {}", e),
            })?
            .with_timezone(&Utc);

        let skills: Vec<String> =
            serde_json::from_str(&self.skills).map_err(|e| DatabaseError::CorruptRecord {
                id: self.id.clone(),
                details: format!("invalid skills JSON: {}", e),
            })?;

        Ok(JobPosting {
            id: self.id,
            title: self.title,
            url: self.url,
            description: self.description,
            posted_at,
            category: self.category,
            skills,
            price_type: self.price_type,
            price_value: self.price_value,
            source_keyword: self.keyword,
        })
    }
}

impl Database {
    /// Open (creating if needed) the database at `database_url`,
    /// e.g. `sqlite://upwatch.db`.
    pub async fn connect(database_url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // The pipeline is strictly sequential.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        debug!("Connected to {}", database_url);
        Ok(Self { pool })
    }

    /// Connect and bring the schema up to date.
    pub async fn open(database_url: &str) -> Result<Self, CoreError> {
        let db = Self::connect(database_url).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS keywords (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                keyword TEXT NOT NULL UNIQUE,
                processed INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_keywords_processed ON keywords(processed);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::MigrationFailed {
            migration: format!("keywords: {}", e),
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_postings (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                description TEXT NOT NULL,
                posted_at TEXT NOT NULL,
                category TEXT NOT NULL,
                skills TEXT NOT NULL DEFAULT '[]',
                price_type TEXT NOT NULL,
                price_value TEXT NOT NULL,
                keyword TEXT NOT NULL,
                inserted_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_job_postings_keyword ON job_postings(keyword);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::MigrationFailed {
            migration: format!("job_postings: {}", e),
        })?;

        Ok(())
    }

    // -- keywords --------------------------------------------------------

    /// Insert each keyword that is not stored yet. Existing rows keep their
    /// `processed` flag. Returns how many were new.
    pub async fn seed_keywords(&self, keywords: &[String]) -> Result<u64, CoreError> {
        let mut inserted = 0;
        for keyword in keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
            inserted += sqlx::query(
                "INSERT INTO keywords (keyword, processed) VALUES (?, 0) ON CONFLICT(keyword) DO NOTHING",
            )
            .bind(keyword)
            .execute(&self.pool)
            .await?
            .rows_affected();
        }

        if inserted > 0 {
            info!("Seeded {} new keywords", inserted);
        }
        Ok(inserted)
    }

    pub async fn all_keywords(&self) -> Result<Vec<Keyword>, CoreError> {
        let rows: Vec<KeywordRow> =
            sqlx::query_as("SELECT id, keyword, processed FROM keywords ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Keyword::from).collect())
    }

    pub async fn unprocessed_keywords(&self) -> Result<Vec<Keyword>, CoreError> {
        let rows: Vec<KeywordRow> = sqlx::query_as(
            "SELECT id, keyword, processed FROM keywords WHERE processed = 0 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Keyword::from).collect())
    }

    pub async fn mark_keyword_processed(&self, id: i64) -> Result<(), CoreError> {
        sqlx::query("UPDATE keywords SET processed = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_unprocessed_keywords(&self) -> Result<i64, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM keywords WHERE processed = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Flag every keyword unprocessed again. Returns the number of rows touched.
    pub async fn reset_keywords(&self) -> Result<u64, CoreError> {
        let result = sqlx::query("UPDATE keywords SET processed = 0")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // -- postings --------------------------------------------------------

    pub async fn posting_exists(&self, id: &str) -> Result<bool, CoreError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM job_postings WHERE id = ? LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn find_posting(&self, id: &str) -> Result<Option<JobPosting>, CoreError> {
        let row: Option<PostingRow> = sqlx::query_as(
            r#"
            SELECT id, title, url, description, posted_at, category, skills,
                   price_type, price_value, keyword
            FROM job_postings
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PostingRow::into_posting).transpose()
    }

    /// Insert a posting seen for the first time. A second insert of the
    /// same id is a [`DatabaseError::ConstraintViolation`].
    pub async fn insert_posting(&self, posting: &JobPosting) -> Result<(), CoreError> {
        let skills = serde_json::to_string(&posting.skills)?;

        sqlx::query(
            r#"
            INSERT INTO job_postings (
                id, title, url, description, posted_at, category, skills,
                price_type, price_value, keyword, inserted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&posting.id)
        .bind(&posting.title)
        .bind(&posting.url)
        .bind(&posting.description)
        .bind(posting.posted_at.to_rfc3339())
        .bind(&posting.category)
        .bind(skills)
        .bind(&posting.price_type)
        .bind(&posting.price_value)
        .bind(&posting.source_keyword)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                CoreError::Database(DatabaseError::ConstraintViolation {
                    constraint: format!("job_postings.id = {}", posting.id),
                })
            }
            other => CoreError::from(other),
        })?;

        Ok(())
    }

    pub async fn count_postings(&self) -> Result<i64, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_postings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
