use tracing::info;

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                url TEXT NOT NULL,
                publication_date TEXT NOT NULL,
                source_name TEXT NOT NULL,
                relevance_score REAL NOT NULL,
                latitude REAL,
                longitude REAL
            );
            CREATE INDEX IF NOT EXISTS idx_articles_source ON articles (source_name);
            CREATE INDEX IF NOT EXISTS idx_articles_pub_date ON articles (publication_date);
            CREATE INDEX IF NOT EXISTS idx_articles_score ON articles (relevance_score);
            CREATE INDEX IF NOT EXISTS idx_articles_location ON articles (latitude, longitude);

            -- Category labels, one row per (article, label)
            CREATE TABLE IF NOT EXISTS article_categories (
                article_id TEXT NOT NULL,
                category TEXT NOT NULL,
                PRIMARY KEY (article_id, category),
                FOREIGN KEY (article_id) REFERENCES articles (id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_article_categories_category ON article_categories (category);

            -- Append-only user interaction log
            CREATE TABLE IF NOT EXISTS user_events (
                id TEXT PRIMARY KEY,
                article_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                user_latitude REAL,
                user_longitude REAL
            );
            CREATE INDEX IF NOT EXISTS idx_user_events_article ON user_events (article_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_user_events_timestamp ON user_events (timestamp);
            CREATE INDEX IF NOT EXISTS idx_user_events_type ON user_events (event_type);
            "#,
        )
        .execute(self.pool())
        .await?;

        info!(target: TARGET_DB, "Database schema initialized");
        Ok(())
    }
}
