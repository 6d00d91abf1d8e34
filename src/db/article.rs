use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::collections::HashMap;
use tracing::{debug, instrument};

use super::core::Database;
use crate::geo::{bounding_box, haversine_distance};
use crate::models::Article;
use crate::TARGET_DB;

#[derive(FromRow)]
struct ArticleRow {
    id: String,
    title: String,
    description: String,
    url: String,
    publication_date: String,
    source_name: String,
    relevance_score: f64,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl ArticleRow {
    fn into_article(self, categories: Vec<String>) -> Article {
        let publication_date = DateTime::parse_from_rfc3339(&self.publication_date)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_default();

        Article {
            id: self.id,
            title: self.title,
            description: self.description,
            url: self.url,
            publication_date,
            source_name: self.source_name,
            categories,
            relevance_score: self.relevance_score,
            latitude: self.latitude,
            longitude: self.longitude,
            llm_summary: None,
            distance_km: None,
        }
    }
}

impl Database {
    /// Insert or replace one article together with its category labels.
    /// Used by the seeding path and tests; retrieval never mutates.
    #[instrument(target = "db_query", level = "debug", skip(self, article))]
    pub async fn add_article(&self, article: &Article) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO articles
                (id, title, description, url, publication_date, source_name,
                 relevance_score, latitude, longitude)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                url = excluded.url,
                publication_date = excluded.publication_date,
                source_name = excluded.source_name,
                relevance_score = excluded.relevance_score,
                latitude = excluded.latitude,
                longitude = excluded.longitude
            "#,
        )
        .bind(&article.id)
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.url)
        .bind(article.publication_date.to_rfc3339())
        .bind(&article.source_name)
        .bind(article.relevance_score)
        .bind(article.latitude)
        .bind(article.longitude)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM article_categories WHERE article_id = ?")
            .bind(&article.id)
            .execute(&mut *tx)
            .await?;

        for category in &article.categories {
            sqlx::query("INSERT OR IGNORE INTO article_categories (article_id, category) VALUES (?, ?)")
                .bind(&article.id)
                .bind(category)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(target: TARGET_DB, "Stored article {}", article.id);
        Ok(())
    }

    /// Articles carrying the given category label (case-insensitive),
    /// newest first. Returns the page plus the pre-limit match count.
    pub async fn articles_by_category(
        &self,
        category: &str,
        limit: i64,
    ) -> Result<(Vec<Article>, i64), sqlx::Error> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT DISTINCT a.id, a.title, a.description, a.url, a.publication_date,
                   a.source_name, a.relevance_score, a.latitude, a.longitude
            FROM articles a
            JOIN article_categories c ON c.article_id = a.id
            WHERE LOWER(c.category) = LOWER(?1)
            ORDER BY a.publication_date DESC
            LIMIT ?2
            "#,
        )
        .bind(category)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT c.article_id)
            FROM article_categories c
            WHERE LOWER(c.category) = LOWER(?1)
            "#,
        )
        .bind(category)
        .fetch_one(self.pool())
        .await?;

        Ok((self.attach_categories(rows).await?, total))
    }

    /// Articles from one source (case-insensitive exact match), newest first.
    pub async fn articles_by_source(
        &self,
        source: &str,
        limit: i64,
    ) -> Result<(Vec<Article>, i64), sqlx::Error> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, title, description, url, publication_date,
                   source_name, relevance_score, latitude, longitude
            FROM articles
            WHERE LOWER(source_name) = LOWER(?1)
            ORDER BY publication_date DESC
            LIMIT ?2
            "#,
        )
        .bind(source)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE LOWER(source_name) = LOWER(?1)")
                .bind(source)
                .fetch_one(self.pool())
                .await?;

        Ok((self.attach_categories(rows).await?, total))
    }

    /// Case-insensitive substring match on title or description, most
    /// relevant first with newest-first tie-break.
    pub async fn search_articles(
        &self,
        keyword: &str,
        limit: i64,
    ) -> Result<(Vec<Article>, i64), sqlx::Error> {
        let pattern = format!("%{}%", keyword);

        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, title, description, url, publication_date,
                   source_name, relevance_score, latitude, longitude
            FROM articles
            WHERE title LIKE ?1 OR description LIKE ?1
            ORDER BY relevance_score DESC, publication_date DESC
            LIMIT ?2
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE title LIKE ?1 OR description LIKE ?1")
                .bind(&pattern)
                .fetch_one(self.pool())
                .await?;

        Ok((self.attach_categories(rows).await?, total))
    }

    /// Articles with relevance at or above the threshold, best first.
    pub async fn articles_by_score(
        &self,
        min_score: f64,
        limit: i64,
    ) -> Result<(Vec<Article>, i64), sqlx::Error> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, title, description, url, publication_date,
                   source_name, relevance_score, latitude, longitude
            FROM articles
            WHERE relevance_score >= ?1
            ORDER BY relevance_score DESC, publication_date DESC
            LIMIT ?2
            "#,
        )
        .bind(min_score)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE relevance_score >= ?1")
                .bind(min_score)
                .fetch_one(self.pool())
                .await?;

        Ok((self.attach_categories(rows).await?, total))
    }

    /// Articles within `radius_km` of a point, closest first. A bounding-box
    /// SQL pre-filter narrows the candidates; the exact Haversine distance is
    /// computed here and attached to each result.
    pub async fn nearby_articles(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        limit: i64,
    ) -> Result<(Vec<Article>, i64), sqlx::Error> {
        let bbox = bounding_box(lat, lon, radius_km);

        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, title, description, url, publication_date,
                   source_name, relevance_score, latitude, longitude
            FROM articles
            WHERE latitude IS NOT NULL AND longitude IS NOT NULL
              AND latitude BETWEEN ?1 AND ?2
              AND longitude BETWEEN ?3 AND ?4
            "#,
        )
        .bind(bbox.min_lat)
        .bind(bbox.max_lat)
        .bind(bbox.min_lon)
        .bind(bbox.max_lon)
        .fetch_all(self.pool())
        .await?;

        let mut articles = self.attach_categories(rows).await?;
        for article in &mut articles {
            if let (Some(alat), Some(alon)) = (article.latitude, article.longitude) {
                article.distance_km = Some(haversine_distance(lat, lon, alat, alon));
            }
        }
        articles.retain(|a| a.distance_km.is_some_and(|d| d <= radius_km));
        articles.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let total = articles.len() as i64;
        articles.truncate(limit as usize);

        debug!(
            target: TARGET_DB,
            "Nearby query at ({}, {}) r={}km matched {} articles", lat, lon, radius_km, total
        );
        Ok((articles, total))
    }

    /// A pseudo-random sample with no ordering guarantee.
    pub async fn random_articles(&self, limit: i64) -> Result<Vec<Article>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, title, description, url, publication_date,
                   source_name, relevance_score, latitude, longitude
            FROM articles
            ORDER BY RANDOM()
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        self.attach_categories(rows).await
    }

    pub async fn article_by_id(&self, id: &str) -> Result<Option<Article>, sqlx::Error> {
        let row = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, title, description, url, publication_date,
                   source_name, relevance_score, latitude, longitude
            FROM articles
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => Ok(self.attach_categories(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// All known category labels, sorted.
    pub async fn distinct_categories(&self) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT DISTINCT category FROM article_categories ORDER BY category")
            .fetch_all(self.pool())
            .await
    }

    /// All known source names, sorted.
    pub async fn distinct_sources(&self) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT DISTINCT source_name FROM articles ORDER BY source_name")
            .fetch_all(self.pool())
            .await
    }

    /// Fetch category labels for a batch of rows in one query.
    async fn attach_categories(&self, rows: Vec<ArticleRow>) -> Result<Vec<Article>, sqlx::Error> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = rows.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT article_id, category FROM article_categories WHERE article_id IN ({}) ORDER BY category",
            placeholders
        );

        let mut query = sqlx::query_as::<_, (String, String)>(&sql);
        for row in &rows {
            query = query.bind(&row.id);
        }
        let pairs = query.fetch_all(self.pool()).await?;

        let mut by_article: HashMap<String, Vec<String>> = HashMap::new();
        for (article_id, category) in pairs {
            by_article.entry(article_id).or_default().push(category);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let categories = by_article.remove(&row.id).unwrap_or_default();
                row.into_article(categories)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(id: &str, title: &str, source: &str, categories: &[&str], score: f64) -> Article {
        Article {
            id: id.to_string(),
            title: title.to_string(),
            description: format!("{} description", title),
            url: format!("https://example.com/{}", id),
            publication_date: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            source_name: source.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            relevance_score: score,
            latitude: None,
            longitude: None,
            llm_summary: None,
            distance_km: None,
        }
    }

    fn located(mut a: Article, lat: f64, lon: f64) -> Article {
        a.latitude = Some(lat);
        a.longitude = Some(lon);
        a
    }

    async fn seeded_db() -> Database {
        let db = Database::in_memory().await.unwrap();

        let mut a1 = article("a1", "Chip launch", "Reuters", &["Technology"], 0.9);
        a1.publication_date = Utc.with_ymd_and_hms(2025, 6, 3, 12, 0, 0).unwrap();
        let mut a2 = article("a2", "Election results", "PTI", &["politics"], 0.7);
        a2.publication_date = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let a3 = article("a3", "Cricket final", "Reuters", &["sports", "cricket"], 0.85);
        let a4 = article("a4", "Startup funding round", "Moneycontrol", &["business", "startup"], 0.6);

        // Mumbai, Pune, Delhi
        db.add_article(&located(a1, 19.0760, 72.8777)).await.unwrap();
        db.add_article(&located(a2, 18.5204, 73.8567)).await.unwrap();
        db.add_article(&located(a3, 28.6139, 77.2090)).await.unwrap();
        db.add_article(&a4).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_category_match_is_case_insensitive() {
        let db = seeded_db().await;
        let (articles, total) = db.articles_by_category("technology", 5).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].id, "a1");
        assert_eq!(articles[0].categories, vec!["Technology"]);
    }

    #[tokio::test]
    async fn test_category_sorted_by_date_and_limited() {
        let db = seeded_db().await;
        let mut extra = article("a5", "Old tech story", "News18", &["Technology"], 0.5);
        extra.publication_date = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        db.add_article(&extra).await.unwrap();

        let (articles, total) = db.articles_by_category("Technology", 1).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(articles.len(), 1);
        // Newest first
        assert_eq!(articles[0].id, "a1");
    }

    #[tokio::test]
    async fn test_case_variant_labels_yield_one_row() {
        let db = Database::in_memory().await.unwrap();
        // Both labels survive insertion; the lookup must not double-count.
        let a = article("a1", "Cup final", "Reuters", &["Sports", "sports"], 0.8);
        db.add_article(&a).await.unwrap();

        let (articles, total) = db.articles_by_category("SPORTS", 5).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].id, "a1");
    }

    #[tokio::test]
    async fn test_source_match() {
        let db = seeded_db().await;
        let (articles, total) = db.articles_by_source("reuters", 5).await.unwrap();
        assert_eq!(total, 2);
        assert!(articles.iter().all(|a| a.source_name == "Reuters"));
        // Newest first
        assert_eq!(articles[0].id, "a1");
    }

    #[tokio::test]
    async fn test_search_substring_case_insensitive() {
        let db = seeded_db().await;
        let (articles, total) = db.search_articles("CRICKET", 5).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(articles[0].id, "a3");
    }

    #[tokio::test]
    async fn test_score_threshold() {
        let db = seeded_db().await;
        let (articles, total) = db.articles_by_score(0.8, 5).await.unwrap();
        assert_eq!(total, 2);
        assert!(articles.iter().all(|a| a.relevance_score >= 0.8));
        // Sorted by score descending
        assert_eq!(articles[0].id, "a1");
        assert_eq!(articles[1].id, "a3");
    }

    #[tokio::test]
    async fn test_nearby_within_radius_sorted_ascending() {
        let db = seeded_db().await;
        // 50 km around Mumbai catches only Mumbai (Pune is ~120 km away).
        let (articles, total) = db.nearby_articles(19.0760, 72.8777, 50.0, 5).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(articles[0].id, "a1");
        assert!(articles[0].distance_km.unwrap() < 1.0);

        // 200 km catches Pune too, sorted by distance.
        let (articles, total) = db.nearby_articles(19.0760, 72.8777, 200.0, 5).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(articles[0].id, "a1");
        assert_eq!(articles[1].id, "a2");
        assert!(articles.iter().all(|a| a.distance_km.unwrap() <= 200.0));
        assert!(articles[0].distance_km.unwrap() <= articles[1].distance_km.unwrap());
    }

    #[tokio::test]
    async fn test_nearby_limit_applies_after_total() {
        let db = seeded_db().await;
        let (articles, total) = db.nearby_articles(19.0760, 72.8777, 200.0, 1).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(articles.len(), 1);
    }

    #[tokio::test]
    async fn test_random_sample_respects_limit() {
        let db = seeded_db().await;
        let articles = db.random_articles(2).await.unwrap();
        assert_eq!(articles.len(), 2);
    }

    #[tokio::test]
    async fn test_facets_are_sorted_and_distinct() {
        let db = seeded_db().await;
        let categories = db.distinct_categories().await.unwrap();
        assert_eq!(
            categories,
            vec!["Technology", "business", "cricket", "politics", "sports", "startup"]
        );
        let sources = db.distinct_sources().await.unwrap();
        assert_eq!(sources, vec!["Moneycontrol", "PTI", "Reuters"]);
    }

    #[tokio::test]
    async fn test_article_by_id_roundtrip() {
        let db = seeded_db().await;
        let found = db.article_by_id("a3").await.unwrap().unwrap();
        assert_eq!(found.title, "Cricket final");
        assert_eq!(found.categories, vec!["cricket", "sports"]);
        assert!(db.article_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_result_is_not_an_error() {
        let db = Database::in_memory().await.unwrap();
        let (articles, total) = db.articles_by_category("anything", 5).await.unwrap();
        assert!(articles.is_empty());
        assert_eq!(total, 0);
    }
}
