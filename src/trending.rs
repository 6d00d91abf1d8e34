use chrono::{Duration, Utc};
use rand::{Rng, SeedableRng};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CONFIG;
use crate::db::Database;
use crate::error::Result;
use crate::models::{EventType, InteractionCounts, InteractionEvent, TrendingArticle};

// Composite-score policy. The weights favor breadth (unique users) and
// momentum (recent interactions) over raw volume, and decay with distance
// from the caller so nearby activity ranks higher.
const WEIGHT_TOTAL: f64 = 1.0;
const WEIGHT_UNIQUE: f64 = 1.5;
const WEIGHT_RECENT: f64 = 2.0;
const DISTANCE_DECAY_KM: f64 = 25.0;

/// How many nearby candidates to score before truncating to the caller's
/// limit.
const CANDIDATE_LIMIT: i64 = 100;

/// Deterministic composite trending score for one article.
///
/// `ln(1+n)` damps high-volume outliers; the distance factor halves the
/// score every `DISTANCE_DECAY_KM` kilometers from the caller.
pub fn composite_score(counts: &InteractionCounts, distance_km: f64) -> f64 {
    let interaction_part = WEIGHT_TOTAL * (1.0 + counts.total as f64).ln()
        + WEIGHT_UNIQUE * (1.0 + counts.unique_users as f64).ln()
        + WEIGHT_RECENT * (1.0 + counts.recent as f64).ln();

    let distance_factor = 1.0 / (1.0 + distance_km / DISTANCE_DECAY_KM);

    interaction_part * distance_factor
}

/// Rank nearby articles by interaction volume, breadth, recency, and
/// proximity. Articles with no interactions score zero and sort last;
/// ties break on publication date, newest first.
pub async fn trending(
    db: &Database,
    lat: f64,
    lon: f64,
    radius_km: f64,
    limit: i64,
) -> Result<Vec<TrendingArticle>> {
    let (candidates, _) = db.nearby_articles(lat, lon, radius_km, CANDIDATE_LIMIT).await?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = candidates.iter().map(|a| a.id.clone()).collect();
    let since = Utc::now() - Duration::hours(CONFIG.trending_window_hours);
    let counts = db.interaction_counts(&ids, since).await?;

    let mut ranked: Vec<TrendingArticle> = candidates
        .into_iter()
        .map(|article| {
            let article_counts = counts.get(&article.id).cloned().unwrap_or_default();
            let distance_km = article.distance_km.unwrap_or(0.0);
            let trending_score = composite_score(&article_counts, distance_km);
            TrendingArticle {
                article,
                trending_score,
                interaction_count: article_counts.total,
                unique_users: article_counts.unique_users,
                recent_interactions: article_counts.recent,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.trending_score
            .partial_cmp(&a.trending_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.article.publication_date.cmp(&a.article.publication_date))
    });
    ranked.truncate(limit as usize);

    info!(
        "Trending query at ({}, {}) r={}km ranked {} articles",
        lat,
        lon,
        radius_km,
        ranked.len()
    );
    Ok(ranked)
}

/// Synthesize interaction events for demonstration: random articles and
/// users, event types weighted toward views, timestamps biased toward the
/// recent past, and user coordinates jittered around the article's location.
pub async fn simulate_events(db: &Database, count: usize, jitter_km: f64) -> Result<usize> {
    let article_pool = (count / 3).clamp(1, 20) as i64;
    let articles = db.random_articles(article_pool).await?;
    if articles.is_empty() {
        warn!("No articles available to simulate interactions against");
        return Ok(0);
    }

    let user_pool = (count / 5).clamp(1, 10);
    let user_ids: Vec<String> = (0..user_pool)
        .map(|_| format!("user_{}", &Uuid::new_v4().simple().to_string()[..8]))
        .collect();

    let mut rng = rand::rngs::StdRng::from_os_rng();
    let mut created = 0;

    for _ in 0..count {
        let article = &articles[rng.random_range(0..articles.len())];
        let user_id = user_ids[rng.random_range(0..user_ids.len())].clone();

        // Views most common, shares rarest.
        let event_type = match rng.random_range(0..10) {
            0..=4 => EventType::View,
            5..=7 => EventType::Click,
            _ => EventType::Share,
        };

        // Square the unit sample to bias timestamps toward "just now".
        let unit: f64 = rng.random();
        let hours_back = unit * unit * 24.0;
        let timestamp = Utc::now() - Duration::seconds((hours_back * 3600.0) as i64);

        let (user_latitude, user_longitude) = match (article.latitude, article.longitude) {
            (Some(lat), Some(lon)) => {
                let degree_jitter = jitter_km / 111.0;
                let jlat = lat + rng.random_range(-degree_jitter..=degree_jitter);
                let jlon = lon + rng.random_range(-degree_jitter..=degree_jitter);
                (
                    Some(jlat.clamp(-90.0, 90.0)),
                    Some(jlon.clamp(-180.0, 180.0)),
                )
            }
            _ => (None, None),
        };

        let event = InteractionEvent {
            id: Uuid::new_v4().to_string(),
            article_id: article.id.clone(),
            user_id,
            event_type,
            timestamp,
            user_latitude,
            user_longitude,
        };

        db.record_event(&event).await?;
        created += 1;
    }

    info!("Created {} simulated interaction events", created);
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Article;
    use chrono::TimeZone;

    fn counts(total: i64, unique: i64, recent: i64) -> InteractionCounts {
        InteractionCounts {
            total,
            unique_users: unique,
            recent,
        }
    }

    #[test]
    fn test_zero_interactions_score_zero() {
        assert_eq!(composite_score(&counts(0, 0, 0), 0.0), 0.0);
        assert_eq!(composite_score(&counts(0, 0, 0), 50.0), 0.0);
    }

    #[test]
    fn test_score_increases_with_each_signal() {
        let base = composite_score(&counts(5, 2, 1), 10.0);
        assert!(composite_score(&counts(10, 2, 1), 10.0) > base);
        assert!(composite_score(&counts(5, 4, 1), 10.0) > base);
        assert!(composite_score(&counts(5, 2, 3), 10.0) > base);
    }

    #[test]
    fn test_score_decays_with_distance() {
        let near = composite_score(&counts(5, 3, 2), 1.0);
        let far = composite_score(&counts(5, 3, 2), 80.0);
        assert!(near > far);
        // Exactly one decay constant away halves the zero-distance score.
        let at_zero = composite_score(&counts(5, 3, 2), 0.0);
        let at_decay = composite_score(&counts(5, 3, 2), DISTANCE_DECAY_KM);
        assert!((at_decay - at_zero / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_deterministic() {
        let a = composite_score(&counts(7, 4, 2), 12.5);
        let b = composite_score(&counts(7, 4, 2), 12.5);
        assert_eq!(a, b);
    }

    fn seed_article(id: &str, lat: f64, lon: f64, day: u32) -> Article {
        Article {
            id: id.to_string(),
            title: format!("Article {}", id),
            description: "description".to_string(),
            url: format!("https://example.com/{}", id),
            publication_date: Utc.with_ymd_and_hms(2025, 6, day, 0, 0, 0).unwrap(),
            source_name: "Reuters".to_string(),
            categories: vec!["General".to_string()],
            relevance_score: 0.5,
            latitude: Some(lat),
            longitude: Some(lon),
            llm_summary: None,
            distance_km: None,
        }
    }

    async fn record(db: &Database, article: &str, user: &str, kind: EventType) {
        db.record_event(&InteractionEvent {
            id: Uuid::new_v4().to_string(),
            article_id: article.to_string(),
            user_id: user.to_string(),
            event_type: kind,
            timestamp: Utc::now() - Duration::hours(1),
            user_latitude: None,
            user_longitude: None,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_trending_orders_by_score_descending() {
        let db = Database::in_memory().await.unwrap();
        // Three articles clustered around the same point.
        db.add_article(&seed_article("hot", 19.08, 72.88, 1)).await.unwrap();
        db.add_article(&seed_article("warm", 19.09, 72.89, 2)).await.unwrap();
        db.add_article(&seed_article("cold", 19.10, 72.90, 3)).await.unwrap();

        for user in ["u1", "u2", "u3"] {
            record(&db, "hot", user, EventType::View).await;
            record(&db, "hot", user, EventType::Click).await;
        }
        record(&db, "warm", "u1", EventType::View).await;

        let ranked = trending(&db, 19.0760, 72.8777, 50.0, 10).await.unwrap();
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].article.id, "hot");
        assert_eq!(ranked[1].article.id, "warm");
        assert_eq!(ranked[2].article.id, "cold");
        assert_eq!(ranked[2].trending_score, 0.0);
        assert_eq!(ranked[0].unique_users, 3);
        assert_eq!(ranked[0].interaction_count, 6);

        // Monotonically non-increasing scores.
        for pair in ranked.windows(2) {
            assert!(pair[0].trending_score >= pair[1].trending_score);
        }

        // Deterministic for a fixed dataset and interaction log.
        let again = trending(&db, 19.0760, 72.8777, 50.0, 10).await.unwrap();
        let ids: Vec<&str> = ranked.iter().map(|t| t.article.id.as_str()).collect();
        let ids_again: Vec<&str> = again.iter().map(|t| t.article.id.as_str()).collect();
        assert_eq!(ids, ids_again);
    }

    #[tokio::test]
    async fn test_trending_respects_limit_and_radius() {
        let db = Database::in_memory().await.unwrap();
        db.add_article(&seed_article("near", 19.08, 72.88, 1)).await.unwrap();
        db.add_article(&seed_article("far", 28.61, 77.20, 2)).await.unwrap();

        let ranked = trending(&db, 19.0760, 72.8777, 50.0, 1).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].article.id, "near");
    }

    #[tokio::test]
    async fn test_simulate_events_creates_requested_count() {
        let db = Database::in_memory().await.unwrap();
        db.add_article(&seed_article("a1", 19.08, 72.88, 1)).await.unwrap();
        db.add_article(&seed_article("a2", 19.09, 72.89, 2)).await.unwrap();

        let created = simulate_events(&db, 30, 50.0).await.unwrap();
        assert_eq!(created, 30);

        let stats = db.activity_stats(48).await.unwrap();
        assert_eq!(stats.total_events, 30);
        assert!(stats.unique_articles <= 2);
        assert!(!stats.event_breakdown.is_empty());
    }

    #[tokio::test]
    async fn test_simulate_events_with_empty_store_is_zero() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(simulate_events(&db, 10, 50.0).await.unwrap(), 0);
    }
}
