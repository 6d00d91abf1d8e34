use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::core::Database;
use crate::models::{ActivityStats, InteractionCounts, InteractionEvent};
use crate::TARGET_DB;

impl Database {
    /// Append one interaction event. The log is append-only; there is no
    /// update or delete path.
    pub async fn record_event(&self, event: &InteractionEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_events
                (id, article_id, user_id, event_type, timestamp, user_latitude, user_longitude)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&event.id)
        .bind(&event.article_id)
        .bind(&event.user_id)
        .bind(event.event_type.as_str())
        .bind(event.timestamp.to_rfc3339())
        .bind(event.user_latitude)
        .bind(event.user_longitude)
        .execute(self.pool())
        .await?;

        debug!(
            target: TARGET_DB,
            "Recorded {} event for article {}", event.event_type.as_str(), event.article_id
        );
        Ok(())
    }

    /// Per-article aggregates for a batch of articles: all-time totals,
    /// unique users, and events at or after `since`.
    pub async fn interaction_counts(
        &self,
        article_ids: &[String],
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, InteractionCounts>, sqlx::Error> {
        if article_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = article_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            r#"
            SELECT article_id,
                   COUNT(*),
                   COUNT(DISTINCT user_id),
                   SUM(CASE WHEN timestamp >= ?1 THEN 1 ELSE 0 END)
            FROM user_events
            WHERE article_id IN ({})
            GROUP BY article_id
            "#,
            placeholders
        );

        let mut query = sqlx::query_as::<_, (String, i64, i64, i64)>(&sql).bind(since.to_rfc3339());
        for id in article_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(self.pool()).await?;

        Ok(rows
            .into_iter()
            .map(|(article_id, total, unique_users, recent)| {
                (
                    article_id,
                    InteractionCounts {
                        total,
                        unique_users,
                        recent,
                    },
                )
            })
            .collect())
    }

    /// Totals and a per-event-type breakdown over the trailing window.
    pub async fn activity_stats(&self, hours: i64) -> Result<ActivityStats, sqlx::Error> {
        let cutoff = (Utc::now() - Duration::hours(hours)).to_rfc3339();

        let (total_events, unique_users, unique_articles): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(DISTINCT user_id), COUNT(DISTINCT article_id)
            FROM user_events
            WHERE timestamp >= ?1
            "#,
        )
        .bind(&cutoff)
        .fetch_one(self.pool())
        .await?;

        let breakdown_rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT event_type, COUNT(*)
            FROM user_events
            WHERE timestamp >= ?1
            GROUP BY event_type
            "#,
        )
        .bind(&cutoff)
        .fetch_all(self.pool())
        .await?;

        let event_breakdown: BTreeMap<String, i64> = breakdown_rows.into_iter().collect();

        Ok(ActivityStats {
            total_events,
            unique_users,
            unique_articles,
            event_breakdown,
            hours_analyzed: hours,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;
    use uuid::Uuid;

    fn event(article: &str, user: &str, kind: EventType, hours_ago: i64) -> InteractionEvent {
        InteractionEvent {
            id: Uuid::new_v4().to_string(),
            article_id: article.to_string(),
            user_id: user.to_string(),
            event_type: kind,
            timestamp: Utc::now() - Duration::hours(hours_ago),
            user_latitude: Some(19.0),
            user_longitude: Some(72.8),
        }
    }

    #[tokio::test]
    async fn test_counts_split_total_and_recent() {
        let db = Database::in_memory().await.unwrap();
        db.record_event(&event("a1", "u1", EventType::View, 1)).await.unwrap();
        db.record_event(&event("a1", "u1", EventType::Click, 2)).await.unwrap();
        db.record_event(&event("a1", "u2", EventType::View, 48)).await.unwrap();
        db.record_event(&event("a2", "u3", EventType::Share, 3)).await.unwrap();

        let since = Utc::now() - Duration::hours(24);
        let counts = db
            .interaction_counts(&["a1".to_string(), "a2".to_string(), "a3".to_string()], since)
            .await
            .unwrap();

        let a1 = &counts["a1"];
        assert_eq!(a1.total, 3);
        assert_eq!(a1.unique_users, 2);
        assert_eq!(a1.recent, 2);

        let a2 = &counts["a2"];
        assert_eq!(a2.total, 1);
        assert_eq!(a2.unique_users, 1);
        assert_eq!(a2.recent, 1);

        // No events means no entry rather than a zero row.
        assert!(!counts.contains_key("a3"));
    }

    #[tokio::test]
    async fn test_empty_id_batch_short_circuits() {
        let db = Database::in_memory().await.unwrap();
        let counts = db.interaction_counts(&[], Utc::now()).await.unwrap();
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn test_activity_stats_breakdown() {
        let db = Database::in_memory().await.unwrap();
        db.record_event(&event("a1", "u1", EventType::View, 1)).await.unwrap();
        db.record_event(&event("a1", "u2", EventType::View, 2)).await.unwrap();
        db.record_event(&event("a2", "u1", EventType::Share, 3)).await.unwrap();
        // Outside the 24h window
        db.record_event(&event("a2", "u9", EventType::Click, 30)).await.unwrap();

        let stats = db.activity_stats(24).await.unwrap();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.unique_users, 2);
        assert_eq!(stats.unique_articles, 2);
        assert_eq!(stats.event_breakdown.get("view"), Some(&2));
        assert_eq!(stats.event_breakdown.get("share"), Some(&1));
        assert_eq!(stats.event_breakdown.get("click"), None);
        assert_eq!(stats.hours_analyzed, 24);
    }
}
