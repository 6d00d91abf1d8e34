use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A news article as stored in the document store. `llm_summary` and
/// `distance_km` are computed per request and never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub publication_date: DateTime<Utc>,
    pub source_name: String,
    pub categories: Vec<String>,
    pub relevance_score: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    View,
    Click,
    Share,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::View => "view",
            EventType::Click => "click",
            EventType::Share => "share",
        }
    }

    pub fn parse(s: &str) -> Option<EventType> {
        match s {
            "view" => Some(EventType::View),
            "click" => Some(EventType::Click),
            "share" => Some(EventType::Share),
            _ => None,
        }
    }
}

/// One user-interaction event. Append-only; ids are immutable once written.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub id: String,
    pub article_id: String,
    pub user_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub user_latitude: Option<f64>,
    pub user_longitude: Option<f64>,
}

/// Aggregate interaction counts for one article.
#[derive(Clone, Debug, Default)]
pub struct InteractionCounts {
    pub total: i64,
    pub unique_users: i64,
    /// Events at or after the window cutoff passed to the query.
    pub recent: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActivityStats {
    pub total_events: i64,
    pub unique_users: i64,
    pub unique_articles: i64,
    pub event_breakdown: BTreeMap<String, i64>,
    pub hours_analyzed: i64,
}

/// The retrieval strategy a query was classified into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    Category,
    Source,
    Search,
    Score,
    Nearby,
    Unknown,
}

impl QueryIntent {
    pub fn parse(s: &str) -> QueryIntent {
        match s {
            "category" => QueryIntent::Category,
            "source" => QueryIntent::Source,
            "search" => QueryIntent::Search,
            "score" => QueryIntent::Score,
            "nearby" => QueryIntent::Nearby,
            _ => QueryIntent::Unknown,
        }
    }
}

/// Structured fields pulled out of a free-text query. Absence means the user
/// did not specify that field.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ExtractedEntities {
    pub category: Option<String>,
    pub source: Option<String>,
    pub keyword: Option<String>,
    pub keywords: Vec<String>,
    pub min_score: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_km: Option<f64>,
    pub location_name: Option<String>,
}

/// The classifier's verdict for one query.
#[derive(Clone, Debug, Serialize)]
pub struct QueryAnalysis {
    pub original_query: String,
    pub intent: QueryIntent,
    pub entities: ExtractedEntities,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct QueryMetadata {
    pub intent: QueryIntent,
    pub processed_query: String,
    pub processing_time_ms: u128,
    pub total_count: i64,
    pub limit: i64,
}

/// Result of the intelligent-query dispatcher.
#[derive(Clone, Debug, Serialize)]
pub struct QueryOutcome {
    pub articles: Vec<Article>,
    pub total_count: i64,
    pub metadata: QueryMetadata,
}

/// One trending-feed entry; the score is transient and never stored.
#[derive(Clone, Debug, Serialize)]
pub struct TrendingArticle {
    pub article: Article,
    pub trending_score: f64,
    pub interaction_count: i64,
    pub unique_users: i64,
    pub recent_interactions: i64,
}
