use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::classifier::{classify, Facets};
use crate::config::CONFIG;
use crate::db::Database;
use crate::error::Result;
use crate::geo::haversine_distance;
use crate::llm::generate_llm_response;
use crate::models::{
    Article, Coordinate, QueryAnalysis, QueryIntent, QueryMetadata, QueryOutcome,
};
use crate::prompts;
use crate::{LLMParams, TARGET_LLM_REQUEST};

const SUMMARY_MAX_CHARS: usize = 300;

/// The concrete repository call a classified query resolves to.
#[derive(Clone, Debug, PartialEq)]
pub enum Strategy {
    Category(String),
    Source(String),
    Score(f64),
    Nearby {
        lat: f64,
        lon: f64,
        radius_km: f64,
    },
    Search(String),
}

/// Map a classification onto a retrieval strategy.
///
/// Intents that arrive without the entity they need (a category, a source, a
/// coordinate for nearby) degrade to a text search over the original query
/// rather than failing.
pub fn resolve_strategy(analysis: &QueryAnalysis, caller: Option<Coordinate>) -> Strategy {
    let entities = &analysis.entities;

    let search_fallback = || {
        Strategy::Search(
            entities
                .keyword
                .clone()
                .unwrap_or_else(|| analysis.original_query.clone()),
        )
    };

    match analysis.intent {
        QueryIntent::Category => match &entities.category {
            Some(category) => Strategy::Category(category.clone()),
            None => search_fallback(),
        },
        QueryIntent::Source => match &entities.source {
            Some(source) => Strategy::Source(source.clone()),
            None => search_fallback(),
        },
        QueryIntent::Score => Strategy::Score(entities.min_score.unwrap_or(0.7)),
        QueryIntent::Nearby => {
            let coordinate = match (entities.latitude, entities.longitude) {
                (Some(lat), Some(lon)) => Some(Coordinate {
                    latitude: lat,
                    longitude: lon,
                }),
                _ => caller,
            };
            match coordinate {
                Some(coord) => Strategy::Nearby {
                    lat: coord.latitude,
                    lon: coord.longitude,
                    radius_km: entities
                        .radius_km
                        .unwrap_or(CONFIG.default_radius_km)
                        .min(CONFIG.max_radius_km),
                },
                // No coordinate anywhere: degrade to text search.
                None => search_fallback(),
            }
        }
        QueryIntent::Search | QueryIntent::Unknown => search_fallback(),
    }
}

/// The intelligent-query entry point: classify, route, optionally enrich
/// with summaries, and assemble result metadata.
pub async fn execute(
    db: &Database,
    llm: &LLMParams,
    facets: &Facets,
    query: &str,
    coordinate: Option<Coordinate>,
    limit: i64,
    include_summary: bool,
) -> Result<QueryOutcome> {
    let started = Instant::now();
    let limit = limit.clamp(1, CONFIG.max_limit);

    let analysis = classify(query, coordinate, facets, llm).await;
    let strategy = resolve_strategy(&analysis, coordinate);
    debug!("Query '{}' resolved to {:?}", query, strategy);

    let (mut articles, total_count) = match &strategy {
        Strategy::Category(category) => db.articles_by_category(category, limit).await?,
        Strategy::Source(source) => db.articles_by_source(source, limit).await?,
        Strategy::Score(min_score) => db.articles_by_score(*min_score, limit).await?,
        Strategy::Nearby {
            lat,
            lon,
            radius_km,
        } => db.nearby_articles(*lat, *lon, *radius_km, limit).await?,
        Strategy::Search(keyword) => db.search_articles(keyword, limit).await?,
    };

    if include_summary {
        summarize_articles(&mut articles, llm).await;
    }

    if let Some(coord) = coordinate {
        attach_distances(&mut articles, coord);
    }

    let metadata = QueryMetadata {
        intent: analysis.intent,
        processed_query: analysis
            .entities
            .keyword
            .clone()
            .unwrap_or_else(|| query.to_string()),
        processing_time_ms: started.elapsed().as_millis(),
        total_count,
        limit,
    };

    info!(
        "Query '{}' ({:?}) returned {}/{} articles in {}ms",
        query,
        metadata.intent,
        articles.len(),
        total_count,
        metadata.processing_time_ms
    );

    Ok(QueryOutcome {
        articles,
        total_count,
        metadata,
    })
}

/// Generate a short summary for each article, at most
/// `CONFIG.summary_concurrency` calls in flight. A failed or timed-out call
/// leaves that article's summary absent; it never fails the request.
pub async fn summarize_articles(articles: &mut [Article], llm: &LLMParams) {
    summarize_with(articles, |prompt| {
        let llm = llm.clone();
        async move { generate_llm_response(&prompt, &llm, CONFIG.summary_timeout).await }
    })
    .await;
}

async fn summarize_with<F, Fut>(articles: &mut [Article], summarize: F)
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Option<String>>,
{
    if articles.is_empty() {
        return;
    }

    // Built as a Vec rather than a lazy iterator: streaming borrowed futures
    // through `buffered` trips a rustc auto-trait limitation that makes the
    // caller's future non-Send.
    let pending_summaries: Vec<_> = articles
        .iter()
        .map(|article| {
            let prompt =
                prompts::summary_prompt(&article.title, &article.description, SUMMARY_MAX_CHARS);
            let article_id = article.id.clone();
            let pending = summarize(prompt);
            async move {
                let summary = pending.await;
                if summary.is_none() {
                    warn!(
                        target: TARGET_LLM_REQUEST,
                        "Summary generation failed for article {}, omitting summary", article_id
                    );
                }
                summary.map(|text| truncate_chars(&text, SUMMARY_MAX_CHARS))
            }
        })
        .collect();
    let summaries: Vec<Option<String>> = stream::iter(pending_summaries)
        .buffered(CONFIG.summary_concurrency)
        .collect()
        .await;

    for (article, summary) in articles.iter_mut().zip(summaries) {
        article.llm_summary = summary;
    }
}

fn attach_distances(articles: &mut [Article], coord: Coordinate) {
    for article in articles {
        if article.distance_km.is_none() {
            if let (Some(lat), Some(lon)) = (article.latitude, article.longitude) {
                article.distance_km = Some(haversine_distance(
                    coord.latitude,
                    coord.longitude,
                    lat,
                    lon,
                ));
            }
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
