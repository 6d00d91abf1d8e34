use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::CONFIG;
use crate::db::Database;
use crate::llm::{generate_llm_response, strip_code_fence};
use crate::models::{Coordinate, ExtractedEntities, QueryAnalysis, QueryIntent};
use crate::prompts;
use crate::{LLMParams, TARGET_LLM_REQUEST};

/// Cue words that signal a location-based query in the rule-based fallback.
const LOCATION_CUES: &[&str] = &["near", "nearby", "around", "local", "close"];
/// Cue words that signal a quality/relevance query.
const QUALITY_CUES: &[&str] = &["best", "top", "high quality", "relevant", "important"];

/// The facet values interpolated into the classification prompt and scanned
/// by the rule-based fallback. Loaded explicitly at startup and refreshed on
/// demand; never an ambient global.
#[derive(Clone, Debug, Default)]
pub struct Facets {
    pub categories: Vec<String>,
    pub sources: Vec<String>,
}

impl Facets {
    pub async fn load(db: &Database) -> Result<Facets, sqlx::Error> {
        Ok(Facets {
            categories: db.distinct_categories().await?,
            sources: db.distinct_sources().await?,
        })
    }
}

/// Classify a free-text query into an intent plus extracted entities.
///
/// The language model is asked for a structured JSON verdict; any failure
/// along the way (call error, timeout, malformed output) degrades to the
/// deterministic rule-based analysis and is never surfaced to the caller.
pub async fn classify(
    query: &str,
    user_location: Option<Coordinate>,
    facets: &Facets,
    llm: &LLMParams,
) -> QueryAnalysis {
    let prompt = prompts::query_analysis_prompt(query, &facets.categories, &facets.sources);

    match generate_llm_response(&prompt, llm, CONFIG.classify_timeout).await {
        Some(response) => match parse_analysis(query, strip_code_fence(&response)) {
            Ok(analysis) => {
                info!(
                    target: TARGET_LLM_REQUEST,
                    "Classified query '{}' as {:?} (confidence {:.2})",
                    query, analysis.intent, analysis.confidence
                );
                analysis
            }
            Err(e) => {
                warn!(
                    target: TARGET_LLM_REQUEST,
                    "Malformed classification response ({}), falling back to rules", e
                );
                fallback_analysis(query, user_location, facets)
            }
        },
        None => {
            warn!(
                target: TARGET_LLM_REQUEST,
                "Classification call failed, falling back to rules"
            );
            fallback_analysis(query, user_location, facets)
        }
    }
}

/// Decode the model's JSON verdict. Individual entity fields are optional,
/// but the response must be a JSON object with a string `intent` — anything
/// else counts as malformed and triggers the fallback.
pub fn parse_analysis(query: &str, json_str: &str) -> Result<QueryAnalysis> {
    let json: Value =
        serde_json::from_str(json_str).map_err(|e| anyhow!("invalid JSON response: {}", e))?;

    let intent_str = json
        .get("intent")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("no 'intent' field in response"))?;
    let intent = QueryIntent::parse(intent_str);

    let mut entities = ExtractedEntities {
        category: non_empty_string(json.get("category")),
        source: non_empty_string(json.get("source")),
        min_score: json
            .get("min_score")
            .and_then(Value::as_f64)
            .map(|s| s.clamp(0.0, 1.0)),
        radius_km: json
            .get("radius_km")
            .and_then(Value::as_f64)
            .filter(|r| *r > 0.0),
        ..Default::default()
    };

    if let Some(keywords) = json.get("keywords").and_then(Value::as_array) {
        entities.keywords = keywords
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    entities.keyword = if entities.keywords.is_empty() {
        None
    } else {
        Some(entities.keywords.join(" "))
    };

    if let Some(location) = json.get("location").filter(|l| l.is_object()) {
        entities.location_name = non_empty_string(location.get("name"));
        let lat = location.get("lat").and_then(Value::as_f64);
        let lon = location.get("lon").and_then(Value::as_f64);
        if let (Some(lat), Some(lon)) = (lat, lon) {
            if crate::geo::valid_coordinate(lat, lon) {
                entities.latitude = Some(lat);
                entities.longitude = Some(lon);
            }
        }
    }

    debug!(
        target: TARGET_LLM_REQUEST,
        "Parsed analysis: intent={:?} category={:?} source={:?} keywords={:?}",
        intent, entities.category, entities.source, entities.keywords
    );

    Ok(QueryAnalysis {
        original_query: query.to_string(),
        intent,
        entities,
        confidence: json.get("confidence").and_then(Value::as_f64).unwrap_or(0.7),
        reasoning: json
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or("Analysis completed")
            .to_string(),
    })
}

/// Deterministic rule-based analysis used whenever the model's verdict is
/// unavailable. Scans the known facets and a few cue words; the final
/// fallback is a plain text search with the raw query as the keyword.
pub fn fallback_analysis(
    query: &str,
    user_location: Option<Coordinate>,
    facets: &Facets,
) -> QueryAnalysis {
    let query_lower = query.to_lowercase();

    let mut intent = QueryIntent::Search;
    let mut entities = ExtractedEntities {
        keyword: Some(query.to_string()),
        keywords: query.split_whitespace().map(str::to_string).collect(),
        ..Default::default()
    };

    for category in &facets.categories {
        if query_lower.contains(&category.to_lowercase()) {
            intent = QueryIntent::Category;
            entities.category = Some(category.clone());
            break;
        }
    }

    for source in &facets.sources {
        if query_lower.contains(&source.to_lowercase()) {
            intent = QueryIntent::Source;
            entities.source = Some(source.clone());
            break;
        }
    }

    if user_location.is_some() && LOCATION_CUES.iter().any(|cue| query_lower.contains(cue)) {
        intent = QueryIntent::Nearby;
    }

    if QUALITY_CUES.iter().any(|cue| query_lower.contains(cue)) {
        intent = QueryIntent::Score;
        entities.min_score = Some(0.7);
    }

    QueryAnalysis {
        original_query: query.to_string(),
        intent,
        entities,
        confidence: 0.6,
        reasoning: "Fallback rule-based analysis".to_string(),
    }
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}
