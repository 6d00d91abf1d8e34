// prompts.rs

/// Prompt asking the model to classify a query's intent and extract the
/// structured entities the dispatcher routes on. The known category and
/// source facets are interpolated so the model maps mentions onto real
/// labels instead of inventing its own.
pub fn query_analysis_prompt(query: &str, categories: &[String], sources: &[String]) -> String {
    format!(
        "Analyze the following news query, classify the user's search intent and extract entities.

Query: \"{query}\"

Intent must be exactly one of:
- category: the user wants news from a specific category
- source: the user wants news from a specific publisher
- search: the user wants to search for specific terms
- score: the user wants high-quality or highly relevant articles
- nearby: the user wants location-based news
- unknown: none of the above fits

Respond with JSON only, no prose, using exactly this structure:
{{
    \"intent\": \"category|source|search|score|nearby|unknown\",
    \"category\": \"matching category label or null\",
    \"source\": \"matching source name or null\",
    \"keywords\": [\"keyword1\", \"keyword2\"],
    \"min_score\": 0.7,
    \"location\": {{\"name\": \"place or null\", \"lat\": 19.07, \"lon\": 72.87}},
    \"radius_km\": 10.0,
    \"confidence\": 0.9,
    \"reasoning\": \"one short sentence\"
}}

Use null for any field the query does not specify. The location object must
be null unless the query names a place; when it does, fill in that place's
approximate coordinates.

Known categories: {categories}
Known sources: {sources}",
        query = query,
        categories = categories.join(", "),
        sources = sources.join(", "),
    )
}

/// Prompt for a short abstractive summary of one article.
pub fn summary_prompt(title: &str, description: &str, max_chars: usize) -> String {
    format!(
        "Create a concise, informative summary of this news article.

Title: {title}
Description: {description}

Keep it under {max_chars} characters, focus on the key facts (who, what,
when, where) and maintain an objective tone. Do not tell me what you're
doing; reply with the summary text only, no preamble and no markup.",
        title = title,
        description = description,
        max_chars = max_chars,
    )
}
