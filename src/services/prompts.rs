//! Prompt and schema builders for the three model calls.

use serde_json::{json, Value};

use crate::models::{
    recommendation::excerpt, CatalogItem, PreferenceRequest, RecommendationBlock,
};

/// Most search phrases / similar titles taken from the extraction call
pub const MAX_SEARCH_TERMS: usize = 3;
pub const MIN_PICKS: usize = 3;
pub const MAX_PICKS: usize = 5;

const CANDIDATE_SYNOPSIS_CHARS: usize = 160;

pub const NARRATION_SYSTEM: &str = "You are a warm, witty film and TV critic. \
Write only about the titles you are given, in the order given, and never \
mention any other title. Keep every header line exactly as provided.";

pub fn extraction_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "searchTerms": {
                "type": "array",
                "items": { "type": "string" },
                "maxItems": MAX_SEARCH_TERMS,
                "description": "Short catalog search phrases capturing the request"
            },
            "similarTitles": {
                "type": "array",
                "items": { "type": "string" },
                "maxItems": MAX_SEARCH_TERMS,
                "description": "Well-known titles similar to what the user describes"
            }
        },
        "required": ["searchTerms", "similarTitles"],
        "additionalProperties": false
    })
}

pub fn extraction_prompt(request: &PreferenceRequest) -> String {
    format!(
        "A viewer is looking for a {media}. They describe it as:\n\"{description}\"\n\n\
         Give up to {max} short search phrases (two to four words each) that a \
         movie database title search would match, and up to {max} well-known \
         {media} titles that fit the description.",
        media = request.media_type,
        description = request.description(),
        max = MAX_SEARCH_TERMS,
    )
}

/// Schema constraining selection to 3–5 in-range candidate indices
pub fn selection_schema(pool_len: usize) -> Value {
    json!({
        "type": "object",
        "properties": {
            "picks": {
                "type": "array",
                "minItems": MIN_PICKS,
                "maxItems": MAX_PICKS,
                "items": {
                    "type": "object",
                    "properties": {
                        "index": {
                            "type": "integer",
                            "minimum": 0,
                            "maximum": pool_len.saturating_sub(1)
                        },
                        "vibe": {
                            "type": "string",
                            "description": "Two to five word mood label"
                        }
                    },
                    "required": ["index", "vibe"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["picks"],
        "additionalProperties": false
    })
}

fn list_or_none(values: &[String]) -> String {
    let values: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        "none".to_string()
    } else {
        values.join(", ")
    }
}

/// One candidate line: `index. Title (Year) ★rating - synopsis`
pub fn candidate_line(index: usize, item: &CatalogItem) -> String {
    format!(
        "{}. {} ({}) ★{:.1} - {}",
        index,
        item.title,
        item.year_label(),
        item.rating,
        excerpt(&item.overview, CANDIDATE_SYNOPSIS_CHARS)
    )
}

pub fn selection_prompt(request: &PreferenceRequest, candidates: &[CatalogItem]) -> String {
    let mut prompt = format!(
        "Pick between {min} and {max} {media} recommendations from the numbered \
         candidates below. Answer with candidate indices only.\n\n\
         Genres: {genres}\nMoods: {moods}\nStyles: {styles}\n\
         Description: {description}\nLiked before: {liked}\nDisliked before: {disliked}\n\n\
         Favour variety, match the moods and styles, lean towards what the viewer \
         liked and away from what they disliked. Give each pick a short vibe label.\n\n\
         Candidates:\n",
        min = MIN_PICKS,
        max = MAX_PICKS,
        media = request.media_type,
        genres = list_or_none(&request.genres),
        moods = list_or_none(&request.moods),
        styles = list_or_none(&request.styles),
        description = if request.description().is_empty() {
            "none"
        } else {
            request.description()
        },
        liked = list_or_none(&request.liked),
        disliked = list_or_none(&request.disliked),
    );

    for (index, item) in candidates.iter().enumerate() {
        prompt.push_str(&candidate_line(index, item));
        prompt.push('\n');
    }
    prompt
}

pub fn narration_prompt(request: &PreferenceRequest, blocks: &[RecommendationBlock]) -> String {
    let mut prompt = format!(
        "Write a short recommendation for each of these {count} titles and no others. \
         Use exactly two lines per title and a blank line between titles:\n\
         line 1: the header line exactly as given\n\
         line 2: _Why you'll love it:_ followed by one or two sentences\n\n\
         The viewer asked for: {moods}{description}\n\n",
        count = blocks.len(),
        moods = list_or_none(
            &request
                .genres
                .iter()
                .chain(request.moods.iter())
                .chain(request.styles.iter())
                .cloned()
                .collect::<Vec<_>>()
        ),
        description = if request.description().is_empty() {
            String::new()
        } else {
            format!(" / \"{}\"", request.description())
        },
    );

    for block in blocks {
        prompt.push_str(&format!(
            "Header: {}\nSynopsis: {}\n\n",
            block.header_line(),
            block.synopsis
        ));
    }
    prompt
}
