use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod recommendation;
pub mod streaming_service;
pub mod user_preferences;

pub use recommendation::{Pick, RecommendationBlock, StreamPhase};
pub use streaming_service::{TmdbWatchProvider, WatchProvider};
pub use user_preferences::{PreferenceRequest, DEFAULT_REGION};

/// Kind of title the client is asking for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Movie,
    Tv,
}

impl MediaType {
    /// Path segment used by the catalog API
    pub fn as_path(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Movie => write!(f, "movie"),
            MediaType::Tv => write!(f, "TV show"),
        }
    }
}

/// One title from the catalog, as consumed by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogItem {
    pub id: u64,
    pub title: String,
    pub year: Option<i32>,
    pub overview: String,
    pub rating: f64,
    pub poster_path: Option<String>,
}

impl CatalogItem {
    /// Year label for prompts and headers
    pub fn year_label(&self) -> String {
        self.year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    }
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// One page of a TMDB discover or search response
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPage {
    #[serde(default)]
    pub results: Vec<TmdbResult>,
}

/// Raw TMDB result; movies carry `title`/`release_date`, TV carries
/// `name`/`first_air_date`
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbResult {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub poster_path: Option<String>,
}

impl TryFrom<TmdbResult> for CatalogItem {
    type Error = u64;

    /// Fails with the TMDB id when the result has no usable title
    fn try_from(result: TmdbResult) -> Result<Self, Self::Error> {
        let title = result
            .title
            .or(result.name)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(result.id)?;

        let year = result
            .release_date
            .as_deref()
            .filter(|d| !d.is_empty())
            .or(result.first_air_date.as_deref())
            .and_then(parse_year);

        Ok(CatalogItem {
            id: result.id,
            title,
            year,
            overview: result.overview.unwrap_or_default(),
            rating: result.vote_average.unwrap_or_default(),
            poster_path: result.poster_path.filter(|p| !p.is_empty()),
        })
    }
}

fn parse_year(date: &str) -> Option<i32> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|d| d.year())
}
