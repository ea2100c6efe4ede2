use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::CatalogItem;

/// Longest synopsis excerpt handed to the narration model, in characters
pub const SYNOPSIS_EXCERPT_CHARS: usize = 220;

/// One selection returned by the index-selection call
///
/// `index` is signed so that out-of-range values from the model still decode
/// and can be rejected during validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pick {
    pub index: i64,
    #[serde(default)]
    pub vibe: String,
}

/// A validated pick, carrying everything the narration prompt needs
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecommendationBlock {
    pub title: String,
    pub year: Option<i32>,
    pub synopsis: String,
    pub poster_path: Option<String>,
    pub vibe: String,
}

impl RecommendationBlock {
    pub fn new(item: &CatalogItem, vibe: &str) -> Self {
        Self {
            title: item.title.clone(),
            year: item.year,
            synopsis: excerpt(&item.overview, SYNOPSIS_EXCERPT_CHARS),
            poster_path: item.poster_path.clone(),
            vibe: vibe.trim().to_string(),
        }
    }

    /// First line of the block as the client renders it:
    /// `**Title** (Year) · Vibe [img:/poster.jpg]`
    pub fn header_line(&self) -> String {
        let year = self
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        let mut line = format!("**{}** ({}) · {}", self.title, year, self.vibe);
        if let Some(poster) = &self.poster_path {
            line.push_str(&format!(" [img:{}]", poster));
        }
        line
    }
}

/// Cuts `text` to at most `max_chars` characters on a char boundary
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

/// Progress marker written into the response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Searching,
    /// Untruncated candidate pool size
    Found(usize),
    /// Narration text follows; carries no marker of its own
    Narrating,
}

impl StreamPhase {
    /// Line written to the body for this phase, if any
    pub fn marker(&self) -> Option<String> {
        match self {
            StreamPhase::Searching => Some("[SEARCHING]\n".to_string()),
            StreamPhase::Found(count) => Some(format!("[FOUND:{}]\n", count)),
            StreamPhase::Narrating => None,
        }
    }

    /// Parses a marker line as produced by [`StreamPhase::marker`]
    pub fn parse_marker(line: &str) -> Option<Self> {
        let line = line.trim_end_matches('\n');
        if line == "[SEARCHING]" {
            return Some(StreamPhase::Searching);
        }
        line.strip_prefix("[FOUND:")
            .and_then(|rest| rest.strip_suffix(']'))
            .and_then(|count| count.parse().ok())
            .map(StreamPhase::Found)
    }
}

impl Display for StreamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamPhase::Searching => write!(f, "searching"),
            StreamPhase::Found(count) => write!(f, "found({})", count),
            StreamPhase::Narrating => write!(f, "narrating"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> CatalogItem {
        CatalogItem {
            id: 1,
            title: "Heat".to_string(),
            year: Some(1995),
            overview: "A group of professional bank robbers.".to_string(),
            rating: 8.3,
            poster_path: Some("/heat.jpg".to_string()),
        }
    }

    #[test]
    fn test_header_line_format() {
        let block = RecommendationBlock::new(&item(), " Slick and tense ");
        assert_eq!(
            block.header_line(),
            "**Heat** (1995) · Slick and tense [img:/heat.jpg]"
        );
    }

    #[test]
    fn test_header_line_without_poster() {
        let mut item = item();
        item.poster_path = None;
        item.year = None;
        let block = RecommendationBlock::new(&item, "Moody");
        assert_eq!(block.header_line(), "**Heat** (n/a) · Moody");
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = "é".repeat(300);
        let cut = excerpt(&text, 10);
        assert_eq!(cut, format!("{}...", "é".repeat(10)));
        assert_eq!(excerpt("short", 10), "short");
    }

    #[test]
    fn test_markers() {
        assert_eq!(
            StreamPhase::Searching.marker().as_deref(),
            Some("[SEARCHING]\n")
        );
        assert_eq!(
            StreamPhase::Found(42).marker().as_deref(),
            Some("[FOUND:42]\n")
        );
        assert_eq!(StreamPhase::Narrating.marker(), None);
    }

    #[test]
    fn test_parse_marker() {
        assert_eq!(
            StreamPhase::parse_marker("[SEARCHING]\n"),
            Some(StreamPhase::Searching)
        );
        assert_eq!(
            StreamPhase::parse_marker("[FOUND:7]"),
            Some(StreamPhase::Found(7))
        );
        assert_eq!(StreamPhase::parse_marker("[FOUND:x]"), None);
        assert_eq!(StreamPhase::parse_marker("**Heat** (1995)"), None);
    }

    #[test]
    fn test_pick_vibe_is_optional() {
        let pick: Pick = serde_json::from_str(r#"{ "index": -2 }"#).unwrap();
        assert_eq!(pick.index, -2);
        assert_eq!(pick.vibe, "");
    }
}
