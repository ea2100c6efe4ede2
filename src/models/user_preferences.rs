use serde::{Deserialize, Serialize};

use super::MediaType;

/// Region used when the client does not send one
pub const DEFAULT_REGION: &str = "US";

/// Preferences sent by the client with every recommendation request
///
/// Every field is optional on the wire. Nothing here outlives the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferenceRequest {
    /// ISO 3166-1 country code used for availability filtering
    pub region: Option<String>,
    /// Catalog ids of the streaming services the user subscribes to
    pub provider_ids: Vec<u32>,
    pub media_type: MediaType,
    pub genres: Vec<String>,
    pub moods: Vec<String>,
    pub styles: Vec<String>,
    /// Free-text description of what the user is in the mood for
    pub description: String,
    /// Titles the user liked in earlier sessions
    pub liked: Vec<String>,
    /// Titles the user disliked in earlier sessions
    pub disliked: Vec<String>,
}

impl PreferenceRequest {
    /// Normalized region code, falling back to [`DEFAULT_REGION`]
    pub fn region(&self) -> String {
        self.region
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_uppercase)
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// Trimmed description, empty when the user wrote nothing
    pub fn description(&self) -> &str {
        self.description.trim()
    }

    /// Lowercased titles the user has already seen, liked or not
    pub fn seen_titles(&self) -> Vec<String> {
        self.liked
            .iter()
            .chain(self.disliked.iter())
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}
