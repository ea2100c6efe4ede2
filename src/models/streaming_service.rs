use serde::{Deserialize, Serialize};

/// A streaming service that carries titles in a region
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchProvider {
    /// Catalog id, sent back by the client in `providerIds`
    pub id: u32,
    /// Name of the streaming service (e.g., "Netflix", "Hulu")
    pub name: String,
    pub logo_path: Option<String>,
    /// Lower sorts first in the region
    pub display_priority: i32,
}

/// Raw entry of TMDB's `/watch/providers/{type}` response
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbWatchProvider {
    pub provider_id: u32,
    pub provider_name: String,
    #[serde(default)]
    pub logo_path: Option<String>,
    #[serde(default)]
    pub display_priority: Option<i32>,
    /// Per-region priorities; present on newer API responses
    #[serde(default)]
    pub display_priorities: std::collections::HashMap<String, i32>,
}

impl TmdbWatchProvider {
    /// Converts into a [`WatchProvider`], preferring the region's own priority
    pub fn into_provider(self, region: &str) -> WatchProvider {
        let display_priority = self
            .display_priorities
            .get(region)
            .copied()
            .or(self.display_priority)
            .unwrap_or(i32::MAX);

        WatchProvider {
            id: self.provider_id,
            name: self.provider_name,
            logo_path: self.logo_path,
            display_priority,
        }
    }
}
