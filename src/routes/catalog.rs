use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    api::AppState,
    error::AppResult,
    models::{MediaType, WatchProvider, DEFAULT_REGION},
    services::genres,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersQuery {
    region: Option<String>,
    #[serde(default)]
    media_type: MediaType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenresQuery {
    #[serde(default)]
    media_type: MediaType,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenresResponse {
    media_type: MediaType,
    genres: Vec<&'static str>,
}

/// Streaming services available in a region, in display order
pub async fn providers(
    State(state): State<AppState>,
    Query(params): Query<ProvidersQuery>,
) -> AppResult<Json<Vec<WatchProvider>>> {
    let region = params
        .region
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_uppercase)
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    let providers = state
        .catalog()?
        .watch_providers(params.media_type, &region)
        .await?;

    tracing::debug!(region = %region, count = providers.len(), "Listed watch providers");
    Ok(Json(providers))
}

/// Genre names accepted in recommendation requests
pub async fn genres(Query(params): Query<GenresQuery>) -> Json<GenresResponse> {
    Json(GenresResponse {
        media_type: params.media_type,
        genres: genres::supported_genres(params.media_type),
    })
}
