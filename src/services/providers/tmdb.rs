/// TMDB catalog provider
///
/// API Flow:
/// 1. Discovery: /discover/{movie|tv} with region + availability filters
/// 2. Search: /search/{movie|tv} by free text, unscoped
/// 3. Providers: /watch/providers/{movie|tv} for the client's service picker
use crate::{
    error::{AppError, AppResult},
    models::{CatalogItem, MediaType, TmdbPage, TmdbWatchProvider, WatchProvider},
    services::providers::{CatalogProvider, DiscoverQuery},
};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const LANGUAGE: &str = "en-US";

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

impl TmdbProvider {
    /// Creates a provider whose calls each give up after `timeout`
    pub fn new(api_key: String, api_url: String, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Issues a GET and decodes the body into `T`
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("language", LANGUAGE)])
            .query(params)
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::from_status("TMDB API", status, &body));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| transport_error(path, e))?;
        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                path = %path,
                "Failed to deserialize TMDB response"
            );
            AppError::Upstream(format!("Failed to parse TMDB response: {}", e))
        })
    }

    /// Converts a page into catalog items, dropping results with no title
    fn convert_page(&self, page: TmdbPage) -> Vec<CatalogItem> {
        page.results
            .into_iter()
            .filter_map(|result| match CatalogItem::try_from(result) {
                Ok(item) => Some(item),
                Err(id) => {
                    tracing::debug!(tmdb_id = id, "Skipping TMDB result without a title");
                    None
                }
            })
            .collect()
    }
}

/// The request URL carries the API key, so it never goes into the error
fn transport_error(path: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Upstream(format!("TMDB request to {} timed out", path))
    } else {
        AppError::HttpClient(e.without_url())
    }
}

#[async_trait::async_trait]
impl CatalogProvider for TmdbProvider {
    async fn discover(
        &self,
        media_type: MediaType,
        query: &DiscoverQuery,
    ) -> AppResult<Vec<CatalogItem>> {
        let mut params = query.params();
        params.push(("include_adult", "false".to_string()));

        let path = format!("/discover/{}", media_type.as_path());
        let page: TmdbPage = self.get_json(&path, &params).await?;
        let items = self.convert_page(page);

        tracing::info!(
            media_type = %media_type.as_path(),
            region = %query.region,
            sort = query.sort.as_param(),
            page = query.page,
            results = items.len(),
            provider = "tmdb",
            "Discovery completed"
        );

        Ok(items)
    }

    async fn search(&self, media_type: MediaType, query: &str) -> AppResult<Vec<CatalogItem>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }

        let params = [
            ("query", query.trim().to_string()),
            ("include_adult", "false".to_string()),
        ];
        let path = format!("/search/{}", media_type.as_path());
        let page: TmdbPage = self.get_json(&path, &params).await?;
        let items = self.convert_page(page);

        tracing::info!(
            query = %query,
            results = items.len(),
            provider = "tmdb",
            "Title search completed"
        );

        Ok(items)
    }

    async fn watch_providers(
        &self,
        media_type: MediaType,
        region: &str,
    ) -> AppResult<Vec<WatchProvider>> {
        #[derive(Deserialize)]
        struct ProvidersResponse {
            #[serde(default)]
            results: Vec<TmdbWatchProvider>,
        }

        let path = format!("/watch/providers/{}", media_type.as_path());
        let params = [("watch_region", region.to_string())];
        let response: ProvidersResponse = self.get_json(&path, &params).await?;

        let mut providers: Vec<WatchProvider> = response
            .results
            .into_iter()
            .map(|p| p.into_provider(region))
            .collect();
        providers.sort_by(|a, b| {
            a.display_priority
                .cmp(&b.display_priority)
                .then_with(|| a.name.cmp(&b.name))
        });

        tracing::info!(
            region = %region,
            providers = providers.len(),
            provider = "tmdb",
            "Watch providers fetched"
        );

        Ok(providers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_provider() -> TmdbProvider {
        TmdbProvider::new(
            "test_key".to_string(),
            "http://test.local/3/".to_string(),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let provider = create_test_provider();
        assert_eq!(provider.api_url, "http://test.local/3");
    }

    #[test]
    fn test_convert_page_drops_untitled_results() {
        let provider = create_test_provider();
        let page: TmdbPage = serde_json::from_str(
            r#"{
                "page": 1,
                "results": [
                    { "id": 1, "title": "Heat", "release_date": "1995-12-15" },
                    { "id": 2 },
                    { "id": 3, "name": "The Wire", "first_air_date": "2002-06-02" }
                ]
            }"#,
        )
        .unwrap();

        let items = provider.convert_page(page);
        let ids: Vec<u64> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(items[1].year, Some(2002));
    }

    #[tokio::test]
    async fn test_search_rejects_blank_query() {
        let provider = create_test_provider();
        let result = provider.search(MediaType::Movie, "   ").await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_unreachable_catalog_error_hides_api_key() {
        let provider = TmdbProvider::new(
            "SECRET-TMDB-KEY".to_string(),
            "http://127.0.0.1:1".to_string(),
            Duration::from_secs(2),
        )
        .unwrap();

        let error = provider
            .watch_providers(MediaType::Movie, "US")
            .await
            .unwrap_err();
        assert!(!error.to_string().contains("SECRET-TMDB-KEY"));
        assert!(!format!("{:?}", error).contains("SECRET-TMDB-KEY"));
    }
}
