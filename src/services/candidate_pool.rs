use futures::future::join_all;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::{
    error::AppResult,
    models::{CatalogItem, PreferenceRequest},
    services::{
        genres::genre_ids,
        inference::{generate_typed, InferenceProvider, ObjectRequest},
        prompts::{self, MAX_SEARCH_TERMS},
        providers::{discovery_plan, CatalogProvider},
    },
};

/// Most candidates handed to curation
pub const MAX_CANDIDATES: usize = 30;

/// Deduplicated candidates, priority prefix first
///
/// The first `priority_len` items came from description-driven searches and
/// were confirmed available by discovery. The rest is shuffled discovery
/// output. No id appears twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidatePool {
    items: Vec<CatalogItem>,
    priority_len: usize,
}

impl CandidatePool {
    /// Merges unscoped search results with region-scoped discovery results
    ///
    /// Search items survive only when discovery returned the same id. The
    /// general suffix is shuffled with `rng`; the prefix keeps its order.
    pub fn merge<R: Rng + ?Sized>(
        searched: Vec<CatalogItem>,
        discovered: Vec<CatalogItem>,
        rng: &mut R,
    ) -> Self {
        let available: HashSet<u64> = discovered.iter().map(|item| item.id).collect();
        let mut seen: HashSet<u64> = HashSet::new();

        let mut items: Vec<CatalogItem> = searched
            .into_iter()
            .filter(|item| available.contains(&item.id))
            .filter(|item| seen.insert(item.id))
            .collect();
        let priority_len = items.len();

        items.extend(discovered.into_iter().filter(|item| seen.insert(item.id)));
        items[priority_len..].shuffle(rng);

        Self {
            items,
            priority_len,
        }
    }

    /// Drops titles the user has already seen (case-insensitive exact match)
    pub fn exclude_seen(&mut self, seen_titles: &[String]) {
        if seen_titles.is_empty() {
            return;
        }
        let seen: HashSet<&str> = seen_titles.iter().map(String::as_str).collect();
        let is_seen = |item: &CatalogItem| seen.contains(item.title.trim().to_lowercase().as_str());

        let removed_priority = self.items[..self.priority_len]
            .iter()
            .filter(|item| is_seen(item))
            .count();
        let before = self.items.len();
        self.items.retain(|item| !is_seen(item));
        self.priority_len -= removed_priority;

        if before != self.items.len() {
            tracing::debug!(
                removed = before - self.items.len(),
                "Excluded previously seen titles"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn priority(&self) -> &[CatalogItem] {
        &self.items[..self.priority_len]
    }

    pub fn general(&self) -> &[CatalogItem] {
        &self.items[self.priority_len..]
    }

    /// The first `max` candidates, in pool order
    pub fn into_candidates(mut self, max: usize) -> Vec<CatalogItem> {
        self.items.truncate(max);
        self.items
    }
}

/// Search phrases and titles derived from the free-text description
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchExtraction {
    pub search_terms: Vec<String>,
    pub similar_titles: Vec<String>,
}

impl SearchExtraction {
    /// All non-blank queries, at most three of each kind
    pub fn queries(&self) -> Vec<String> {
        let clean = |values: &[String]| -> Vec<String> {
            values
                .iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .take(MAX_SEARCH_TERMS)
                .collect()
        };
        let mut queries = clean(&self.search_terms);
        queries.extend(clean(&self.similar_titles));
        queries
    }
}

/// Builds the candidate pool for one request
///
/// Every catalog or model failure in here is logged and treated as an empty
/// contribution; building never fails.
pub struct PoolBuilder {
    catalog: Arc<dyn CatalogProvider>,
    inference: Arc<dyn InferenceProvider>,
    extraction_model: String,
}

impl PoolBuilder {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        inference: Arc<dyn InferenceProvider>,
        extraction_model: String,
    ) -> Self {
        Self {
            catalog,
            inference,
            extraction_model,
        }
    }

    pub async fn build(&self, request: &PreferenceRequest) -> CandidatePool {
        let start = Instant::now();

        let (discovered, searched) =
            tokio::join!(self.discover_all(request), self.search_description(request));

        tracing::info!(
            discovered = discovered.len(),
            searched = searched.len(),
            "Catalog queries finished"
        );

        let mut pool = CandidatePool::merge(searched, discovered, &mut rand::rng());
        pool.exclude_seen(&request.seen_titles());

        tracing::info!(
            pool_size = pool.len(),
            priority = pool.priority().len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Candidate pool built"
        );

        pool
    }

    /// Runs the discovery plan concurrently, concatenating results in plan order
    async fn discover_all(&self, request: &PreferenceRequest) -> Vec<CatalogItem> {
        let media_type = request.media_type;
        let genre_ids = genre_ids(media_type, &request.genres);
        let plan = discovery_plan(&request.region(), &request.provider_ids, &genre_ids);

        let results = join_all(
            plan.iter()
                .map(|query| self.catalog.discover(media_type, query)),
        )
        .await;

        results
            .into_iter()
            .zip(plan.iter())
            .flat_map(|(result, query)| {
                absorb(result, || {
                    format!("discover {} page {}", query.sort.as_param(), query.page)
                })
            })
            .collect()
    }

    /// Extracts queries from the description and runs one search per query
    async fn search_description(&self, request: &PreferenceRequest) -> Vec<CatalogItem> {
        if request.description().is_empty() {
            return Vec::new();
        }

        let extraction = match self.extract(request).await {
            Ok(extraction) => extraction,
            Err(e) => {
                tracing::warn!(error = %e, "Search term extraction failed");
                return Vec::new();
            }
        };

        let queries = extraction.queries();
        tracing::debug!(queries = ?queries, "Extracted search queries");

        let results = join_all(
            queries
                .iter()
                .map(|query| self.catalog.search(request.media_type, query)),
        )
        .await;

        results
            .into_iter()
            .zip(queries.iter())
            .flat_map(|(result, query)| absorb(result, || format!("search '{}'", query)))
            .collect()
    }

    async fn extract(&self, request: &PreferenceRequest) -> AppResult<SearchExtraction> {
        generate_typed(
            self.inference.as_ref(),
            ObjectRequest {
                model: self.extraction_model.clone(),
                schema_name: "search_extraction",
                schema: prompts::extraction_schema(),
                system: None,
                prompt: prompts::extraction_prompt(request),
            },
        )
        .await
    }
}

/// Turns a failed catalog call into an empty contribution
fn absorb(
    result: AppResult<Vec<CatalogItem>>,
    describe: impl FnOnce() -> String,
) -> Vec<CatalogItem> {
    match result {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(query = %describe(), error = %e, "Catalog query failed");
            Vec::new()
        }
    }
}
