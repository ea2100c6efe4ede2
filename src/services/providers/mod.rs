/// Catalog provider abstraction
///
/// The pipeline talks to the title catalog only through [`CatalogProvider`], so
/// the TMDB client can be swapped for a stub in tests. Every method returns
/// fully typed records; raw JSON never leaves the provider.
use crate::{
    error::AppResult,
    models::{CatalogItem, MediaType, WatchProvider},
};

pub mod tmdb;

/// Monetization types that count as "available somewhere" in a region
pub const ANY_MONETIZATION: &str = "flatrate|free|ads";

/// Trait for title catalog providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Discover titles matching region/availability/genre filters
    async fn discover(
        &self,
        media_type: MediaType,
        query: &DiscoverQuery,
    ) -> AppResult<Vec<CatalogItem>>;

    /// Free-text title search, not scoped to any region
    async fn search(&self, media_type: MediaType, query: &str) -> AppResult<Vec<CatalogItem>>;

    /// Streaming services offering titles of this type in a region
    async fn watch_providers(
        &self,
        media_type: MediaType,
        region: &str,
    ) -> AppResult<Vec<WatchProvider>>;
}

/// How discovery results are restricted to titles the user can actually watch
///
/// The catalog ignores a region without an availability qualifier, so the
/// region only ever travels inside this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// Any of these streaming services
    Providers(Vec<u32>),
    /// Any subscription, free or ad-supported offer
    AnyMonetization,
}

impl Availability {
    pub fn for_providers(provider_ids: &[u32]) -> Self {
        if provider_ids.is_empty() {
            Availability::AnyMonetization
        } else {
            Availability::Providers(provider_ids.to_vec())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverSort {
    PopularityDesc,
    RatingDesc,
}

impl DiscoverSort {
    pub fn as_param(&self) -> &'static str {
        match self {
            DiscoverSort::PopularityDesc => "popularity.desc",
            DiscoverSort::RatingDesc => "vote_average.desc",
        }
    }
}

/// One region-scoped discovery call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverQuery {
    pub region: String,
    pub availability: Availability,
    pub genre_ids: Vec<u32>,
    pub sort: DiscoverSort,
    pub min_votes: u32,
    pub page: u32,
}

impl DiscoverQuery {
    /// Query parameters for the catalog's discover endpoint
    ///
    /// `watch_region` is always accompanied by either `with_watch_providers`
    /// or `with_watch_monetization_types`.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("watch_region", self.region.clone())];

        match &self.availability {
            Availability::Providers(ids) => {
                let joined = ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join("|");
                params.push(("with_watch_providers", joined));
            }
            Availability::AnyMonetization => {
                params.push(("with_watch_monetization_types", ANY_MONETIZATION.to_string()));
            }
        }

        if !self.genre_ids.is_empty() {
            let joined = self
                .genre_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join("|");
            params.push(("with_genres", joined));
        }

        params.push(("sort_by", self.sort.as_param().to_string()));
        params.push(("vote_count.gte", self.min_votes.to_string()));
        params.push(("page", self.page.to_string()));
        params
    }
}

/// Minimum vote count for popularity-ranked discovery
pub const POPULAR_MIN_VOTES: u32 = 50;
/// Stricter vote floor so rating-ranked results are not dominated by obscure titles
pub const RATED_MIN_VOTES: u32 = 500;

/// The fixed set of discovery calls issued for every request
pub fn discovery_plan(
    region: &str,
    provider_ids: &[u32],
    genre_ids: &[u32],
) -> Vec<DiscoverQuery> {
    let availability = Availability::for_providers(provider_ids);
    let query = |sort, min_votes, page| DiscoverQuery {
        region: region.to_string(),
        availability: availability.clone(),
        genre_ids: genre_ids.to_vec(),
        sort,
        min_votes,
        page,
    };

    vec![
        query(DiscoverSort::PopularityDesc, POPULAR_MIN_VOTES, 1),
        query(DiscoverSort::PopularityDesc, POPULAR_MIN_VOTES, 2),
        query(DiscoverSort::RatingDesc, RATED_MIN_VOTES, 1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param<'a>(params: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_region_never_sent_alone() {
        for provider_ids in [vec![], vec![8], vec![8, 9, 337]] {
            for query in discovery_plan("US", &provider_ids, &[35]) {
                let params = query.params();
                assert_eq!(param(&params, "watch_region"), Some("US"));
                let qualified = param(&params, "with_watch_providers").is_some()
                    || param(&params, "with_watch_monetization_types").is_some();
                assert!(qualified, "bare region filter in {:?}", params);
            }
        }
    }

    #[test]
    fn test_providers_are_or_joined() {
        let plan = discovery_plan("GB", &[8, 337], &[]);
        let params = plan[0].params();
        assert_eq!(param(&params, "with_watch_providers"), Some("8|337"));
        assert_eq!(param(&params, "with_watch_monetization_types"), None);
        assert_eq!(param(&params, "with_genres"), None);
    }

    #[test]
    fn test_no_providers_uses_monetization_types() {
        let plan = discovery_plan("US", &[], &[35, 18]);
        let params = plan[0].params();
        assert_eq!(
            param(&params, "with_watch_monetization_types"),
            Some("flatrate|free|ads")
        );
        assert_eq!(param(&params, "with_genres"), Some("35|18"));
    }

    #[test]
    fn test_plan_sorts_and_pages() {
        let plan = discovery_plan("US", &[], &[]);
        let shape: Vec<_> = plan
            .iter()
            .map(|q| (q.sort, q.page, q.min_votes))
            .collect();
        assert_eq!(
            shape,
            vec![
                (DiscoverSort::PopularityDesc, 1, POPULAR_MIN_VOTES),
                (DiscoverSort::PopularityDesc, 2, POPULAR_MIN_VOTES),
                (DiscoverSort::RatingDesc, 1, RATED_MIN_VOTES),
            ]
        );
        assert!(RATED_MIN_VOTES > POPULAR_MIN_VOTES);
    }
}
