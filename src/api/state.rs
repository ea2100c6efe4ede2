use std::sync::Arc;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    middleware::{GovernorLimiter, RateLimitState, RequestLimiter},
    services::{
        inference::{openai::OpenAiCompatProvider, InferenceProvider},
        providers::{tmdb::TmdbProvider, CatalogProvider},
        PipelineSettings, RecommendationPipeline,
    },
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Option<Arc<dyn CatalogProvider>>,
    pub pipeline: PipelineSlot,
    pub limiter: Arc<dyn RequestLimiter>,
    pub trust_proxy_headers: bool,
}

/// The pipeline, or the reason it could not be built
#[derive(Clone)]
pub enum PipelineSlot {
    Ready(Arc<RecommendationPipeline>),
    Unconfigured(String),
}

impl AppState {
    /// Builds the upstream clients from `config`
    ///
    /// Missing credentials do not stop the server; the affected endpoints
    /// answer with a configuration error instead.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let limiter: Arc<dyn RequestLimiter> =
            Arc::new(GovernorLimiter::per_minute(config.rate_limit_per_minute));

        let missing = config.missing_credentials();
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "Upstream credentials not configured");
        }

        let catalog: Option<Arc<dyn CatalogProvider>> = match non_blank(&config.tmdb_api_key) {
            Some(key) => Some(Arc::new(TmdbProvider::new(
                key,
                config.tmdb_api_url.clone(),
                config.catalog_timeout(),
            )?)),
            None => None,
        };

        let inference: Option<Arc<dyn InferenceProvider>> =
            match non_blank(&config.inference_api_key) {
                Some(key) => Some(Arc::new(OpenAiCompatProvider::new(
                    key,
                    config.inference_api_url.clone(),
                    config.inference_timeout(),
                )?)),
                None => None,
            };

        let pipeline = match (&catalog, inference) {
            (Some(catalog), Some(inference)) => {
                PipelineSlot::Ready(Arc::new(RecommendationPipeline::new(
                    catalog.clone(),
                    inference,
                    PipelineSettings::from(config),
                )))
            }
            _ => PipelineSlot::Unconfigured(format!(
                "Server is missing required configuration: {}",
                missing.join(", ")
            )),
        };

        Ok(Self {
            catalog,
            pipeline,
            limiter,
            trust_proxy_headers: config.trust_proxy_headers,
        })
    }

    /// State wired to explicit providers, used by tests and embedders
    pub fn with_providers(
        catalog: Arc<dyn CatalogProvider>,
        inference: Arc<dyn InferenceProvider>,
        settings: PipelineSettings,
        limiter: Arc<dyn RequestLimiter>,
    ) -> Self {
        Self {
            pipeline: PipelineSlot::Ready(Arc::new(RecommendationPipeline::new(
                catalog.clone(),
                inference,
                settings,
            ))),
            catalog: Some(catalog),
            limiter,
            trust_proxy_headers: false,
        }
    }

    /// Keys rate limiting by proxy headers, for deployments behind a proxy
    pub fn trusting_proxy_headers(mut self) -> Self {
        self.trust_proxy_headers = true;
        self
    }

    pub fn rate_limit_state(&self) -> RateLimitState {
        RateLimitState {
            limiter: self.limiter.clone(),
            trust_proxy_headers: self.trust_proxy_headers,
        }
    }

    pub fn pipeline(&self) -> AppResult<Arc<RecommendationPipeline>> {
        match &self.pipeline {
            PipelineSlot::Ready(pipeline) => Ok(pipeline.clone()),
            PipelineSlot::Unconfigured(reason) => Err(AppError::Config(reason.clone())),
        }
    }

    pub fn catalog(&self) -> AppResult<Arc<dyn CatalogProvider>> {
        self.catalog.clone().ok_or_else(|| {
            AppError::Config("Server is missing required configuration: TMDB_API_KEY".to_string())
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
