use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{PreferenceRequest, StreamPhase},
    services::{
        candidate_pool::{PoolBuilder, MAX_CANDIDATES},
        curation::{validate_picks, Curator},
        inference::InferenceProvider,
        providers::CatalogProvider,
    },
};

/// Chunk sent towards the response body; an `Err` aborts the body
pub type BodyChunk = Result<Bytes, AppError>;

/// Progress of one request through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Idle,
    Searching,
    Found,
    Streaming,
    Done,
    Error,
}

impl PipelineState {
    /// Moves to `next`; only forward moves are allowed
    pub fn advance(&mut self, next: PipelineState) -> AppResult<()> {
        if next <= *self {
            return Err(AppError::Internal(format!(
                "Invalid pipeline transition {:?} -> {:?}",
                self, next
            )));
        }
        tracing::trace!(from = ?self, to = ?next, "Pipeline transition");
        *self = next;
        Ok(())
    }
}

/// How a run ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Stream closed normally after `picks` narrated titles
    Completed { found: usize, picks: usize },
    /// The client went away; remaining work was dropped
    Abandoned,
}

/// The receiving side of the body is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Writes phase markers and narration chunks to the response body
pub struct PhaseSink {
    tx: mpsc::Sender<BodyChunk>,
    state: PipelineState,
}

impl PhaseSink {
    pub fn new(tx: mpsc::Sender<BodyChunk>) -> Self {
        Self {
            tx,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    async fn send(&self, chunk: impl Into<Bytes>) -> Result<(), SinkClosed> {
        self.tx.send(Ok(chunk.into())).await.map_err(|_| SinkClosed)
    }

    /// Enters `phase`, writing its marker if it has one
    pub async fn enter(&mut self, phase: StreamPhase) -> AppResult<Result<(), SinkClosed>> {
        let next = match phase {
            StreamPhase::Searching => PipelineState::Searching,
            StreamPhase::Found(_) => PipelineState::Found,
            StreamPhase::Narrating => PipelineState::Streaming,
        };
        self.state.advance(next)?;

        match phase.marker() {
            Some(marker) => Ok(self.send(marker).await),
            None => Ok(Ok(())),
        }
    }

    /// Forwards one narration chunk unchanged
    pub async fn text(&self, chunk: String) -> Result<(), SinkClosed> {
        self.send(chunk).await
    }

    pub fn finish(&mut self) -> AppResult<()> {
        self.state.advance(PipelineState::Done)
    }

    /// Terminates the body abnormally with `error`
    pub async fn abort(&mut self, error: AppError) {
        self.state = PipelineState::Error;
        let _ = self.tx.send(Err(error)).await;
    }
}

/// Knobs the pipeline takes from [`Config`]
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub selection_model: String,
    pub narration_model: String,
    pub narration_idle_timeout: Duration,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            selection_model: config.selection_model.clone(),
            narration_model: config.narration_model.clone(),
            narration_idle_timeout: config.narration_idle_timeout(),
        }
    }
}

/// The recommendation pipeline: candidate pool, then curation, then narration
pub struct RecommendationPipeline {
    builder: PoolBuilder,
    curator: Curator,
    narration_idle_timeout: Duration,
}

macro_rules! or_abandon {
    ($sent:expr) => {
        if $sent.is_err() {
            tracing::info!("Client disconnected, abandoning pipeline");
            return Ok(PipelineOutcome::Abandoned);
        }
    };
}

impl RecommendationPipeline {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        inference: Arc<dyn InferenceProvider>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            builder: PoolBuilder::new(
                catalog,
                inference.clone(),
                settings.selection_model.clone(),
            ),
            curator: Curator::new(
                inference,
                settings.selection_model,
                settings.narration_model,
            ),
            narration_idle_timeout: settings.narration_idle_timeout,
        }
    }

    /// Runs the pipeline to completion, cancellation or failure
    ///
    /// On failure the error is also pushed into the body so the client sees a
    /// truncated response.
    pub async fn execute(
        &self,
        request: PreferenceRequest,
        tx: mpsc::Sender<BodyChunk>,
        cancel: CancellationToken,
    ) -> AppResult<PipelineOutcome> {
        let mut sink = PhaseSink::new(tx);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Request cancelled by client");
                Ok(PipelineOutcome::Abandoned)
            }
            result = self.run(&request, &mut sink) => result,
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(error = %e, state = ?sink.state(), "Pipeline failed mid-stream");
                sink.abort(e.duplicate()).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &PreferenceRequest,
        sink: &mut PhaseSink,
    ) -> AppResult<PipelineOutcome> {
        or_abandon!(sink.enter(StreamPhase::Searching).await?);

        let pool = self.builder.build(request).await;
        let found = pool.len();
        let candidates = pool.into_candidates(MAX_CANDIDATES);

        or_abandon!(sink.enter(StreamPhase::Found(found)).await?);

        let picks = self.curator.select(request, &candidates).await?;
        let blocks = validate_picks(&picks, &candidates);

        if blocks.is_empty() {
            tracing::info!(found, "No valid picks, closing stream");
            sink.finish()?;
            return Ok(PipelineOutcome::Completed { found, picks: 0 });
        }

        let mut narration = self.curator.narrate(request, &blocks).await?;
        or_abandon!(sink.enter(StreamPhase::Narrating).await?);

        loop {
            let next = tokio::time::timeout(self.narration_idle_timeout, narration.next())
                .await
                .map_err(|_| AppError::Upstream("Narration stream went idle".to_string()))?;

            match next {
                Some(chunk) => or_abandon!(sink.text(chunk?).await),
                None => break,
            }
        }

        sink.finish()?;
        tracing::info!(found, picks = blocks.len(), "Recommendations streamed");
        Ok(PipelineOutcome::Completed {
            found,
            picks: blocks.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogItem;
    use crate::services::inference::MockInferenceProvider;
    use crate::services::providers::MockCatalogProvider;
    use serde_json::json;

    fn items(n: u64) -> Vec<CatalogItem> {
        (0..n)
            .map(|id| CatalogItem {
                id,
                title: format!("Title {}", id),
                year: Some(2000),
                overview: String::new(),
                rating: 7.0,
                poster_path: None,
            })
            .collect()
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            selection_model: "s".to_string(),
            narration_model: "n".to_string(),
            narration_idle_timeout: Duration::from_secs(5),
        }
    }

    async fn drain(mut rx: mpsc::Receiver<BodyChunk>) -> (String, Option<AppError>) {
        let mut body = String::new();
        while let Some(chunk) = rx.recv().await {
            match chunk {
                Ok(bytes) => body.push_str(&String::from_utf8_lossy(&bytes)),
                Err(e) => return (body, Some(e)),
            }
        }
        (body, None)
    }

    #[test]
    fn test_state_only_moves_forward() {
        let mut state = PipelineState::Idle;
        state.advance(PipelineState::Searching).unwrap();
        state.advance(PipelineState::Found).unwrap();
        assert!(state.advance(PipelineState::Searching).is_err());
        assert!(state.advance(PipelineState::Found).is_err());
        state.advance(PipelineState::Streaming).unwrap();
        state.advance(PipelineState::Done).unwrap();
        assert_eq!(state, PipelineState::Done);
    }

    #[tokio::test]
    async fn test_found_marker_reports_untruncated_size() {
        let mut catalog = MockCatalogProvider::new();
        catalog
            .expect_discover()
            .returning(|_, query| {
                let start = (query.page as u64 - 1) * 20
                    + if query.min_votes > 100 { 1000 } else { 0 };
                Ok(items(start + 20).split_off(start as usize))
            });

        let mut inference = MockInferenceProvider::new();
        inference.expect_generate_object().returning(|request| {
            let max = &request.schema["properties"]["picks"]["items"]["properties"]["index"]["maximum"];
            assert_eq!(max, &json!(29));
            Ok(json!({ "picks": [ { "index": 0, "vibe": "A" }, { "index": 1, "vibe": "B" }, { "index": 2, "vibe": "C" } ] }))
        });
        inference.expect_stream_text().returning(|_| {
            Ok(futures::stream::iter(vec![Ok("one ".to_string()), Ok("two".to_string())]).boxed())
        });

        let pipeline =
            RecommendationPipeline::new(Arc::new(catalog), Arc::new(inference), settings());
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            pipeline
                .execute(PreferenceRequest::default(), tx, CancellationToken::new())
                .await
        });

        let (body, error) = drain(rx).await;
        let outcome = handle.await.unwrap().unwrap();

        assert!(error.is_none());
        assert_eq!(body, "[SEARCHING]\n[FOUND:60]\none two");
        assert_eq!(outcome, PipelineOutcome::Completed { found: 60, picks: 3 });
    }

    #[tokio::test]
    async fn test_narration_failure_aborts_stream() {
        let mut catalog = MockCatalogProvider::new();
        catalog.expect_discover().returning(|_, _| Ok(items(5)));

        let mut inference = MockInferenceProvider::new();
        inference
            .expect_generate_object()
            .returning(|_| Ok(json!({ "picks": [ { "index": 1, "vibe": "A" } ] })));
        inference.expect_stream_text().returning(|_| {
            Ok(futures::stream::iter(vec![
                Ok("partial".to_string()),
                Err(AppError::Upstream("reset".to_string())),
            ])
            .boxed())
        });

        let pipeline =
            RecommendationPipeline::new(Arc::new(catalog), Arc::new(inference), settings());
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            pipeline
                .execute(PreferenceRequest::default(), tx, CancellationToken::new())
                .await
        });

        let (body, error) = drain(rx).await;
        assert_eq!(body, "[SEARCHING]\n[FOUND:5]\npartial");
        assert!(matches!(error, Some(AppError::Upstream(_))));
        assert!(handle.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_abandons_run() {
        let mut catalog = MockCatalogProvider::new();
        catalog.expect_discover().returning(|_, _| Ok(items(5)));
        let mut inference = MockInferenceProvider::new();
        inference.expect_generate_object().never();

        let pipeline =
            RecommendationPipeline::new(Arc::new(catalog), Arc::new(inference), settings());
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let outcome = pipeline
            .execute(PreferenceRequest::default(), tx, CancellationToken::new())
            .await;
        tokio_test::assert_ok!(&outcome);
        assert_eq!(outcome.unwrap(), PipelineOutcome::Abandoned);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_catalog() {
        let mut catalog = MockCatalogProvider::new();
        catalog.expect_discover().never();
        let pipeline = RecommendationPipeline::new(
            Arc::new(catalog),
            Arc::new(MockInferenceProvider::new()),
            settings(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (tx, _rx) = mpsc::channel(8);

        let outcome = pipeline
            .execute(PreferenceRequest::default(), tx, cancel)
            .await
            .unwrap();
        assert_eq!(outcome, PipelineOutcome::Abandoned);
    }

    #[tokio::test]
    async fn test_abort_keeps_error_variant() {
        let mut catalog = MockCatalogProvider::new();
        catalog.expect_discover().returning(|_, _| Ok(items(5)));
        let mut inference = MockInferenceProvider::new();
        inference
            .expect_generate_object()
            .returning(|_| Err(AppError::UpstreamRateLimited("slow down".to_string())));
        inference.expect_stream_text().never();

        let pipeline =
            RecommendationPipeline::new(Arc::new(catalog), Arc::new(inference), settings());
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            pipeline
                .execute(PreferenceRequest::default(), tx, CancellationToken::new())
                .await
        });

        let (body, error) = drain(rx).await;
        assert_eq!(body, "[SEARCHING]\n[FOUND:5]\n");
        assert!(matches!(error, Some(AppError::UpstreamRateLimited(_))));
        assert!(matches!(
            handle.await.unwrap(),
            Err(AppError::UpstreamRateLimited(_))
        ));
    }

    #[tokio::test]
    async fn test_idle_narration_aborts_stream() {
        let mut catalog = MockCatalogProvider::new();
        catalog.expect_discover().returning(|_, _| Ok(items(5)));
        let mut inference = MockInferenceProvider::new();
        inference
            .expect_generate_object()
            .returning(|_| Ok(json!({ "picks": [ { "index": 0, "vibe": "A" } ] })));
        inference
            .expect_stream_text()
            .returning(|_| Ok(futures::stream::pending::<AppResult<String>>().boxed()));

        let pipeline = RecommendationPipeline::new(
            Arc::new(catalog),
            Arc::new(inference),
            PipelineSettings {
                narration_idle_timeout: Duration::from_millis(50),
                ..settings()
            },
        );
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            pipeline
                .execute(PreferenceRequest::default(), tx, CancellationToken::new())
                .await
        });

        let (body, error) = drain(rx).await;
        assert_eq!(body, "[SEARCHING]\n[FOUND:5]\n");
        assert!(matches!(error, Some(AppError::Upstream(msg)) if msg.contains("idle")));
        assert!(handle.await.unwrap().is_err());
    }
}
