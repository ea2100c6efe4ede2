use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{CatalogItem, Pick, PreferenceRequest, RecommendationBlock},
    services::{
        inference::{generate_typed, InferenceProvider, ObjectRequest, TextRequest, TextStream},
        prompts::{self, MAX_PICKS},
    },
};

#[derive(Debug, Deserialize)]
struct Selection {
    #[serde(default)]
    picks: Vec<Pick>,
}

/// Selects titles from the candidate window and narrates them
///
/// The model only ever names candidates by index, so every narrated title
/// comes from the pool.
pub struct Curator {
    inference: Arc<dyn InferenceProvider>,
    selection_model: String,
    narration_model: String,
}

impl Curator {
    pub fn new(
        inference: Arc<dyn InferenceProvider>,
        selection_model: String,
        narration_model: String,
    ) -> Self {
        Self {
            inference,
            selection_model,
            narration_model,
        }
    }

    /// Asks the model for 3–5 candidate indices with vibe labels
    ///
    /// An empty candidate list yields no picks without calling the model.
    pub async fn select(
        &self,
        request: &PreferenceRequest,
        candidates: &[CatalogItem],
    ) -> AppResult<Vec<Pick>> {
        if candidates.is_empty() {
            tracing::info!("No candidates to select from");
            return Ok(Vec::new());
        }

        let selection: Selection = generate_typed(
            self.inference.as_ref(),
            ObjectRequest {
                model: self.selection_model.clone(),
                schema_name: "candidate_selection",
                schema: prompts::selection_schema(candidates.len()),
                system: None,
                prompt: prompts::selection_prompt(request, candidates),
            },
        )
        .await?;

        tracing::info!(
            candidates = candidates.len(),
            picks = selection.picks.len(),
            "Model selected candidates"
        );

        Ok(selection.picks)
    }

    /// Opens the narration stream for the validated blocks
    pub async fn narrate(
        &self,
        request: &PreferenceRequest,
        blocks: &[RecommendationBlock],
    ) -> AppResult<TextStream> {
        self.inference
            .stream_text(TextRequest {
                model: self.narration_model.clone(),
                system: prompts::NARRATION_SYSTEM.to_string(),
                prompt: prompts::narration_prompt(request, blocks),
            })
            .await
    }
}

/// Keeps picks whose index lies in `[0, candidates.len())`
///
/// Repeated indices keep their first vibe and at most [`MAX_PICKS`] blocks
/// come back. Nothing is backfilled when picks are dropped.
pub fn validate_picks(picks: &[Pick], candidates: &[CatalogItem]) -> Vec<RecommendationBlock> {
    let mut used = HashSet::new();
    let mut blocks = Vec::new();

    for pick in picks {
        let Some(item) = usize::try_from(pick.index)
            .ok()
            .and_then(|index| candidates.get(index))
        else {
            tracing::warn!(
                index = pick.index,
                candidates = candidates.len(),
                "Dropping out-of-range pick"
            );
            continue;
        };

        if !used.insert(pick.index) {
            tracing::debug!(index = pick.index, "Dropping repeated pick");
            continue;
        }

        blocks.push(RecommendationBlock::new(item, &pick.vibe));
        if blocks.len() == MAX_PICKS {
            break;
        }
    }

    blocks
}
