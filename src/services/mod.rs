pub mod candidate_pool;
pub mod curation;
pub mod genres;
pub mod inference;
pub mod pipeline;
pub mod prompts;
pub mod providers;

pub use candidate_pool::{CandidatePool, PoolBuilder};
pub use curation::Curator;
pub use pipeline::{PipelineOutcome, PipelineSettings, RecommendationPipeline};
