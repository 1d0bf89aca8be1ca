//! AI column processing: provider adapters, the shared rate limiter and the
//! batch job that drives a column through a provider.

pub mod batch;
pub mod gemini;
pub mod mistral;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod rate_limit;

pub use batch::{BatchProcessor, JobError, JobOptions, JobOutcome, JobReport};
pub use provider::{build_provider, GenerationConfig, ProviderError, ProviderPort, SYSTEM_ROLE};
pub use rate_limit::{Acquisition, RateLimiter};
