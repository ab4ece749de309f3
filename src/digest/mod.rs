//! The digest pipeline: per-account processing, normalization, relevance,
//! rendering, and the orchestrator tying them to the sink.

pub mod account;
pub mod normalize;
pub mod orchestrator;
pub mod relevance;
pub mod summary;

pub use account::{AccountDigest, AccountProcessor, Scope, ScopeError};
pub use normalize::{EventNormalizer, FileContext};
pub use orchestrator::{AccountFailure, BatchOutcome, DigestOrchestrator, DigestReport, DigestSettings};
pub use relevance::filter_relevant;
pub use summary::{group_events, GroupBy, SummaryGenerator};
