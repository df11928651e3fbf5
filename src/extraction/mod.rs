//! Trait extraction boundary.
//!
//! The engine treats "turn a transcript into candidate traits" as an opaque
//! capability behind the [`TraitExtractor`] trait. Implementations are
//! polymorphic over a real LLM call (outside this crate), a deterministic
//! stub, and fixture replay:
//!
//! ```text
//! transcript
//!   → TraitExtractor::extract_traits     (LLM / static / fixture)
//!   → ExtractorAdapter                   (absorbs ExtractionUnavailable)
//!   → Vec<CandidateTrait>                (untrusted, normalized next)
//! ```

pub mod adapter;
pub mod capability;
pub mod fixture;

pub use adapter::{ExtractionOutcome, ExtractorAdapter};
pub use capability::{CandidateTrait, TraitExtractor};
pub use fixture::{FixtureExtractor, StaticExtractor};
