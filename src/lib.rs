//! # Persona Engine
//!
//! Personality extraction and trait-consistency engine for
//! conversation-driven bot personas.
//!
//! Conversation transcripts are analyzed into candidate personality traits,
//! normalized, and reconciled into one durable profile per bot: repeated
//! observations of a trait converge via exponentially weighted averaging
//! instead of oscillating, duplicate analysis rounds are fingerprinted and
//! skipped, and readers always see a consistent point-in-time snapshot while
//! batches apply. The profile answers the queries a bot runtime needs
//! mid-conversation: strongest traits, threshold checks, trait descriptions.

pub mod config;
pub mod engine;
pub mod errors;
pub mod extraction;
pub mod normalize;
pub mod persistence;
pub mod profile;
pub mod query;
pub mod reconcile;
pub mod status;

// The surface most callers need: build an engine, analyze, query.
pub use config::{EngineConfig, LockMode};
pub use engine::{AnalysisOutcome, AnalysisReport, PersonalityEngine};
pub use errors::EngineError;
pub use extraction::{CandidateTrait, TraitExtractor};
pub use normalize::{NormalizedTrait, TraitKey};
pub use profile::{ProfileSnapshot, TraitRecord};
pub use reconcile::BatchFingerprint;

/// Library version.
pub const VERSION: &str = "0.1.0";
