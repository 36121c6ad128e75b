//! Ad display and ranking engine for a classifieds marketplace.
//!
//! Scores listings from plan tier, recency, query relevance, engagement and
//! buyer location, gates paid tiers probabilistically, and assembles homepage,
//! category and search result sets.

pub mod ad;
pub mod assemble;
pub mod catalog;
pub mod engine;
pub mod gate;
pub mod policy;
pub mod scoring;
pub mod text;

pub use ad::{AdId, AdStatus, AdView, Location, PlanTier, ScoredAd, UnknownTier, ViewingContext};
pub use assemble::{CategoryResult, DisplayMetrics, HomepageLimits, HomepageResult, SearchResults};
pub use catalog::{CandidateSource, CatalogEntry, InMemoryCatalog, SearchFilters};
pub use engine::{DisplayEngine, SearchRequest};
pub use policy::{PlanPolicy, PlanTierProfile, ScoreWeights, SponsoredQuota};
pub use scoring::{ScoreBreakdown, ScoreCalculator};
