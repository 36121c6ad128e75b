//! Plan visibility policy: the tier table, score weights and sponsored-slot quota.
//!
//! The policy is a single value injected into [`crate::DisplayEngine`]. It can be
//! loaded from a JSON file so pricing/visibility changes do not need a rebuild:
//!
//! ```json
//! {
//!   "tiers": {
//!     "free":       { "priority": 10,  "display_probability": 0.40, "boost": 1.0 },
//!     "enterprise": { "priority": 100, "display_probability": 1.00, "boost": 3.0 }
//!   },
//!   "weights":   { "plan": 0.40, "recency": 0.25, "relevance": 0.15, "engagement": 0.10, "location": 0.10 },
//!   "sponsored": { "share": 0.25, "max_slots": 3 }
//! }
//! ```
//!
//! Sections left out of the file keep their reference values. Tier rows left out
//! fall back to Free's profile, the same way an unknown tier does at lookup time.

use crate::PlanTier;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanTierProfile {
    /// Plan sub-score, 0..=100.
    pub priority: u32,
    /// Chance of passing the display gate, 0.0..=1.0.
    pub display_probability: f64,
    /// Multiplier applied to the weighted base score, >= 1.0.
    pub boost: f64,
}

impl PlanTierProfile {
    pub const fn new(priority: u32, display_probability: f64, boost: f64) -> Self {
        Self { priority, display_probability, boost }
    }
}

const REFERENCE_TIERS: [(PlanTier, PlanTierProfile); 5] = [
    (PlanTier::Free, PlanTierProfile::new(10, 0.40, 1.0)),
    (PlanTier::Basic, PlanTierProfile::new(30, 0.65, 1.5)),
    (PlanTier::Premium, PlanTierProfile::new(60, 0.85, 2.0)),
    (PlanTier::Featured, PlanTierProfile::new(85, 0.95, 2.5)),
    (PlanTier::Enterprise, PlanTierProfile::new(100, 1.00, 3.0)),
];

const FREE_FALLBACK: PlanTierProfile = REFERENCE_TIERS[0].1;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Weights of the five sub-scores in the composite base score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub plan: f64,
    pub recency: f64,
    pub relevance: f64,
    pub engagement: f64,
    pub location: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            plan: 0.40,
            recency: 0.25,
            relevance: 0.15,
            engagement: 0.10,
            location: 0.10,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.plan + self.recency + self.relevance + self.engagement + self.location
    }
}

/// Share of a search page reserved for sponsored tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SponsoredQuota {
    pub share: f64,
    pub max_slots: usize,
}

impl Default for SponsoredQuota {
    fn default() -> Self {
        Self { share: 0.25, max_slots: 3 }
    }
}

impl SponsoredQuota {
    /// `min(max_slots, ceil(limit * share))`
    pub fn slots_for(&self, limit: usize) -> usize {
        let wanted = (limit as f64 * self.share).ceil();
        if wanted <= 0.0 {
            return 0;
        }
        (wanted as usize).min(self.max_slots)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanPolicy {
    tiers: BTreeMap<PlanTier, PlanTierProfile>,
    pub weights: ScoreWeights,
    pub sponsored: SponsoredQuota,
}

impl Default for PlanPolicy {
    fn default() -> Self {
        Self {
            tiers: REFERENCE_TIERS.into_iter().collect(),
            weights: ScoreWeights::default(),
            sponsored: SponsoredQuota::default(),
        }
    }
}

/// On-disk shape. Tier names are parsed strictly so a typo in the file is an
/// error rather than a silent fallback.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PolicyFile {
    tiers: Option<HashMap<String, PlanTierProfile>>,
    weights: Option<ScoreWeights>,
    sponsored: Option<SponsoredQuota>,
}

impl PlanPolicy {
    pub fn new(
        tiers: impl IntoIterator<Item = (PlanTier, PlanTierProfile)>,
        weights: ScoreWeights,
        sponsored: SponsoredQuota,
    ) -> Self {
        Self { tiers: tiers.into_iter().collect(), weights, sponsored }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: PolicyFile = serde_json::from_str(json).context("parse plan policy")?;
        let mut policy = PlanPolicy::default();
        if let Some(rows) = file.tiers {
            let mut tiers = BTreeMap::new();
            for (name, profile) in rows {
                let tier: PlanTier = name.parse()?;
                tiers.insert(tier, profile);
            }
            policy.tiers = tiers;
        }
        if let Some(w) = file.weights {
            policy.weights = w;
        }
        if let Some(s) = file.sponsored {
            policy.sponsored = s;
        }
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("read plan policy {}", path.display()))?;
        let policy = Self::from_json(&json)
            .with_context(|| format!("load plan policy {}", path.display()))?;
        tracing::info!(path = %path.display(), "plan policy loaded");
        Ok(policy)
    }

    /// Profile for `tier`; tiers missing from the table use Free's row.
    pub fn profile(&self, tier: PlanTier) -> PlanTierProfile {
        self.tiers
            .get(&tier)
            .or_else(|| self.tiers.get(&PlanTier::Free))
            .copied()
            .unwrap_or(FREE_FALLBACK)
    }

    pub fn priority(&self, tier: PlanTier) -> f64 {
        self.profile(tier).priority as f64
    }

    pub fn display_probability(&self, tier: PlanTier) -> f64 {
        self.profile(tier).display_probability
    }

    pub fn boost(&self, tier: PlanTier) -> f64 {
        self.profile(tier).boost
    }

    /// Effective table, one row per tier in ascending order.
    pub fn table(&self) -> Vec<(PlanTier, PlanTierProfile)> {
        PlanTier::ALL.iter().map(|&t| (t, self.profile(t))).collect()
    }

    /// Higher tiers must never be disadvantaged: priority, probability and boost
    /// are each non-decreasing from Free to Enterprise.
    pub fn validate(&self) -> Result<()> {
        let table = self.table();
        for (tier, p) in &table {
            if p.priority > 100 {
                bail!("{tier}: priority {} exceeds 100", p.priority);
            }
            if !(0.0..=1.0).contains(&p.display_probability) {
                bail!("{tier}: display probability {} outside [0, 1]", p.display_probability);
            }
            if !(p.boost >= 1.0) {
                bail!("{tier}: boost {} below 1.0", p.boost);
            }
        }
        for pair in table.windows(2) {
            let (lo_tier, lo) = pair[0];
            let (hi_tier, hi) = pair[1];
            if hi.priority < lo.priority
                || hi.display_probability < lo.display_probability
                || hi.boost < lo.boost
            {
                bail!("{hi_tier} is ranked below {lo_tier}; tier profiles must be non-decreasing");
            }
        }
        let w = self.weights;
        for (name, v) in [
            ("plan", w.plan),
            ("recency", w.recency),
            ("relevance", w.relevance),
            ("engagement", w.engagement),
            ("location", w.location),
        ] {
            if !(v >= 0.0) {
                bail!("weight {name} must be non-negative, got {v}");
            }
        }
        // Base score stays within [0, 100].
        if (w.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            bail!("score weights must sum to 1.0, got {}", w.sum());
        }
        if !(0.0..=1.0).contains(&self.sponsored.share) {
            bail!("sponsored share {} outside [0, 1]", self.sponsored.share);
        }
        Ok(())
    }
}
