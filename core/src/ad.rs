use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

pub type AdId = String;

/// Seller payment plan. Variants are declared in ascending visibility order, so
/// the derived `Ord` matches the tier ordering the policy table must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Basic,
    Premium,
    Featured,
    Enterprise,
}

impl PlanTier {
    pub const ALL: [PlanTier; 5] = [
        PlanTier::Free,
        PlanTier::Basic,
        PlanTier::Premium,
        PlanTier::Featured,
        PlanTier::Enterprise,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Premium => "premium",
            PlanTier::Featured => "featured",
            PlanTier::Enterprise => "enterprise",
        }
    }

    /// Paid tiers that compete for sponsored search slots and category highlights.
    pub fn is_sponsored(self) -> bool {
        matches!(self, PlanTier::Premium | PlanTier::Featured | PlanTier::Enterprise)
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown plan tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for PlanTier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "basic" => Ok(PlanTier::Basic),
            "premium" => Ok(PlanTier::Premium),
            "featured" => Ok(PlanTier::Featured),
            "enterprise" => Ok(PlanTier::Enterprise),
            _ => Err(UnknownTier(s.to_string())),
        }
    }
}

/// Unknown or null tiers are a policy fallback to Free, not a decode error.
impl<'de> Deserialize<'de> for PlanTier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(match raw {
            Some(s) => s.parse().unwrap_or_else(|e: UnknownTier| {
                tracing::warn!(tier = %e.0, "unknown plan tier, treating as free");
                PlanTier::Free
            }),
            None => PlanTier::Free,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub state: String,
    pub city: String,
}

/// Read-only projection of a listing, as handed to the engine by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdView {
    pub id: AdId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category_id: String,
    #[serde(default)]
    pub subcategory_id: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub plan: PlanTier,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub contacts: u64,
    #[serde(default)]
    pub favorites: u64,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdStatus {
    #[default]
    Pending,
    Active,
    Rejected,
    Expired,
    Paused,
    Sold,
}

/// Per-request viewing context. Blank strings behave like absent values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewingContext {
    pub query: Option<String>,
    pub buyer_state: Option<String>,
}

impl ViewingContext {
    /// No query and no buyer location: every context-dependent sub-score is neutral.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(query: Option<String>, buyer_state: Option<String>) -> Self {
        Self { query, buyer_state }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredAd {
    pub ad: AdView,
    pub score: f64,
}
