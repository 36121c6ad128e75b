//! Result assembly for the three presentation surfaces.
//!
//! Every function here works on a candidate list that the caller has already
//! fetched. The pipeline is the same everywhere: partition by tier, gate, score,
//! sort, shape. Sorting is by score descending with ties broken by ascending ad
//! id, so output is reproducible for a given clock and random source.

use crate::gate::should_display;
use crate::{AdView, PlanPolicy, PlanTier, ScoreCalculator, ScoredAd, ViewingContext};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use time::OffsetDateTime;

const SIMILAR_SUBCATEGORY_BONUS: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomepageLimits {
    pub featured: usize,
    pub premium: usize,
    pub regular: usize,
    /// Seconds between featured carousel advances; 0 keeps the ranked order.
    pub rotation_interval: u64,
}

impl Default for HomepageLimits {
    fn default() -> Self {
        Self { featured: 4, premium: 4, regular: 8, rotation_interval: 0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HomepageResult {
    pub featured: Vec<AdView>,
    pub premium: Vec<AdView>,
    pub regular: Vec<AdView>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryResult {
    pub highlighted: Vec<AdView>,
    pub regular: Vec<AdView>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplayMetrics {
    /// Candidates handed over by the source.
    pub candidates: usize,
    /// Candidates that passed the display gate.
    pub eligible: usize,
    /// Leading positions reserved for sponsored tiers.
    pub sponsored_slots: usize,
    /// Reserved positions actually filled.
    pub sponsored_filled: usize,
    /// Sponsored-tier ads anywhere in the page, reserved slots included.
    pub sponsored_tier_shown: usize,
    pub organic_shown: usize,
    pub average_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub ads: Vec<AdView>,
    pub metrics: DisplayMetrics,
}

/// Descending score, then ascending id.
pub fn by_score_desc(a: &ScoredAd, b: &ScoredAd) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.ad.id.cmp(&b.ad.id))
}

/// Score every ad and sort with [`by_score_desc`].
pub fn rank(
    policy: &PlanPolicy,
    ads: Vec<AdView>,
    ctx: &ViewingContext,
    now: OffsetDateTime,
) -> Vec<ScoredAd> {
    let calc = ScoreCalculator::new(policy);
    let mut scored: Vec<ScoredAd> = ads
        .into_iter()
        .map(|ad| {
            let score = calc.compute_score(&ad, ctx, now);
            ScoredAd { ad, score }
        })
        .collect();
    scored.sort_by(by_score_desc);
    scored
}

/// Keep the ads whose tier is in `tiers` and that pass the gate, in input order.
pub fn gate<R: Rng + ?Sized>(
    policy: &PlanPolicy,
    ads: impl IntoIterator<Item = AdView>,
    tiers: &[PlanTier],
    rng: &mut R,
) -> Vec<AdView> {
    ads.into_iter()
        .filter(|ad| tiers.contains(&ad.plan))
        .filter(|ad| should_display(policy, ad.plan, rng))
        .collect()
}

fn section<R: Rng + ?Sized>(
    policy: &PlanPolicy,
    candidates: &[AdView],
    tiers: &[PlanTier],
    limit: Option<usize>,
    now: OffsetDateTime,
    rng: &mut R,
) -> Vec<AdView> {
    let eligible = gate(policy, candidates.iter().cloned(), tiers, rng);
    let ranked = rank(policy, eligible, &ViewingContext::empty(), now);
    let take = limit.unwrap_or(ranked.len());
    ranked.into_iter().take(take).map(|s| s.ad).collect()
}

const HOMEPAGE_FEATURED: &[PlanTier] = &[PlanTier::Enterprise, PlanTier::Featured];
const HOMEPAGE_PREMIUM: &[PlanTier] = &[PlanTier::Premium];
const REGULAR_TIERS: &[PlanTier] = &[PlanTier::Basic, PlanTier::Free];
const HIGHLIGHT_TIERS: &[PlanTier] = &[PlanTier::Premium, PlanTier::Featured, PlanTier::Enterprise];

/// Homepage sections are disjoint tier partitions of the same pool. Gating is
/// drawn fresh on every call. With a non-zero `rotation_interval` the ranked
/// featured list is rotated as a carousel before it is cut to size.
pub fn homepage<R: Rng + ?Sized>(
    policy: &PlanPolicy,
    candidates: &[AdView],
    limits: HomepageLimits,
    now: OffsetDateTime,
    rng: &mut R,
) -> HomepageResult {
    let mut featured = section(policy, candidates, HOMEPAGE_FEATURED, None, now, rng);
    let offset = featured_rotation_offset(featured.len(), limits.featured, limits.rotation_interval, now);
    featured.rotate_left(offset);
    featured.truncate(limits.featured);
    let premium = section(policy, candidates, HOMEPAGE_PREMIUM, Some(limits.premium), now, rng);
    let regular = section(policy, candidates, REGULAR_TIERS, Some(limits.regular), now, rng);
    tracing::debug!(
        candidates = candidates.len(),
        featured = featured.len(),
        rotation = offset,
        premium = premium.len(),
        regular = regular.len(),
        "homepage assembled"
    );
    HomepageResult { featured, premium, regular }
}

/// Category page: highlighted paid tiers above regular ones, neither truncated.
pub fn category<R: Rng + ?Sized>(
    policy: &PlanPolicy,
    candidates: &[AdView],
    now: OffsetDateTime,
    rng: &mut R,
) -> CategoryResult {
    let highlighted = section(policy, candidates, HIGHLIGHT_TIERS, None, now, rng);
    let regular = section(policy, candidates, REGULAR_TIERS, None, now, rng);
    tracing::debug!(
        candidates = candidates.len(),
        highlighted = highlighted.len(),
        regular = regular.len(),
        "category assembled"
    );
    CategoryResult { highlighted, regular }
}

/// Free-text search with sponsored-slot mixing.
///
/// The first `min(max_slots, ceil(limit * share))` positions go to the best
/// scoring sponsored-tier ads (fewer if there are not enough, never padded).
/// The rest of the page is the remaining score-ordered list minus those ads.
pub fn search<R: Rng + ?Sized>(
    policy: &PlanPolicy,
    candidates: Vec<AdView>,
    ctx: &ViewingContext,
    limit: usize,
    now: OffsetDateTime,
    rng: &mut R,
) -> SearchResults {
    let total = candidates.len();
    let eligible: Vec<AdView> = candidates
        .into_iter()
        .filter(|ad| should_display(policy, ad.plan, rng))
        .collect();
    let eligible_count = eligible.len();
    let ranked = rank(policy, eligible, ctx, now);

    let slots = policy.sponsored.slots_for(limit);
    let sponsored: Vec<&ScoredAd> = ranked
        .iter()
        .filter(|s| s.ad.plan.is_sponsored())
        .take(slots)
        .collect();
    let placed: HashSet<&str> = sponsored.iter().map(|s| s.ad.id.as_str()).collect();
    let remaining = ranked
        .iter()
        .filter(|s| !placed.contains(s.ad.id.as_str()))
        .take(limit.saturating_sub(sponsored.len()));

    let page: Vec<&ScoredAd> = sponsored.iter().copied().chain(remaining).take(limit).collect();

    let sponsored_tier_shown = page.iter().filter(|s| s.ad.plan.is_sponsored()).count();
    let average_score = if page.is_empty() {
        0.0
    } else {
        page.iter().map(|s| s.score).sum::<f64>() / page.len() as f64
    };
    let metrics = DisplayMetrics {
        candidates: total,
        eligible: eligible_count,
        sponsored_slots: slots,
        sponsored_filled: sponsored.len(),
        sponsored_tier_shown,
        organic_shown: page.len() - sponsored_tier_shown,
        average_score,
    };
    tracing::debug!(
        candidates = total,
        eligible = eligible_count,
        slots,
        sponsored = metrics.sponsored_filled,
        returned = page.len(),
        "search assembled"
    );
    SearchResults {
        ads: page.into_iter().map(|s| s.ad.clone()).collect(),
        metrics,
    }
}

/// Ads related to `current`: same category, not `current` itself, subcategory
/// matches ranked up. No gating.
pub fn similar(
    policy: &PlanPolicy,
    candidates: Vec<AdView>,
    current: &AdView,
    limit: usize,
    now: OffsetDateTime,
) -> Vec<AdView> {
    let calc = ScoreCalculator::new(policy);
    let ctx = ViewingContext::empty();
    let mut scored: Vec<ScoredAd> = candidates
        .into_iter()
        .filter(|ad| ad.id != current.id && ad.category_id == current.category_id)
        .map(|ad| {
            let same_sub = ad.subcategory_id.is_some() && ad.subcategory_id == current.subcategory_id;
            let bonus = if same_sub { SIMILAR_SUBCATEGORY_BONUS } else { 0.0 };
            let score = calc.compute_score(&ad, &ctx, now) + bonus;
            ScoredAd { ad, score }
        })
        .collect();
    scored.sort_by(by_score_desc);
    scored.into_iter().take(limit).map(|s| s.ad).collect()
}

/// Start index into a featured carousel of `total` ads showing `slots` at a
/// time, advancing every `interval_secs`.
pub fn featured_rotation_offset(total: usize, slots: usize, interval_secs: u64, now: OffsetDateTime) -> usize {
    if total == 0 || interval_secs == 0 {
        return 0;
    }
    let secs = now.unix_timestamp().max(0) as u64;
    let rotations = secs / interval_secs;
    ((rotations as u128 * slots as u128) % total as u128) as usize
}
