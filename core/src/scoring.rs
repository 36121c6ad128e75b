//! Composite display score.
//!
//! Five sub-scores, each clamped to `[0, 100]`, are blended with the policy
//! weights and then multiplied by the tier's boost:
//!
//! - plan: tier priority from the policy table
//! - recency: `max(10, 100 - 3 * whole_days_old)`
//! - relevance: query match against title/description (50 when no query)
//! - engagement: saturating ramps over views, contacts and favorites
//! - location: 100 same state, 30 other state, 50 when the buyer state is unknown
//!
//! The clock is an argument so scoring stays pure.

use crate::text::{eq_ignore_case, is_blank, normalize, query_words};
use crate::{AdView, PlanPolicy, ViewingContext};
use serde::Serialize;
use time::OffsetDateTime;

pub const NEUTRAL_SCORE: f64 = 50.0;

const RECENCY_MAX: f64 = 100.0;
const RECENCY_FLOOR: f64 = 10.0;
const RECENCY_DECAY_PER_DAY: f64 = 3.0;

const RELEVANCE_EXACT_TITLE: f64 = 100.0;
const RELEVANCE_TITLE_CONTAINS: f64 = 80.0;
const RELEVANCE_PER_WORD: f64 = 20.0;
// A query with zero matching words still scores this much.
const RELEVANCE_WORD_BASE: f64 = 20.0;

const VIEWS_SATURATION: f64 = 1000.0;
const CONTACTS_SATURATION: f64 = 50.0;
const FAVORITES_SATURATION: f64 = 100.0;
const VIEWS_SHARE: f64 = 0.40;
const CONTACTS_SHARE: f64 = 0.35;
const FAVORITES_SHARE: f64 = 0.25;

const LOCATION_SAME_STATE: f64 = 100.0;
const LOCATION_OTHER_STATE: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub plan: f64,
    pub recency: f64,
    pub relevance: f64,
    pub engagement: f64,
    pub location: f64,
    pub base: f64,
    pub boost: f64,
    pub total: f64,
}

/// Scores ads against one policy. Cheap to construct; borrows the policy.
#[derive(Debug, Clone, Copy)]
pub struct ScoreCalculator<'a> {
    policy: &'a PlanPolicy,
}

impl<'a> ScoreCalculator<'a> {
    pub fn new(policy: &'a PlanPolicy) -> Self {
        Self { policy }
    }

    pub fn compute_score(&self, ad: &AdView, ctx: &ViewingContext, now: OffsetDateTime) -> f64 {
        self.breakdown(ad, ctx, now).total
    }

    pub fn breakdown(&self, ad: &AdView, ctx: &ViewingContext, now: OffsetDateTime) -> ScoreBreakdown {
        let w = &self.policy.weights;
        let plan = clamp100(self.policy.priority(ad.plan));
        let recency = recency_score(ad.created_at, now);
        let relevance = relevance_score(ad, ctx.query.as_deref());
        let engagement = engagement_score(ad);
        let location = location_score(ad, ctx.buyer_state.as_deref());

        let base = plan * w.plan
            + recency * w.recency
            + relevance * w.relevance
            + engagement * w.engagement
            + location * w.location;
        let boost = self.policy.boost(ad.plan);

        ScoreBreakdown {
            plan,
            recency,
            relevance,
            engagement,
            location,
            base,
            boost,
            total: base * boost,
        }
    }
}

fn clamp100(x: f64) -> f64 {
    x.clamp(0.0, 100.0)
}

/// Whole days elapsed, truncated. Ads dated in the future count as day 0.
pub fn recency_score(created_at: OffsetDateTime, now: OffsetDateTime) -> f64 {
    let days = (now - created_at).whole_days().max(0) as f64;
    clamp100((RECENCY_MAX - RECENCY_DECAY_PER_DAY * days).max(RECENCY_FLOOR))
}

pub fn relevance_score(ad: &AdView, query: Option<&str>) -> f64 {
    if is_blank(query) {
        return NEUTRAL_SCORE;
    }
    let query = normalize(query.unwrap_or_default().trim());
    let title = normalize(&ad.title);

    if title == query {
        return RELEVANCE_EXACT_TITLE;
    }
    if title.contains(&query) {
        return RELEVANCE_TITLE_CONTAINS;
    }

    let description = ad.description.as_deref().map(normalize).unwrap_or_default();
    let matching = query_words(&query)
        .into_iter()
        .filter(|word| title.contains(word) || description.contains(word))
        .count();
    clamp100(matching as f64 * RELEVANCE_PER_WORD + RELEVANCE_WORD_BASE)
}

pub fn engagement_score(ad: &AdView) -> f64 {
    let ramp = |count: u64, saturation: f64| (count as f64 / saturation * 100.0).min(100.0);
    let blended = ramp(ad.views, VIEWS_SATURATION) * VIEWS_SHARE
        + ramp(ad.contacts, CONTACTS_SATURATION) * CONTACTS_SHARE
        + ramp(ad.favorites, FAVORITES_SATURATION) * FAVORITES_SHARE;
    clamp100(blended)
}

pub fn location_score(ad: &AdView, buyer_state: Option<&str>) -> f64 {
    match buyer_state {
        Some(state) if !state.trim().is_empty() => {
            if eq_ignore_case(&ad.location.state, state) {
                LOCATION_SAME_STATE
            } else {
                LOCATION_OTHER_STATE
            }
        }
        _ => NEUTRAL_SCORE,
    }
}
