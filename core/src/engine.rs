use crate::assemble::{self, CategoryResult, HomepageLimits, HomepageResult, SearchResults};
use crate::catalog::{CandidateSource, SearchFilters};
use crate::gate::should_display;
use crate::{AdView, PlanPolicy, ScoreBreakdown, ScoreCalculator, ViewingContext};
use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A search call: free text, structural filters and the buyer's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub buyer_state: Option<String>,
    pub limit: usize,
}

impl SearchRequest {
    pub fn new(query: Option<String>, limit: usize) -> Self {
        Self { query, filters: SearchFilters::default(), buyer_state: None, limit }
    }

    pub fn context(&self) -> ViewingContext {
        ViewingContext::new(self.query.clone(), self.buyer_state.clone())
    }
}

/// Stateless display engine. Owns the plan policy; candidates, clock and
/// randomness come in with every call, so one engine can serve concurrent
/// requests as long as each brings its own random source.
#[derive(Debug, Clone, Default)]
pub struct DisplayEngine {
    policy: PlanPolicy,
}

impl DisplayEngine {
    pub fn new(policy: PlanPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PlanPolicy {
        &self.policy
    }

    pub fn calculator(&self) -> ScoreCalculator<'_> {
        ScoreCalculator::new(&self.policy)
    }

    pub fn compute_score(&self, ad: &AdView, ctx: &ViewingContext, now: OffsetDateTime) -> f64 {
        self.calculator().compute_score(ad, ctx, now)
    }

    pub fn explain(&self, ad: &AdView, ctx: &ViewingContext, now: OffsetDateTime) -> ScoreBreakdown {
        self.calculator().breakdown(ad, ctx, now)
    }

    pub fn should_display<R: Rng + ?Sized>(&self, ad: &AdView, rng: &mut R) -> bool {
        should_display(&self.policy, ad.plan, rng)
    }

    pub fn homepage<S, R>(&self, source: &S, limits: HomepageLimits, now: OffsetDateTime, rng: &mut R) -> HomepageResult
    where
        S: CandidateSource + ?Sized,
        R: Rng + ?Sized,
    {
        let candidates = source.active_ads();
        assemble::homepage(&self.policy, &candidates, limits, now, rng)
    }

    pub fn category<S, R>(&self, source: &S, category_id: &str, now: OffsetDateTime, rng: &mut R) -> CategoryResult
    where
        S: CandidateSource + ?Sized,
        R: Rng + ?Sized,
    {
        let candidates = source.active_in_category(category_id);
        assemble::category(&self.policy, &candidates, now, rng)
    }

    pub fn search<S, R>(&self, source: &S, req: &SearchRequest, now: OffsetDateTime, rng: &mut R) -> Vec<AdView>
    where
        S: CandidateSource + ?Sized,
        R: Rng + ?Sized,
    {
        self.search_with_metrics(source, req, now, rng).ads
    }

    pub fn search_with_metrics<S, R>(&self, source: &S, req: &SearchRequest, now: OffsetDateTime, rng: &mut R) -> SearchResults
    where
        S: CandidateSource + ?Sized,
        R: Rng + ?Sized,
    {
        let candidates = source.active_matching(&req.filters);
        assemble::search(&self.policy, candidates, &req.context(), req.limit, now, rng)
    }

    pub fn similar<S>(&self, source: &S, current: &AdView, limit: usize, now: OffsetDateTime) -> Vec<AdView>
    where
        S: CandidateSource + ?Sized,
    {
        let candidates = source.active_in_category(&current.category_id);
        assemble::similar(&self.policy, candidates, current, limit, now)
    }
}
