use rand::rngs::mock::StepRng;
use rand::rngs::StdRng;
use rand::SeedableRng;
use ranking::assemble::featured_rotation_offset;
use ranking::{
    AdView, CandidateSource, CatalogEntry, DisplayEngine, HomepageLimits, InMemoryCatalog, Location, PlanTier,
    SearchRequest, ViewingContext,
};
use std::collections::HashSet;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

const NOW: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

fn ad(id: &str, tier: PlanTier, age_days: i64) -> AdView {
    AdView {
        id: id.into(),
        title: format!("Listing {id}"),
        description: None,
        category_id: "vehicles".into(),
        subcategory_id: None,
        price: 100.0,
        plan: tier,
        created_at: NOW - Duration::days(age_days),
        views: 0,
        contacts: 0,
        favorites: 0,
        location: Location { state: "SP".into(), city: "Campinas".into() },
    }
}

fn catalog(ads: Vec<AdView>) -> InMemoryCatalog {
    InMemoryCatalog::new(ads.into_iter().map(CatalogEntry::active).collect())
}

/// Every draw is 0.0: all tiers pass the gate.
fn pass_all() -> StepRng {
    StepRng::new(0, 0)
}

/// Every draw is just under 1.0: only Enterprise passes.
fn pass_none() -> StepRng {
    StepRng::new(u64::MAX, 0)
}

fn mixed_pool() -> Vec<AdView> {
    let mut ads = Vec::new();
    for (i, tier) in PlanTier::ALL.iter().enumerate() {
        for j in 0..4 {
            ads.push(ad(&format!("{}-{j}", tier.as_str()), *tier, (i * 3 + j) as i64));
        }
    }
    ads
}

fn ids(ads: &[AdView]) -> Vec<&str> {
    ads.iter().map(|a| a.id.as_str()).collect()
}

#[test]
fn homepage_sections_partition_by_tier() {
    let engine = DisplayEngine::default();
    let src = catalog(mixed_pool());
    let limits = HomepageLimits { featured: 100, premium: 100, regular: 100, rotation_interval: 0 };
    let home = engine.homepage(&src, limits, NOW, &mut pass_all());

    assert_eq!(home.featured.len(), 8);
    assert_eq!(home.premium.len(), 4);
    assert_eq!(home.regular.len(), 8);
    assert!(home.featured.iter().all(|a| matches!(a.plan, PlanTier::Enterprise | PlanTier::Featured)));
    assert!(home.premium.iter().all(|a| a.plan == PlanTier::Premium));
    assert!(home.regular.iter().all(|a| matches!(a.plan, PlanTier::Basic | PlanTier::Free)));

    let mut seen = HashSet::new();
    for a in home.featured.iter().chain(&home.premium).chain(&home.regular) {
        assert!(seen.insert(a.id.clone()), "{} appears twice", a.id);
    }
}

#[test]
fn homepage_sorts_and_truncates() {
    let engine = DisplayEngine::default();
    let src = catalog(mixed_pool());
    let limits = HomepageLimits { featured: 3, premium: 2, regular: 1, rotation_interval: 0 };
    let home = engine.homepage(&src, limits, NOW, &mut pass_all());

    // Enterprise boost beats Featured, and fresher ads beat older ones
    assert_eq!(ids(&home.featured), vec!["enterprise-0", "enterprise-1", "enterprise-2"]);
    assert_eq!(ids(&home.premium), vec!["premium-0", "premium-1"]);
    assert_eq!(ids(&home.regular), vec!["basic-0"]);
}

#[test]
fn homepage_gate_only_admits_enterprise_on_high_draws() {
    let engine = DisplayEngine::default();
    let src = catalog(mixed_pool());
    let home = engine.homepage(&src, HomepageLimits::default(), NOW, &mut pass_none());
    assert!(home.featured.iter().all(|a| a.plan == PlanTier::Enterprise));
    assert_eq!(home.featured.len(), 4);
    assert!(home.premium.is_empty());
    assert!(home.regular.is_empty());
}

#[test]
fn enterprise_always_reaches_featured_section() {
    let engine = DisplayEngine::default();
    let src = catalog(mixed_pool());
    let limits = HomepageLimits { featured: 8, premium: 4, regular: 8, rotation_interval: 0 };
    for seed in 0..100 {
        let home = engine.homepage(&src, limits, NOW, &mut StdRng::seed_from_u64(seed));
        let enterprise = home.featured.iter().filter(|a| a.plan == PlanTier::Enterprise).count();
        assert_eq!(enterprise, 4, "seed {seed}");
    }
}

#[test]
fn category_returns_everything_eligible() {
    let engine = DisplayEngine::default();
    let mut pool = mixed_pool();
    let mut other = ad("other-cat", PlanTier::Enterprise, 0);
    other.category_id = "furniture".into();
    pool.push(other);
    let src = catalog(pool);

    let page = engine.category(&src, "vehicles", NOW, &mut pass_all());
    assert_eq!(page.highlighted.len(), 12);
    assert_eq!(page.regular.len(), 8);
    assert!(page.highlighted.iter().all(|a| a.plan.is_sponsored()));
    assert!(!ids(&page.highlighted).contains(&"other-cat"));
    assert_eq!(page.highlighted[0].id, "enterprise-0");
}

#[test]
fn search_fills_available_sponsored_slots_then_organic() {
    let engine = DisplayEngine::default();
    let mut pool = vec![ad("s1", PlanTier::Premium, 20), ad("s2", PlanTier::Featured, 25)];
    for i in 0..20 {
        pool.push(ad(&format!("o{i:02}"), PlanTier::Free, i));
    }
    let src = catalog(pool);

    let out = engine.search_with_metrics(&src, &SearchRequest::new(None, 10), NOW, &mut pass_all());
    assert_eq!(out.metrics.sponsored_slots, 3);
    assert_eq!(out.metrics.sponsored_filled, 2);
    assert_eq!(out.ads.len(), 10);
    assert!(out.ads[..2].iter().all(|a| a.plan.is_sponsored()));
    assert!(out.ads[2..].iter().all(|a| a.plan == PlanTier::Free));
    // organic part keeps score order: freshest first
    assert_eq!(ids(&out.ads[2..5]), vec!["o00", "o01", "o02"]);
}

#[test]
fn search_caps_reserved_slots_and_never_duplicates() {
    let engine = DisplayEngine::default();
    let src = catalog(mixed_pool());
    for limit in [0usize, 1, 3, 4, 5, 10, 50] {
        for seed in 0..20 {
            let req = SearchRequest::new(Some("listing".into()), limit);
            let out = engine.search_with_metrics(&src, &req, NOW, &mut StdRng::seed_from_u64(seed));
            let cap = 3.min((limit as f64 * 0.25).ceil() as usize);
            assert!(out.ads.len() <= limit);
            assert!(out.metrics.sponsored_filled <= cap);
            assert!(out.ads[..out.metrics.sponsored_filled].iter().all(|a| a.plan.is_sponsored()));
            let unique: HashSet<_> = out.ads.iter().map(|a| &a.id).collect();
            assert_eq!(unique.len(), out.ads.len());
        }
    }
}

#[test]
fn search_applies_filters_and_context() {
    let engine = DisplayEngine::default();
    let mut near = ad("near", PlanTier::Free, 0);
    near.title = "Red hatchback".into();
    let mut far = ad("far", PlanTier::Free, 0);
    far.title = "Red hatchback".into();
    far.location.state = "RJ".into();
    let mut pricey = ad("pricey", PlanTier::Enterprise, 0);
    pricey.price = 99_999.0;
    let src = catalog(vec![far, near, pricey]);

    let mut req = SearchRequest::new(Some("red hatchback".into()), 10);
    req.buyer_state = Some("sp".into());
    req.filters.price_max = Some(1_000.0);
    let out = engine.search(&src, &req, NOW, &mut pass_all());
    assert_eq!(ids(&out), vec!["near", "far"]);
}

#[test]
fn seeded_runs_are_reproducible() {
    let engine = DisplayEngine::default();
    let src = catalog(mixed_pool());
    let req = SearchRequest::new(Some("listing".into()), 12);
    let a = engine.search(&src, &req, NOW, &mut StdRng::seed_from_u64(42));
    let b = engine.search(&src, &req, NOW, &mut StdRng::seed_from_u64(42));
    assert_eq!(a, b);
}

#[test]
fn equal_scores_fall_back_to_id_order() {
    let engine = DisplayEngine::default();
    let src = catalog(vec![ad("c", PlanTier::Free, 0), ad("a", PlanTier::Free, 0), ad("b", PlanTier::Free, 0)]);
    let page = engine.category(&src, "vehicles", NOW, &mut pass_all());
    assert_eq!(ids(&page.regular), vec!["a", "b", "c"]);
}

#[test]
fn reference_scenarios() {
    let engine = DisplayEngine::default();
    let fresh = ad("e", PlanTier::Enterprise, 0);
    let score = engine.compute_score(&fresh, &ViewingContext::empty(), NOW);
    assert!((score - 232.5).abs() < 1e-9);

    let mut car = ad("car", PlanTier::Free, 0);
    car.title = "Blue hatchback for sale".into();
    car.description = Some("Car in great shape".into());
    let ctx = ViewingContext::new(Some("red car".into()), None);
    assert_eq!(engine.explain(&car, &ctx, NOW).relevance, 40.0);
}

#[test]
fn similar_prefers_same_subcategory_and_skips_self() {
    let engine = DisplayEngine::default();
    let mut current = ad("current", PlanTier::Free, 0);
    current.subcategory_id = Some("sedans".into());
    let mut same_sub = ad("same-sub", PlanTier::Free, 10);
    same_sub.subcategory_id = Some("sedans".into());
    let other_sub = ad("other-sub", PlanTier::Free, 0);
    let mut elsewhere = ad("elsewhere", PlanTier::Enterprise, 0);
    elsewhere.category_id = "furniture".into();
    let src = catalog(vec![current.clone(), same_sub, other_sub, elsewhere]);

    let related = engine.similar(&src, &current, 6, NOW);
    assert_eq!(ids(&related), vec!["same-sub", "other-sub"]);
    assert_eq!(engine.similar(&src, &current, 1, NOW).len(), 1);
}

#[test]
fn inactive_entries_never_reach_the_engine() {
    let engine = DisplayEngine::default();
    let mut paused = CatalogEntry::active(ad("paused", PlanTier::Enterprise, 0));
    paused.status = ranking::AdStatus::Paused;
    let src = InMemoryCatalog::new(vec![paused, CatalogEntry::active(ad("live", PlanTier::Enterprise, 0))]);
    let home = engine.homepage(&src, HomepageLimits::default(), NOW, &mut pass_all());
    assert_eq!(ids(&home.featured), vec!["live"]);
    assert!(src.find("paused").is_some());
}

#[test]
fn homepage_rotates_featured_carousel() {
    let engine = DisplayEngine::default();
    let src = catalog(mixed_pool());
    // NOW is a whole number of minutes; one and two minutes later the
    // carousel has advanced 3 and 6 positions through the 8 featured ads.
    let later = NOW + Duration::minutes(1);
    let full = HomepageLimits { featured: 100, rotation_interval: 0, ..Default::default() };
    let ranked = engine.homepage(&src, full, later, &mut pass_all()).featured;
    assert_eq!(ranked.len(), 8);
    let ranked = ids(&ranked);

    let carousel = HomepageLimits { featured: 3, rotation_interval: 60, ..Default::default() };
    let home = engine.homepage(&src, carousel, NOW, &mut pass_all());
    assert_eq!(ids(&home.featured), ranked[..3].to_vec());

    let home = engine.homepage(&src, carousel, later, &mut pass_all());
    assert_eq!(ids(&home.featured), ranked[3..6].to_vec());

    let home = engine.homepage(&src, carousel, later + Duration::minutes(1), &mut pass_all());
    assert_eq!(ids(&home.featured), vec![ranked[6], ranked[7], ranked[0]]);

    // Rotation only reorders the featured section.
    let still = engine.homepage(&src, HomepageLimits { featured: 3, ..Default::default() }, later, &mut pass_all());
    assert_eq!(ids(&still.featured), ranked[..3].to_vec());
    assert_eq!(home.premium, still.premium);
}

#[test]
fn rotation_offset_cycles() {
    let t0 = OffsetDateTime::from_unix_timestamp(0).unwrap();
    assert_eq!(featured_rotation_offset(0, 4, 30, t0), 0);
    assert_eq!(featured_rotation_offset(10, 4, 0, t0), 0);
    assert_eq!(featured_rotation_offset(10, 4, 30, t0), 0);
    assert_eq!(featured_rotation_offset(10, 4, 30, t0 + Duration::seconds(30)), 4);
    assert_eq!(featured_rotation_offset(10, 4, 30, t0 + Duration::seconds(89)), 8);
    assert_eq!(featured_rotation_offset(10, 4, 30, t0 + Duration::seconds(90)), 2);
}

#[test]
fn engine_gate_follows_the_ad_tier() {
    let engine = DisplayEngine::default();
    let enterprise = ad("e", PlanTier::Enterprise, 0);
    let free = ad("f", PlanTier::Free, 0);

    assert!(engine.should_display(&enterprise, &mut pass_none()));
    assert!(engine.should_display(&enterprise, &mut pass_all()));
    assert!(engine.should_display(&free, &mut pass_all()));
    assert!(!engine.should_display(&free, &mut pass_none()));

    // Free shows at roughly its configured probability.
    let p = engine.policy().display_probability(PlanTier::Free);
    let mut rng = StdRng::seed_from_u64(7);
    let shown = (0..10_000).filter(|_| engine.should_display(&free, &mut rng)).count();
    assert!((shown as f64 / 10_000.0 - p).abs() < 0.03, "shown {shown}, p {p}");
}
