use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use ranking::{
    AdView, CatalogEntry, DisplayEngine, InMemoryCatalog, Location, PlanTier, SearchRequest, ViewingContext,
};
use time::{Duration, OffsetDateTime};

fn pool(n: usize, now: OffsetDateTime) -> Vec<AdView> {
    (0..n)
        .map(|i| AdView {
            id: format!("ad-{i}"),
            title: format!("Used bike model {}", i % 37),
            description: Some("Great condition, recently serviced, new tyres".into()),
            category_id: format!("cat-{}", i % 8),
            subcategory_id: None,
            price: (i % 500) as f64 * 10.0,
            plan: PlanTier::ALL[i % PlanTier::ALL.len()],
            created_at: now - Duration::hours((i % 1200) as i64),
            views: (i * 13 % 2000) as u64,
            contacts: (i % 60) as u64,
            favorites: (i % 120) as u64,
            location: Location { state: if i % 3 == 0 { "SP" } else { "RJ" }.into(), city: "Centro".into() },
        })
        .collect()
}

fn bench_scoring(c: &mut Criterion) {
    let now = OffsetDateTime::now_utc();
    let engine = DisplayEngine::default();
    let ads = pool(1_000, now);
    let ctx = ViewingContext::new(Some("used bike tyres".into()), Some("SP".into()));
    c.bench_function("score_1k", |b| {
        b.iter(|| ads.iter().map(|a| engine.compute_score(a, &ctx, now)).sum::<f64>())
    });

    let catalog = InMemoryCatalog::new(pool(10_000, now).into_iter().map(CatalogEntry::active).collect());
    let mut req = SearchRequest::new(Some("bike model 7".into()), 20);
    req.buyer_state = Some("SP".into());
    c.bench_function("search_10k", |b| {
        let mut rng = StdRng::seed_from_u64(1);
        b.iter(|| engine.search(&catalog, &req, now, &mut rng))
    });
}

criterion_group!(benches, bench_scoring);
criterion_main!(benches);
