//! Candidate retrieval. The engine never queries storage itself; it asks a
//! [`CandidateSource`] for ads already filtered to `active` plus any structural
//! criteria. [`InMemoryCatalog`] is the file-backed implementation used by the
//! binaries and tests.

use crate::text::eq_ignore_case;
use crate::{AdStatus, AdView};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Structural search filters. All optional; price bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub category_id: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub state: Option<String>,
    pub city: Option<String>,
}

impl SearchFilters {
    pub fn matches(&self, ad: &AdView) -> bool {
        fn text_ok(want: &Option<String>, have: &str, same: fn(&str, &str) -> bool) -> bool {
            match want.as_deref().map(str::trim) {
                Some(w) if !w.is_empty() => same(w, have),
                _ => true,
            }
        }
        text_ok(&self.category_id, &ad.category_id, |a, b| a == b)
            && self.price_min.map_or(true, |min| ad.price >= min)
            && self.price_max.map_or(true, |max| ad.price <= max)
            && text_ok(&self.state, &ad.location.state, eq_ignore_case)
            && text_ok(&self.city, &ad.location.city, eq_ignore_case)
    }
}

pub trait CandidateSource {
    /// Every active ad.
    fn active_ads(&self) -> Vec<AdView>;
    /// Active ads in one category.
    fn active_in_category(&self, category_id: &str) -> Vec<AdView>;
    /// Active ads passing the structural filters.
    fn active_matching(&self, filters: &SearchFilters) -> Vec<AdView>;
    /// Lookup by id regardless of status.
    fn find(&self, id: &str) -> Option<AdView>;
}

/// A persisted listing as stored in the catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub status: AdStatus,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(flatten)]
    pub ad: AdView,
}

impl CatalogEntry {
    pub fn active(ad: AdView) -> Self {
        Self { status: AdStatus::Active, slug: None, ad }
    }

    pub fn is_active(&self) -> bool {
        self.status == AdStatus::Active
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    entries: Vec<CatalogEntry>,
}

impl InMemoryCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = CatalogEntry>) {
        self.entries.extend(entries);
    }

    pub fn find_by_slug(&self, slug: &str) -> Option<AdView> {
        self.entries
            .iter()
            .find(|e| e.slug.as_deref() == Some(slug))
            .map(|e| e.ad.clone())
    }

    fn active_where(&self, pred: impl Fn(&AdView) -> bool) -> Vec<AdView> {
        self.entries
            .iter()
            .filter(|e| e.is_active() && pred(&e.ad))
            .map(|e| e.ad.clone())
            .collect()
    }
}

impl CandidateSource for InMemoryCatalog {
    fn active_ads(&self) -> Vec<AdView> {
        self.active_where(|_| true)
    }

    fn active_in_category(&self, category_id: &str) -> Vec<AdView> {
        self.active_where(|ad| ad.category_id == category_id)
    }

    fn active_matching(&self, filters: &SearchFilters) -> Vec<AdView> {
        self.active_where(|ad| filters.matches(ad))
    }

    fn find(&self, id: &str) -> Option<AdView> {
        self.entries.iter().find(|e| e.ad.id == id).map(|e| e.ad.clone())
    }
}

/// Load catalog entries from a `.jsonl` file (one entry per line) or a `.json`
/// file holding either an array of entries or a single entry.
pub fn load_entries(path: &Path) -> Result<Vec<CatalogEntry>> {
    let f = File::open(path).with_context(|| format!("open catalog {}", path.display()))?;
    let reader = BufReader::new(f);
    let mut out = Vec::new();
    if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: CatalogEntry = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}", path.display(), lineno + 1))?;
            out.push(entry);
        }
    } else {
        let json: serde_json::Value = serde_json::from_reader(reader)
            .with_context(|| format!("parse catalog {}", path.display()))?;
        match json {
            serde_json::Value::Array(arr) => {
                for (i, v) in arr.into_iter().enumerate() {
                    let entry: CatalogEntry =
                        serde_json::from_value(v).with_context(|| format!("{}[{i}]", path.display()))?;
                    out.push(entry);
                }
            }
            serde_json::Value::Object(map) => {
                let entry: CatalogEntry = serde_json::from_value(serde_json::Value::Object(map))
                    .with_context(|| path.display().to_string())?;
                out.push(entry);
            }
            other => bail!("{}: expected an object or an array of objects, got {other}", path.display()),
        }
    }
    Ok(out)
}

pub fn load_catalog(path: &Path) -> Result<InMemoryCatalog> {
    let entries = load_entries(path)?;
    let active = entries.iter().filter(|e| e.is_active()).count();
    tracing::info!(path = %path.display(), total = entries.len(), active, "catalog loaded");
    Ok(InMemoryCatalog::new(entries))
}
