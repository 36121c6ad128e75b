use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use ranking::catalog::load_entries;
use ranking::{
    CandidateSource, DisplayEngine, HomepageLimits, InMemoryCatalog, PlanPolicy, SearchFilters, SearchRequest,
    ViewingContext,
};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ranker")]
#[command(about = "Assemble homepage, category and search listings from a catalog", long_about = None)]
struct Cli {
    #[command(flatten)]
    common: Common,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Common {
    /// Catalog path (.json/.jsonl file or a directory of them)
    #[arg(long, global = true, default_value = "./sample_data")]
    catalog: PathBuf,
    /// Plan policy JSON; the reference policy is used when omitted
    #[arg(long, global = true)]
    policy: Option<PathBuf>,
    /// Seed for the display gate; entropy is used when omitted
    #[arg(long, global = true)]
    seed: Option<u64>,
    /// Evaluate as of this RFC 3339 instant instead of the current time
    #[arg(long, global = true)]
    now: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Featured, premium and regular homepage sections
    Homepage {
        #[arg(long, default_value_t = 4)]
        featured: usize,
        #[arg(long, default_value_t = 4)]
        premium: usize,
        #[arg(long, default_value_t = 8)]
        regular: usize,
        /// Seconds between featured carousel advances (0 disables rotation)
        #[arg(long, default_value_t = 0)]
        rotation_interval: u64,
    },
    /// Highlighted and regular listings of one category
    Category {
        #[arg(long)]
        id: String,
    },
    /// Free-text search with sponsored slots
    Search {
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        price_min: Option<f64>,
        #[arg(long)]
        price_max: Option<f64>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        city: Option<String>,
        /// Buyer's state for location scoring
        #[arg(long)]
        user_state: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Listings related to one ad
    Similar {
        #[arg(long)]
        id: String,
        #[arg(long, default_value_t = 6)]
        limit: usize,
    },
    /// Score breakdown of one ad
    Explain {
        #[arg(long)]
        id: String,
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        user_state: Option<String>,
    },
    /// Print the effective plan policy
    Policy,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let cli = Cli::parse();
    let common = cli.common;

    let policy = match &common.policy {
        Some(p) => PlanPolicy::from_file(p)?,
        None => PlanPolicy::default(),
    };
    let engine = DisplayEngine::new(policy);

    match cli.command {
        Commands::Policy => print_json(&engine.policy().table()),
        command => run(&engine, command, &common),
    }
}

fn run(engine: &DisplayEngine, command: Commands, common: &Common) -> Result<()> {
    let catalog = load_catalog_tree(&common.catalog)?;
    let now = match &common.now {
        Some(s) => OffsetDateTime::parse(s, &Rfc3339).with_context(|| format!("invalid --now {s}"))?,
        None => OffsetDateTime::now_utc(),
    };
    let seed = common.seed.unwrap_or_else(|| rand::thread_rng().next_u64());
    tracing::info!(seed, "display gate seeded");
    let mut rng = StdRng::seed_from_u64(seed);

    match command {
        Commands::Homepage { featured, premium, regular, rotation_interval } => {
            let limits = HomepageLimits { featured, premium, regular, rotation_interval };
            print_json(&engine.homepage(&catalog, limits, now, &mut rng))
        }
        Commands::Category { id } => print_json(&engine.category(&catalog, &id, now, &mut rng)),
        Commands::Search { q, category, price_min, price_max, state, city, user_state, limit } => {
            let req = SearchRequest {
                query: q,
                filters: SearchFilters { category_id: category, price_min, price_max, state, city },
                buyer_state: user_state,
                limit,
            };
            print_json(&engine.search_with_metrics(&catalog, &req, now, &mut rng))
        }
        Commands::Similar { id, limit } => {
            let current = catalog.find(&id).with_context(|| format!("ad {id} not in catalog"))?;
            print_json(&engine.similar(&catalog, &current, limit, now))
        }
        Commands::Explain { id, q, user_state } => {
            let ad = catalog.find(&id).with_context(|| format!("ad {id} not in catalog"))?;
            let ctx = ViewingContext::new(q, user_state);
            print_json(&engine.explain(&ad, &ctx, now))
        }
        Commands::Policy => print_json(&engine.policy().table()),
    }
}

/// Load every .json/.jsonl file under `input` (or `input` itself when it is a file).
fn load_catalog_tree(input: &Path) -> Result<InMemoryCatalog> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        anyhow::bail!("catalog path {} does not exist", input.display());
    }

    let mut catalog = InMemoryCatalog::default();
    for file in &files {
        catalog.extend(load_entries(file)?);
    }
    tracing::info!(files = files.len(), ads = catalog.len(), "catalog loaded");
    Ok(catalog)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
