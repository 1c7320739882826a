//! OSE CLI
//!
//! Scores companies from dated activity signals and static attributes.

mod input;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ose_core::{CompanyProfile, EngineConfig, FeatureSchema, Polarity, RawActivityRecord};
use ose_model::{check_compatibility, create_backend, ModelArtifact, SharedModel};
use ose_runtime::{
    build_training_set, default_concurrency, BatchConfig, BatchResult, BatchRunner,
    DEFAULT_MODEL_TIMEOUT_MS,
};

use crate::input::{read_jsonl, JsonlInput};

#[derive(Parser)]
#[command(name = "ose")]
#[command(author, version, about = "OSE: opportunity scoring from company activity signals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Score, explain and rank a batch of companies
    Score {
        /// Activity events (JSON lines)
        #[arg(short, long)]
        events: PathBuf,

        /// Company profiles (JSON lines)
        #[arg(short, long)]
        profiles: Option<PathBuf>,

        /// Reference date (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Engine configuration (TOML, default: embedded)
        #[arg(long, env = "OSE_CONFIG")]
        config: Option<PathBuf>,

        /// Model artifact (JSON or TOML, default: embedded)
        #[arg(long, env = "OSE_MODEL")]
        model: Option<PathBuf>,

        /// Number of ranked companies (overrides the configuration)
        #[arg(long)]
        top: Option<usize>,

        /// Contributions shown per ranked company
        #[arg(long, default_value = "3")]
        explain: usize,

        /// Write the full batch result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Companies scored concurrently (default: available parallelism)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-company model timeout in milliseconds
        #[arg(long, default_value_t = DEFAULT_MODEL_TIMEOUT_MS)]
        timeout_ms: u64,
    },

    /// Build a labeled training set (JSON lines)
    Label {
        /// Activity events (JSON lines)
        #[arg(short, long)]
        events: PathBuf,

        /// Company profiles (JSON lines)
        #[arg(short, long)]
        profiles: Option<PathBuf>,

        /// Snapshot date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,

        /// Engine configuration (TOML, default: embedded)
        #[arg(long, env = "OSE_CONFIG")]
        config: Option<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show the taxonomy or resolve raw tags
    Taxonomy {
        /// Engine configuration (TOML, default: embedded)
        #[arg(long, env = "OSE_CONFIG")]
        config: Option<PathBuf>,

        /// Raw tags to resolve
        tags: Vec<String>,
    },

    /// Validate a configuration and model pair
    Check {
        /// Engine configuration (TOML, default: embedded)
        #[arg(long, env = "OSE_CONFIG")]
        config: Option<PathBuf>,

        /// Model artifact (JSON or TOML, default: embedded)
        #[arg(long, env = "OSE_MODEL")]
        model: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match cli.command {
        Commands::Score {
            events,
            profiles,
            date,
            config,
            model,
            top,
            explain,
            output,
            concurrency,
            timeout_ms,
        } => {
            let options = ScoreOptions {
                events,
                profiles,
                reference_date: date.unwrap_or_else(|| chrono::Local::now().date_naive()),
                config,
                model,
                top,
                explain,
                output,
                concurrency: concurrency.unwrap_or_else(default_concurrency),
                timeout_ms,
            };
            run_score(options).await?;
        }
        Commands::Label {
            events,
            profiles,
            date,
            config,
            output,
        } => {
            run_label(&events, profiles.as_deref(), date, config.as_deref(), &output)?;
        }
        Commands::Taxonomy { config, tags } => {
            show_taxonomy(config.as_deref(), &tags)?;
        }
        Commands::Check { config, model } => {
            check(config.as_deref(), model.as_deref())?;
        }
    }

    Ok(())
}

struct ScoreOptions {
    events: PathBuf,
    profiles: Option<PathBuf>,
    reference_date: NaiveDate,
    config: Option<PathBuf>,
    model: Option<PathBuf>,
    top: Option<usize>,
    explain: usize,
    output: Option<PathBuf>,
    concurrency: usize,
    timeout_ms: u64,
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => EngineConfig::embedded()?,
    };
    info!(
        "Configuration {} (taxonomy {})",
        config.version,
        config.taxonomy.version()
    );
    Ok(config)
}

fn load_model(path: Option<&Path>) -> Result<SharedModel> {
    let artifact = match path {
        Some(path) => ModelArtifact::load(path)
            .with_context(|| format!("loading model {}", path.display()))?,
        None => ModelArtifact::embedded()?,
    };
    Ok(create_backend(&artifact)?)
}

fn load_inputs(
    events: &Path,
    profiles: Option<&Path>,
) -> Result<(Vec<RawActivityRecord>, Vec<CompanyProfile>)> {
    let events: JsonlInput<RawActivityRecord> = read_jsonl(events)?;
    let profiles: JsonlInput<CompanyProfile> = match profiles {
        Some(path) => read_jsonl(path)?,
        None => JsonlInput {
            records: Vec::new(),
            rejected: Vec::new(),
        },
    };

    if !events.rejected.is_empty() || !profiles.rejected.is_empty() {
        println!(
            "⚠️  Skipped {} undecodable event lines and {} undecodable profile lines",
            events.rejected.len(),
            profiles.rejected.len()
        );
    }

    Ok((events.records, profiles.records))
}

async fn run_score(options: ScoreOptions) -> Result<()> {
    let mut config = load_config(options.config.as_deref())?;
    if let Some(top) = options.top {
        config.top_n = top;
        config.validate()?;
    }
    let model = load_model(options.model.as_deref())?;
    let (records, profiles) = load_inputs(&options.events, options.profiles.as_deref())?;

    let batch = BatchConfig::new(config, model, options.reference_date)
        .with_concurrency(options.concurrency)
        .with_timeout_ms(options.timeout_ms);
    let runner = BatchRunner::new(batch)?;
    let result = runner.run(&records, profiles).await?;

    print_result(&result, options.explain);

    if let Some(path) = options.output {
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, &result)?;
        println!("\n📄 Batch result saved to: {}", path.display());
    }

    Ok(())
}

fn print_result(result: &BatchResult, explain: usize) {
    let stats = &result.stats;
    println!(
        "📊 {} | model {} | taxonomy {}",
        result.reference_date, result.model_version, result.taxonomy_version
    );
    println!(
        "   Events: {} seen, {} accepted, {} malformed, {} unrecognized",
        stats.ingest.events_seen,
        stats.ingest.events_accepted,
        stats.ingest.events_malformed,
        stats.ingest.events_unrecognized
    );
    println!(
        "   Companies: {} scored, {} failed, {} without profile, {} attributes imputed\n",
        stats.companies_scored,
        stats.companies_failed,
        stats.ingest.companies_without_profile,
        stats.attributes_imputed
    );

    for entry in &result.ranking {
        println!("{:>3}. {:<20} {:>3}", entry.rank, entry.company_id, entry.score);
        if let Some(company) = result.scored_company(&entry.company_id) {
            for contribution in company.explanation.top(explain) {
                println!("       {:+.3}  {}", contribution.value, contribution.feature);
            }
        }
    }

    for failure in &result.failures {
        println!("❌ {}: {:?}", failure.company_id, failure.reason);
    }
}

fn run_label(
    events: &Path,
    profiles: Option<&Path>,
    reference_date: NaiveDate,
    config: Option<&Path>,
    output: &Path,
) -> Result<()> {
    let config = load_config(config)?;
    let (records, profiles) = load_inputs(events, profiles)?;

    let set = build_training_set(&config, reference_date, &records, profiles);
    let writer = BufWriter::new(
        File::create(output).with_context(|| format!("creating {}", output.display()))?,
    );
    let rows = set.write_jsonl(writer)?;

    println!(
        "✅ {} rows ({} good, {} skipped) written to {}",
        rows,
        set.positives(),
        set.skipped.len(),
        output.display()
    );
    Ok(())
}

fn show_taxonomy(config: Option<&Path>, tags: &[String]) -> Result<()> {
    let config = load_config(config)?;
    let taxonomy = &config.taxonomy;

    if tags.is_empty() {
        println!(
            "Taxonomy {} (fingerprint {})\n",
            taxonomy.version(),
            taxonomy.fingerprint()
        );
        for polarity in [Polarity::Positive, Polarity::Negative] {
            println!("{:?}:", polarity);
            for category in taxonomy.by_polarity(polarity) {
                println!("  {:<24} {}", category.id, category.aliases.join(", "));
            }
        }
        return Ok(());
    }

    for tag in tags {
        match taxonomy.resolve(tag) {
            Some(category) => println!("{} -> {} ({:?})", tag, category.id, category.polarity),
            None => println!("{} -> unrecognized", tag),
        }
    }
    Ok(())
}

fn check(config: Option<&Path>, model: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let model = load_model(model)?;

    check_compatibility(&model, &config)?;

    let schema = FeatureSchema::derive(&config);
    println!(
        "✅ Configuration {} and model {} are compatible",
        config.version,
        model.model_version()
    );
    println!(
        "   Taxonomy: {} ({})",
        config.taxonomy.version(),
        config.taxonomy.fingerprint()
    );
    println!("   Windows: {:?} months, top {}", config.windows_months, config.top_n);
    println!("   Features: {}", schema.len());
    Ok(())
}
