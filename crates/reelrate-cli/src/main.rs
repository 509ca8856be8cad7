use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use reelrate_adapters::{
    extractor_for, extractor_names, BudgetParserConfig, WgaScheduleExtractor,
};
use reelrate_pipeline::{
    clean_rate_file, extract_budgets_dir, extract_rates_dir, extract_text_dir, extract_wga,
    import_rate_table, import_reference_docs, load_budget_templates, load_sideletters,
    load_tax_incentives, read_sideletters, tax_incentives_from_file, upload_cleaned_rates,
    upload_wga_rates, CleaningRules, DatabaseConfig, PipelineConfig, RateTable, UploadMode,
    UploadSummary, PRODUCTION_BUDGET_KEYWORDS,
};
use reelrate_storage::{CatalogStore, MemoryCatalog, PgCatalog, TextArtifactStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "reelrate")]
#[command(about = "Union rate and budget template import jobs")]
struct Cli {
    /// Run database jobs against an in-memory catalog instead of DATABASE_URL.
    #[arg(long, global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract text from contract PDFs, one subdirectory per union.
    ExtractText {
        #[arg(long, env = "REELRATE_CONTRACTS_DIR")]
        contracts_dir: Option<PathBuf>,
        #[arg(long, env = "REELRATE_TEXT_DIR")]
        text_dir: Option<PathBuf>,
    },
    /// Parse rate lines out of extracted contract text.
    ExtractRates {
        #[arg(long, env = "REELRATE_TEXT_DIR")]
        text_dir: Option<PathBuf>,
        #[arg(long, env = "REELRATE_RATES_DIR")]
        out_dir: Option<PathBuf>,
        /// Extractor profile: v1, v2 or wga.
        #[arg(long, env = "REELRATE_EXTRACTOR")]
        extractor: Option<String>,
    },
    /// Parse the WGA schedule of minimums.
    ExtractWga {
        text: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Date used when a schedule has no effective date of its own.
        #[arg(long)]
        effective_date: Option<NaiveDate>,
        /// Also upload the parsed rates.
        #[arg(long)]
        upload: bool,
    },
    /// Filter, normalise and deduplicate extracted rates.
    Clean {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, env = "REELRATE_CLEANING_RULES")]
        rules: Option<PathBuf>,
    },
    /// Upload cleaned rates, or a WGA rate file with --wga.
    UploadRates {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, conflicts_with = "upsert")]
        wga: bool,
        /// Overwrite existing rates instead of skipping them.
        #[arg(long)]
        upsert: bool,
        #[arg(long)]
        effective_date: Option<NaiveDate>,
    },
    /// Import curated rate tables with their agreement.
    ImportRateTable {
        #[arg(required = true)]
        tables: Vec<PathBuf>,
    },
    LoadSideletters {
        path: PathBuf,
    },
    LoadTaxIncentives {
        path: PathBuf,
    },
    /// Parse budget PDFs into template JSON plus an extraction summary CSV.
    ExtractBudgets {
        #[command(flatten)]
        dirs: BudgetDirs,
        /// Process every PDF instead of only production budgets.
        #[arg(long)]
        all: bool,
        #[arg(long, default_value_t = BudgetParserConfig::default().first_detail_page)]
        first_detail_page: usize,
    },
    LoadTemplates {
        #[arg(long, env = "REELRATE_TEMPLATES_DIR")]
        dir: Option<PathBuf>,
    },
    /// Replace the reference manual with its chunk PDFs.
    ImportReferenceDocs {
        chunks_dir: PathBuf,
        /// Companion analysis markdown.
        #[arg(long)]
        analysis: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct BudgetDirs {
    #[arg(long, env = "REELRATE_BUDGETS_DIR")]
    budgets_dir: Option<PathBuf>,
    #[arg(long, env = "REELRATE_TEMPLATES_DIR")]
    out_dir: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already set");
    }
}

/// The catalog for database jobs. Without `--dry-run`, DATABASE_URL must be set.
async fn open_catalog(dry_run: bool) -> Result<Box<dyn CatalogStore>> {
    if dry_run {
        info!("dry run: writes go to an in-memory catalog");
        return Ok(Box::new(MemoryCatalog::new()));
    }
    let db = DatabaseConfig::from_env()?;
    info!(database = %db.redacted_url(), "connecting");
    let catalog = PgCatalog::connect(&db.database_url, db.max_connections)
        .await
        .context("connecting to database")?;
    Ok(Box::new(catalog))
}

fn print_upload(label: &str, summary: &UploadSummary) {
    println!(
        "{label}: inserted={} updated={} skipped={} total={}",
        summary.inserted,
        summary.updated,
        summary.skipped,
        summary.total()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = PipelineConfig::from_env();
    let default_date = CleaningRules::default().default_effective_date;

    match cli.command {
        Commands::ExtractText {
            contracts_dir,
            text_dir,
        } => {
            let contracts_dir = contracts_dir.unwrap_or(config.contracts_dir);
            let store = TextArtifactStore::new(text_dir.unwrap_or(config.text_dir));
            let summary = extract_text_dir(&contracts_dir, &store).await?;
            println!(
                "text extraction complete: extracted={} already_present={} failed={}",
                summary.extracted, summary.already_present, summary.failed
            );
        }
        Commands::ExtractRates {
            text_dir,
            out_dir,
            extractor,
        } => {
            let name = extractor.unwrap_or(config.extractor.clone());
            let extractor = extractor_for(&name).ok_or_else(|| {
                let known = extractor_names().join(", ");
                anyhow!("unknown extractor {name}; expected one of {known}")
            })?;
            let summary = extract_rates_dir(
                &text_dir.unwrap_or(config.text_dir),
                &out_dir.unwrap_or(config.rates_dir),
                extractor.as_ref(),
            )?;
            println!(
                "rate extraction complete: files={} found={} unique={}",
                summary.files, summary.rates_found, summary.unique_rates
            );
            for (union_local, count) in &summary.per_union {
                println!("  {union_local}: {count}");
            }
        }
        Commands::ExtractWga {
            text,
            output,
            effective_date,
            upload,
        } => {
            let output = output.unwrap_or_else(|| config.wga_rates_path());
            let batch = extract_wga(&text, &output, &WgaScheduleExtractor::default())?;
            println!(
                "wga extraction complete: rates={} output={}",
                batch.total_rates,
                output.display()
            );
            if upload {
                let catalog = open_catalog(cli.dry_run).await?;
                let date = effective_date.unwrap_or(default_date);
                let summary = upload_wga_rates(catalog.as_ref(), &output, date).await?;
                print_upload("wga upload complete", &summary);
            }
        }
        Commands::Clean { input, output, rules } => {
            let rules = CleaningRules::load(rules.unwrap_or(config.cleaning_rules.clone()))?;
            let input = input.unwrap_or_else(|| config.all_rates_path());
            let output = output.unwrap_or_else(|| config.cleaned_rates_path());
            let summary = clean_rate_file(&input, &output, &rules)?;
            println!(
                "cleaning complete: raw={} clean={} output={}",
                summary.raw_rates,
                summary.clean_rates,
                output.display()
            );
        }
        Commands::UploadRates {
            input,
            wga,
            upsert,
            effective_date,
        } => {
            let catalog = open_catalog(cli.dry_run).await?;
            let summary = if wga {
                let input = input.unwrap_or_else(|| config.wga_rates_path());
                let date = effective_date.unwrap_or(default_date);
                upload_wga_rates(catalog.as_ref(), &input, date).await?
            } else {
                let input = input.unwrap_or_else(|| config.cleaned_rates_path());
                let mode = if upsert { UploadMode::Upsert } else { UploadMode::SkipExisting };
                upload_cleaned_rates(catalog.as_ref(), &input, mode).await?
            };
            print_upload("upload complete", &summary);
            let total = catalog.count_rate_cards(None).await.context("counting rate cards")?;
            println!("rate cards in catalog: {total}");
        }
        Commands::ImportRateTable { tables } => {
            let catalog = open_catalog(cli.dry_run).await?;
            for path in tables {
                let table = RateTable::load(&path)?;
                let import = import_rate_table(catalog.as_ref(), &table).await?;
                println!(
                    "{}: agreement={} created={} rates={}",
                    table.agreement.name,
                    import.agreement_id,
                    import.agreement_created,
                    import.upload.total()
                );
                print_upload("  rate upsert", &import.upload);
            }
        }
        Commands::LoadSideletters { path } => {
            let rules = read_sideletters(&path)?;
            let catalog = open_catalog(cli.dry_run).await?;
            let summary = load_sideletters(catalog.as_ref(), &rules).await?;
            println!(
                "sideletters loaded: inserted={} skipped={} failed={}",
                summary.inserted, summary.skipped, summary.failed
            );
        }
        Commands::LoadTaxIncentives { path } => {
            let (incentives, no_program) = tax_incentives_from_file(&path)?;
            let catalog = open_catalog(cli.dry_run).await?;
            let summary = load_tax_incentives(catalog.as_ref(), &incentives).await?;
            println!(
                "tax incentives loaded: inserted={} existing={} no_program={} failed={}",
                summary.inserted, summary.skipped, no_program, summary.failed
            );
        }
        Commands::ExtractBudgets {
            dirs,
            all,
            first_detail_page,
        } => {
            let parser = BudgetParserConfig {
                first_detail_page,
                ..BudgetParserConfig::default()
            };
            let keywords: &[&str] = if all { &[] } else { PRODUCTION_BUDGET_KEYWORDS };
            let summary = extract_budgets_dir(
                &dirs.budgets_dir.unwrap_or(config.budgets_dir),
                &dirs.out_dir.unwrap_or(config.templates_dir),
                parser,
                keywords,
            )
            .await?;
            println!(
                "budget extraction complete: processed={} saved={} no_data={} failed={}",
                summary.processed, summary.saved, summary.no_data, summary.failed
            );
        }
        Commands::LoadTemplates { dir } => {
            let catalog = open_catalog(cli.dry_run).await?;
            let dir = dir.unwrap_or(config.templates_dir);
            let summary = load_budget_templates(catalog.as_ref(), &dir).await?;
            println!(
                "templates loaded: inserted={} skipped={} failed={}",
                summary.inserted, summary.skipped, summary.failed
            );
        }
        Commands::ImportReferenceDocs { chunks_dir, analysis } => {
            let catalog = open_catalog(cli.dry_run).await?;
            let summary =
                import_reference_docs(catalog.as_ref(), &chunks_dir, analysis.as_deref()).await?;
            println!(
                "reference import complete: replaced={} chunks={} failed={} pages={} \
                 characters={} analysis={}",
                summary.deleted,
                summary.chunks,
                summary.failed,
                summary.pages,
                summary.characters,
                summary.analysis_imported
            );
        }
    }

    Ok(())
}
