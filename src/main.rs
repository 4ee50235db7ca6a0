use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use cohort_retention::dataset::{DateRange, Table};
use cohort_retention::models::{CohortAnalysis, Mode};
use cohort_retention::roles::{self, KeywordHeuristic, RequestedRoles, RoleHeuristic};
use cohort_retention::{cohort, report, synthetic, telemetry};

#[derive(Parser)]
#[command(name = "cohort-retention")]
#[command(about = "Monthly cohort retention tables from time-stamped event data", long_about = None)]
struct Cli {
    /// Directory holding the cached synthetic dataset
    #[arg(long, global = true, env = "COHORT_DATASET_DIR", default_value = "datasets")]
    dataset_dir: PathBuf,
    /// Emit logs as JSON
    #[arg(long, global = true, env = "LOG_JSON", value_parser = clap::builder::FalseyValueParser::new())]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Profile dataset columns and suggest roles
    Columns {
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Print the cohort table
    Analyze {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Write a markdown report
    Report {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write the synthetic sample dataset
    Generate {
        #[arg(long, default_value = "synthetic_data.csv")]
        out: PathBuf,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Comma-delimited CSV; the synthetic dataset is used when omitted
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Subject identifier column
    #[arg(long)]
    user_col: Option<String>,
    /// Event date column
    #[arg(long)]
    date_col: Option<String>,
    /// Categorical column to slice cohorts by
    #[arg(long)]
    segment: Option<String>,
    /// First event date to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last event date to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long, value_enum, default_value_t = Mode::Percentage)]
    mode: Mode,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn load_table(csv: Option<&Path>, dataset_dir: &Path) -> anyhow::Result<Table> {
    match csv {
        Some(path) => {
            Table::from_path(path).with_context(|| format!("failed to load {}", path.display()))
        }
        None => synthetic::load_or_generate(dataset_dir),
    }
}

fn run_analysis(
    input: &InputArgs,
    dataset_dir: &Path,
) -> anyhow::Result<(CohortAnalysis, Option<DateRange>)> {
    let table = load_table(input.csv.as_deref(), dataset_dir)?;
    let requested = RequestedRoles {
        subject: input.user_col.clone(),
        date: input.date_col.clone(),
        segment: input.segment.clone(),
    };
    let bindings = roles::resolve_roles(&table, &requested, &KeywordHeuristic::default())
        .context("cannot analyze this dataset")?;

    let range = table.date_bounds(&bindings.date)?.map(|bounds| DateRange {
        start: input.from.unwrap_or(bounds.start),
        end: input.to.unwrap_or(bounds.end),
    });

    let events = table.events(&bindings, range)?;
    let analysis = cohort::analyze(&events, bindings.segment.is_some());
    Ok((analysis, range))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.json_logs);

    match cli.command {
        Commands::Columns { csv } => {
            let table = load_table(csv.as_deref(), &cli.dataset_dir)?;
            let profiles = roles::profile(&table);
            let heuristic = KeywordHeuristic::default();

            for column in &profiles {
                println!(
                    "- {}: {} distinct, {} missing, {:.0}% dates",
                    column.name,
                    column.distinct,
                    column.missing,
                    column.date_ratio * 100.0
                );
            }

            let identifiers = roles::identifier_candidates(&profiles);
            let subject = heuristic.suggest_subject(&identifiers);
            let exclude: Vec<&str> = subject.into_iter().collect();
            let dates = roles::date_candidates(&profiles, &exclude, roles::DATE_RATIO_THRESHOLD);
            let date = heuristic.suggest_date(&dates);
            let mut taken = exclude.clone();
            taken.extend(date);
            let segments = roles::segment_candidates(&profiles, &taken);

            println!();
            println!("Identifier columns: {}", identifiers.join(", "));
            println!("Date columns: {}", dates.join(", "));
            println!("Segment columns: {}", segments.join(", "));
            println!(
                "Suggested: --user-col {} --date-col {}",
                subject.unwrap_or("?"),
                date.unwrap_or("?")
            );
        }
        Commands::Analyze { input, format } => {
            let (analysis, _) = run_analysis(&input, &cli.dataset_dir)?;
            match format {
                OutputFormat::Json => println!("{}", report::to_json(&analysis)?),
                OutputFormat::Table => {
                    if analysis.absolute.is_empty() {
                        println!("No data available for analysis.");
                        return Ok(());
                    }
                    println!("Total subjects: {}", analysis.total_subjects);
                    println!(
                        "Average retention: {}",
                        report::format_average(analysis.average_retention)
                    );
                    println!();
                    print!("{}", report::render_matrix(analysis.matrix(input.mode)));
                }
            }
        }
        Commands::Report { input, out } => {
            let (analysis, range) = run_analysis(&input, &cli.dataset_dir)?;
            let report = report::build_report(&analysis, input.mode, range);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Generate { out } => {
            let rows = synthetic::generate()?;
            synthetic::write_csv(&rows, &out)?;
            println!("Wrote {} synthetic events to {}.", rows.len(), out.display());
        }
    }

    Ok(())
}
