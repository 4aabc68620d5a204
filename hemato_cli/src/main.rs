use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use hemato_core::aggregate::AggregationMode;
use hemato_core::filter::{FilteredResult, SubjectSeries};
use hemato_core::table_csv;
use hemato_core::validity::Flag;
use hemato_core::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "hemato")]
#[command(about = "Blood panel cohort filtering and aggregation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Canonical table file (defaults to <data_dir>/table.csv)
    #[arg(long, global = true)]
    table: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List subjects with their blood sources
    Subjects,

    /// List the sample dates of one subject on one blood source
    Dates {
        #[arg(long)]
        subject: String,

        #[arg(long)]
        source: String,

        /// Exclude a sample date, as SUBJECT@YYYY-MM-DD (repeatable)
        #[arg(long, value_parser = parse_exclusion)]
        exclude: Vec<(String, NaiveDate)>,
    },

    /// Show per-subject series of a feature family
    Filter {
        /// Subject ids, comma separated
        #[arg(long, value_delimiter = ',')]
        subjects: Vec<String>,

        #[arg(long)]
        source: String,

        /// PLT FAMILY, RBC FAMILY or WBC FAMILY (or plt, rbc, wbc)
        #[arg(long)]
        family: String,

        /// Exclude a sample date, as SUBJECT@YYYY-MM-DD (repeatable)
        #[arg(long, value_parser = parse_exclusion)]
        exclude: Vec<(String, NaiveDate)>,
    },

    /// Group statistics by imported metadata
    Aggregate {
        /// Metadata CSV with one row per subject
        #[arg(long)]
        metadata: PathBuf,

        /// Subject ids, comma separated (default: every subject with metadata)
        #[arg(long, value_delimiter = ',')]
        subjects: Vec<String>,

        #[arg(long)]
        source: String,

        #[arg(long)]
        family: String,

        /// Metadata column to group by (repeatable, order matters)
        #[arg(long = "group")]
        groups: Vec<String>,

        #[arg(long, value_enum, default_value_t = ModeArg::Global)]
        mode: ModeArg,

        /// Exclude a sample date, as SUBJECT@YYYY-MM-DD (repeatable)
        #[arg(long, value_parser = parse_exclusion)]
        exclude: Vec<(String, NaiveDate)>,
    },

    /// Append the records of another canonical table to the table
    Merge {
        #[arg(long)]
        input: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Global,
    Timeseries,
}

impl From<ModeArg> for AggregationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Global => AggregationMode::Global,
            ModeArg::Timeseries => AggregationMode::Timeseries,
        }
    }
}

fn parse_exclusion(s: &str) -> std::result::Result<(String, NaiveDate), String> {
    let (subject, date) = s
        .rsplit_once('@')
        .ok_or_else(|| format!("expected SUBJECT@YYYY-MM-DD, got '{}'", s))?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{}': {}", date, e))?;
    Ok((subject.to_string(), date))
}

fn main() -> ExitCode {
    // Initialize logging
    hemato_core::logging::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.is_user_input() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let table_path = match (cli.table, cli.data_dir) {
        (Some(table), _) => table,
        (None, Some(dir)) => dir.join(&config.data.table_file),
        (None, None) => config.data.table_path(),
    };
    tracing::debug!("Using table {}", table_path.display());

    match cli.command {
        Commands::Subjects => cmd_subjects(&table_path, cli.json),
        Commands::Dates {
            subject,
            source,
            exclude,
        } => cmd_dates(&table_path, &subject, &source, &exclude, cli.json),
        Commands::Filter {
            subjects,
            source,
            family,
            exclude,
        } => {
            let selection = Selection::new(subject_list(subjects), source, family.parse()?);
            cmd_filter(&table_path, &selection, &exclude, &config, cli.json)
        }
        Commands::Aggregate {
            metadata,
            subjects,
            source,
            family,
            groups,
            mode,
            exclude,
        } => {
            let family: FeatureFamily = family.parse()?;
            let request = AggregateRequest {
                metadata_path: &metadata,
                subjects: subject_list(subjects),
                source,
                family,
                groups: &groups,
                mode: mode.into(),
                exclude: &exclude,
            };
            cmd_aggregate(&table_path, request, &config, cli.json)
        }
        Commands::Merge { input } => cmd_merge(&table_path, &input),
    }
}

/// Trim the comma-separated ids and drop empty ones, so "1, 2," means [1, 2]
fn subject_list(raw: Vec<String>) -> Vec<String> {
    raw.into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

fn open_session(table_path: &Path) -> Result<Session> {
    if !table_path.exists() {
        return Err(Error::Other(format!(
            "Table {} not found (use --table or merge records first)",
            table_path.display()
        )));
    }
    Ok(Session::new(table_csv::load_store(table_path)?))
}

fn apply_exclusions(session: &mut Session, exclude: &[(String, NaiveDate)]) {
    for (subject, date) in exclude {
        if !session.exclude(subject, *date) {
            eprintln!(
                "Note: subject {} has no sample on {} (or it is already excluded)",
                subject, date
            );
        }
    }
}

fn cmd_subjects(table_path: &Path, json: bool) -> Result<()> {
    let session = open_session(table_path)?;
    let store = &session.store;
    let sources = store.blood_sources();

    let rows: Vec<(String, Vec<(String, usize)>)> = store
        .subjects()
        .into_iter()
        .map(|subject| {
            let counts: Vec<(String, usize)> = sources
                .iter()
                .map(|source| (source.clone(), store.dates_for(&subject, source).len()))
                .filter(|(_, n)| *n > 0)
                .collect();
            (subject, counts)
        })
        .collect();

    if json {
        let value: Vec<_> = rows
            .iter()
            .map(|(subject, counts)| {
                let counts: serde_json::Map<_, _> = counts
                    .iter()
                    .map(|(source, n)| (source.clone(), serde_json::json!(n)))
                    .collect();
                serde_json::json!({ "subject_id": subject, "dates_per_source": counts })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{} subjects, {} records", rows.len(), store.len());
    for (subject, counts) in rows {
        let sources: Vec<String> = counts
            .iter()
            .map(|(source, n)| format!("{} ({} {})", source, n, plural(*n, "date", "dates")))
            .collect();
        println!("  {}  {}", subject, sources.join(", "));
    }
    Ok(())
}

fn cmd_dates(
    table_path: &Path,
    subject: &str,
    source: &str,
    exclude: &[(String, NaiveDate)],
    json: bool,
) -> Result<()> {
    let mut session = open_session(table_path)?;
    apply_exclusions(&mut session, exclude);

    let included = session.exclusions.included(&session.store, subject, source);
    let excluded: Vec<NaiveDate> = session
        .store
        .dates_for(subject, source)
        .into_iter()
        .filter(|d| !included.contains(d))
        .collect();

    if json {
        let value = serde_json::json!({
            "subject_id": subject,
            "blood_source": source,
            "included": included,
            "excluded": excluded,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if included.is_empty() && excluded.is_empty() {
        println!("Subject {} has no {} samples.", subject, source);
        return Ok(());
    }
    println!("Selected sample dates:");
    for date in &included {
        println!("  {}", date);
    }
    if !excluded.is_empty() {
        println!("Removed sample dates:");
        for date in &excluded {
            println!("  {}", date);
        }
    }
    Ok(())
}

fn cmd_filter(
    table_path: &Path,
    selection: &Selection,
    exclude: &[(String, NaiveDate)],
    config: &Config,
    json: bool,
) -> Result<()> {
    let mut session = open_session(table_path)?;
    apply_exclusions(&mut session, exclude);

    let (result, warnings) = session.filter(selection, config.filter.warning_policy)?;

    if json {
        let value = serde_json::json!({
            "result": result,
            "warnings": warnings,
            "warning_summary": warnings.summary(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    display_filtered(&result);
    if let Some(summary) = warnings.summary() {
        println!();
        println!("Warning: {}", summary);
    }
    Ok(())
}

fn display_filtered(result: &FilteredResult) {
    println!(
        "{} time series on {} ({} {})",
        result.family,
        result.blood_source,
        result.subjects.len(),
        plural(result.subjects.len(), "subject", "subjects")
    );
    if !result.unknown_subjects.is_empty() {
        println!("  Not in table: {}", result.unknown_subjects.join(", "));
    }

    for analyte in &result.series {
        println!();
        println!("{}", analyte.analyte);
        for subject in &analyte.subjects {
            display_subject_series(subject);
        }
    }
}

fn display_subject_series(series: &SubjectSeries) {
    if series.points.is_empty() {
        println!("  {}: no data", series.subject_id);
        return;
    }
    println!("  {}:", series.subject_id);
    for point in &series.points {
        let limits = match (point.flag, point.low_limit, point.high_limit) {
            (Flag::Valid, Some(low), Some(high)) => format!("[{}, {}]", low, high),
            _ => "(missing reference limits)".to_string(),
        };
        println!("    {}  {}  {}", point.day(), point.value, limits);
    }
}

struct AggregateRequest<'a> {
    metadata_path: &'a Path,
    subjects: Vec<String>,
    source: String,
    family: FeatureFamily,
    groups: &'a [String],
    mode: AggregationMode,
    exclude: &'a [(String, NaiveDate)],
}

fn cmd_aggregate(
    table_path: &Path,
    request: AggregateRequest<'_>,
    config: &Config,
    json: bool,
) -> Result<()> {
    let mut session = open_session(table_path)?;
    session.set_metadata(MetadataTable::from_csv_path(
        request.metadata_path,
        &config.metadata.id_column,
    )?);
    apply_exclusions(&mut session, request.exclude);

    let subjects = if request.subjects.is_empty() {
        let ids: Vec<String> = session
            .metadata
            .subject_ids()
            .iter()
            .filter(|id| session.store.contains_subject(id))
            .cloned()
            .collect();
        if ids.is_empty() {
            return Err(Error::InsufficientMetadata);
        }
        ids
    } else {
        request.subjects
    };

    let selection = Selection::new(subjects, request.source, request.family);
    let aggregator = Aggregator::new(config.aggregation.clone());
    let (aggregation, warnings) = session.aggregate(
        &selection,
        request.groups,
        request.mode,
        config.filter.warning_policy,
        &aggregator,
    )?;

    if json {
        let value = serde_json::json!({
            "aggregation": aggregation,
            "warnings": warnings,
            "warning_summary": warnings.summary(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    display_aggregation(&selection, &aggregation);
    if let Some(summary) = warnings.summary() {
        println!();
        println!("Warning: {}", summary);
    }
    Ok(())
}

fn display_aggregation(selection: &Selection, aggregation: &Aggregation) {
    let mode = match aggregation.mode {
        AggregationMode::Global => "global",
        AggregationMode::Timeseries => "time-based",
    };
    println!(
        "{} on {}, {} statistics by {}",
        selection.family,
        selection.blood_source,
        mode,
        aggregation.group_columns.join(" & ")
    );
    if !aggregation.dropped_subjects.is_empty() {
        println!(
            "  Without metadata: {}",
            aggregation.dropped_subjects.join(", ")
        );
    }

    let mut current: Option<(&str, Option<NaiveDate>)> = None;
    for stat in &aggregation.statistics {
        if current.map(|(a, _)| a) != Some(stat.analyte.as_str()) {
            println!();
            println!("{}", stat.analyte);
        }
        let indent = match stat.bucket {
            Some(bucket) => {
                if current != Some((stat.analyte.as_str(), Some(bucket))) {
                    println!("  {}", bucket);
                }
                "    "
            }
            None => "  ",
        };
        current = Some((stat.analyte.as_str(), stat.bucket));

        match &stat.summary {
            Summary::Computed {
                center,
                dispersion,
                count,
            } => println!(
                "{}{}: {:.3} ± {:.3} (n={})",
                indent, stat.group, center, dispersion, count
            ),
            Summary::NoData => println!("{}{}: no data", indent, stat.group),
        }
    }
}

fn cmd_merge(table_path: &Path, input: &Path) -> Result<()> {
    let mut store = if table_path.exists() {
        table_csv::load_store(table_path)?
    } else {
        RecordStore::new()
    };

    let records = table_csv::read_table(input)?;
    let added = store.append(records)?;
    table_csv::save_store(table_path, &store)?;
    tracing::info!("Merged {} into {}", input.display(), table_path.display());

    println!("✓ Merged {} records ({} total)", added, store.len());
    println!("  Table: {}", table_path.display());
    Ok(())
}

fn plural<'a>(n: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if n == 1 {
        singular
    } else {
        plural
    }
}
