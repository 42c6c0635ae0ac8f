//! ampr - amplicon diversity and composition reports
//!
//! Command-line interface over the `amplicon_report` analyses.

use amplicon_report::correlation::{CorrelationConfig, CorrelationMode, TaxaSelection};
use amplicon_report::data::taxonomy::{Rank, SequenceKind};
use amplicon_report::data::{FeatureTable, Metadata};
use amplicon_report::diversity::{AlphaMetric, BetaMetric};
use amplicon_report::error::{ReportError, Result};
use amplicon_report::group::Aggregation;
use amplicon_report::pipeline::{
    example_config, load_table, run_config, AlphaAnalysis, AnalysisConfig, BetaAnalysis,
    CorrelationAnalysis, TaxaBarAnalysis, UnknownAnalysis,
};
use amplicon_report::profile::profile_table;
use amplicon_report::report::output_dir;
use amplicon_report::topn::{read_taxa_list, TopTaxaOptions};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Exclusion pattern used by `--filter`.
const VIRUS_PATTERN: &str = "k__Virus";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliAlphaMetric {
    Shannon,
    Simpson,
    ObservedFeatures,
    PielouEvenness,
    Chao1,
}

impl From<CliAlphaMetric> for AlphaMetric {
    fn from(metric: CliAlphaMetric) -> Self {
        match metric {
            CliAlphaMetric::Shannon => AlphaMetric::Shannon,
            CliAlphaMetric::Simpson => AlphaMetric::Simpson,
            CliAlphaMetric::ObservedFeatures => AlphaMetric::ObservedFeatures,
            CliAlphaMetric::PielouEvenness => AlphaMetric::PielouEvenness,
            CliAlphaMetric::Chao1 => AlphaMetric::Chao1,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliBetaMetric {
    Braycurtis,
    Jaccard,
}

impl From<CliBetaMetric> for BetaMetric {
    fn from(metric: CliBetaMetric) -> Self {
        match metric {
            CliBetaMetric::Braycurtis => BetaMetric::BrayCurtis,
            CliBetaMetric::Jaccard => BetaMetric::Jaccard,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliAggregation {
    Sum,
    Mean,
}

impl From<CliAggregation> for Aggregation {
    fn from(aggregation: CliAggregation) -> Self {
        match aggregation {
            CliAggregation::Sum => Aggregation::Sum,
            CliAggregation::Mean => Aggregation::Mean,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliKind {
    Bacterial,
    Fungal,
    Generic,
}

impl From<CliKind> for SequenceKind {
    fn from(kind: CliKind) -> Self {
        match kind {
            CliKind::Bacterial => SequenceKind::Bacterial,
            CliKind::Fungal => SequenceKind::Fungal,
            CliKind::Generic => SequenceKind::Generic,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    /// Mean of replicates per treatment
    Mean,
    /// Sum per treatment divided by the taxon total
    Relative,
}

impl From<CliMode> for CorrelationMode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Mean => CorrelationMode::Mean,
            CliMode::Relative => CorrelationMode::Relative,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliFormat {
    Text,
    Json,
    Yaml,
}

/// Amplicon feature-table reports
#[derive(Parser)]
#[command(name = "ampr")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Feature tables have samples as rows
    #[arg(long, global = true)]
    samples_as_rows: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Alpha diversity per treatment with Kruskal-Wallis tests
    Alpha {
        /// Feature table TSV
        #[arg(short = 'i', long)]
        input_file: PathBuf,

        /// Sample metadata map file
        #[arg(short, long)]
        map_file: PathBuf,

        /// Metadata column holding the treatments
        #[arg(short, long)]
        column: String,

        /// Treatments to include, in plot order
        #[arg(short = 'l', long, num_args = 1.., value_delimiter = ',')]
        listing: Vec<String>,

        /// Plot title
        #[arg(short, long)]
        plot_title: Option<String>,

        #[arg(long, value_enum, default_value = "shannon")]
        metric: CliAlphaMetric,

        /// Output directory
        #[arg(short = 'd', long)]
        output_dir: PathBuf,
    },

    /// Bray-Curtis or Jaccard distances, PCoA and PERMANOVA
    Beta {
        #[arg(short = 'i', long)]
        input_file: PathBuf,

        #[arg(short, long)]
        map_file: PathBuf,

        #[arg(short, long)]
        column: String,

        #[arg(short = 'l', long, num_args = 1.., value_delimiter = ',')]
        listing: Vec<String>,

        #[arg(short, long)]
        plot_title: Option<String>,

        #[arg(long, value_enum, default_value = "braycurtis")]
        metric: CliBetaMetric,

        /// PERMANOVA permutations
        #[arg(long, default_value = "999")]
        permutations: usize,

        /// Random seed for permutations
        #[arg(long, default_value = "42")]
        seed: u64,

        #[arg(short = 'd', long)]
        output_dir: PathBuf,
    },

    /// Stacked bar chart of the top N taxa per treatment
    TaxaBar {
        #[arg(short = 'i', long)]
        input_file: PathBuf,

        #[arg(short, long)]
        map_file: PathBuf,

        #[arg(short, long)]
        column: String,

        /// Number of top taxa
        #[arg(short = 'n', long)]
        top_n_taxa: usize,

        #[arg(short = 'l', long, num_args = 1.., value_delimiter = ',')]
        listing: Vec<String>,

        #[arg(short, long)]
        plot_title: Option<String>,

        #[arg(long, value_enum, default_value = "sum")]
        aggregation: CliAggregation,

        /// Lineage substring never selected
        #[arg(long, conflicts_with = "filter")]
        exclude: Option<String>,

        /// Exclude viruses
        #[arg(short, long)]
        filter: bool,

        /// Sequence data type, used to label unresolved taxa
        #[arg(short = 't', long, value_enum, default_value = "generic")]
        kind: CliKind,

        #[arg(short = 'd', long)]
        output_dir: PathBuf,
    },

    /// Spearman correlation of taxa with metadata columns across treatments
    Correlate {
        #[arg(short = 'i', long)]
        input_file: PathBuf,

        #[arg(short, long)]
        map_file: PathBuf,

        /// Treatments to correlate across
        #[arg(short = 's', long, num_args = 1.., value_delimiter = ',', required = true)]
        treatments: Vec<String>,

        /// Metadata column holding the treatments
        #[arg(long = "c0")]
        group_column: String,

        /// Numeric metadata columns to correlate with
        #[arg(long = "c1", num_args = 1.., value_delimiter = ',', required = true)]
        columns: Vec<String>,

        /// Top-N stats CSV whose header lists the taxa
        #[arg(short = 't', long, conflicts_with = "top_n")]
        taxa_file: Option<PathBuf>,

        /// Correlate the top N taxa instead of every feature
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        #[arg(long, value_enum, default_value = "mean")]
        mode: CliMode,

        #[arg(short, long)]
        plot_title: Option<String>,

        #[arg(short = 'd', long)]
        output_dir: PathBuf,
    },

    /// Most abundant features with no name at a rank
    Unknown {
        #[arg(short = 'i', long)]
        input_file: PathBuf,

        #[arg(short = 'n', long)]
        top_n_taxa: usize,

        /// Rank the features must be unresolved at
        #[arg(long, default_value = "genus")]
        rank: String,

        #[arg(short = 'd', long)]
        output_dir: PathBuf,
    },

    /// Profile a feature table
    Profile {
        #[arg(short = 'i', long)]
        input_file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: CliFormat,
    },

    /// Run the analyses of a YAML configuration file
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print or write an example configuration
    Example {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logger(verbose: bool) {
    let default = if verbose {
        "amplicon_report=debug,ampr=debug"
    } else {
        "amplicon_report=info,ampr=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    let rows = cli.samples_as_rows;

    let result = match cli.command {
        Commands::Alpha {
            input_file,
            map_file,
            column,
            listing,
            plot_title,
            metric,
            output_dir,
        } => cmd_alpha(
            &input_file,
            &map_file,
            rows,
            AlphaAnalysis {
                column,
                treatments: listing,
                metric: metric.into(),
                title: plot_title,
            },
            &output_dir,
        ),

        Commands::Beta {
            input_file,
            map_file,
            column,
            listing,
            plot_title,
            metric,
            permutations,
            seed,
            output_dir,
        } => cmd_beta(
            &input_file,
            &map_file,
            rows,
            BetaAnalysis {
                column,
                treatments: listing,
                metric: metric.into(),
                permutations,
                seed,
                title: plot_title,
            },
            &output_dir,
        ),

        Commands::TaxaBar {
            input_file,
            map_file,
            column,
            top_n_taxa,
            listing,
            plot_title,
            aggregation,
            exclude,
            filter,
            kind,
            output_dir,
        } => {
            let exclude = if filter {
                Some(VIRUS_PATTERN.to_string())
            } else {
                exclude
            };
            cmd_taxa_bar(
                &input_file,
                &map_file,
                rows,
                TaxaBarAnalysis {
                    column,
                    treatments: listing,
                    n: top_n_taxa,
                    options: TopTaxaOptions {
                        aggregation: aggregation.into(),
                        exclude,
                        kind: kind.into(),
                    },
                    title: plot_title,
                },
                &output_dir,
            )
        }

        Commands::Correlate {
            input_file,
            map_file,
            treatments,
            group_column,
            columns,
            taxa_file,
            top_n,
            mode,
            plot_title,
            output_dir,
        } => cmd_correlate(
            &input_file,
            &map_file,
            rows,
            CorrelateArgs {
                treatments,
                group_column,
                columns,
                taxa_file,
                top_n,
                mode: mode.into(),
                plot_title,
            },
            &output_dir,
        ),

        Commands::Unknown {
            input_file,
            top_n_taxa,
            rank,
            output_dir,
        } => cmd_unknown(&input_file, rows, top_n_taxa, &rank, &output_dir),

        Commands::Profile { input_file, format } => cmd_profile(&input_file, rows, format),

        Commands::Run { config } => cmd_run(&config),

        Commands::Example { output } => cmd_example(output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_inputs(
    table: &Path,
    map: &Path,
    samples_as_rows: bool,
) -> Result<(FeatureTable, Metadata)> {
    let table = load_table(table, samples_as_rows)?;
    let metadata = Metadata::from_tsv(map)?;
    tracing::info!(
        "Loaded {} features x {} samples, {} metadata rows",
        table.n_features(),
        table.n_samples(),
        metadata.n_samples()
    );
    Ok((table, metadata))
}

fn print_outputs(outputs: &[PathBuf]) {
    for path in outputs {
        println!("  {}", path.display());
    }
}

fn cmd_alpha(
    input: &Path,
    map: &Path,
    rows: bool,
    analysis: AlphaAnalysis,
    out: &Path,
) -> Result<()> {
    let (table, metadata) = load_inputs(input, map, rows)?;
    let dir = output_dir(out, "alpha-output")?;
    let summary = analysis.run(&table, &metadata, &dir)?;

    println!("Alpha diversity ({}) for {} samples", summary.metric, summary.n_samples);
    for group in &summary.groups {
        println!("  {:<20} n={:<4} median={:.4}", group.name, group.n, group.median);
    }
    if let Some(overall) = &summary.significance.overall {
        println!("Kruskal-Wallis H={:.4}, p={:.4}", overall.statistic, overall.p_value);
    }
    print_outputs(&summary.outputs);
    Ok(())
}

fn cmd_beta(
    input: &Path,
    map: &Path,
    rows: bool,
    analysis: BetaAnalysis,
    out: &Path,
) -> Result<()> {
    let (table, metadata) = load_inputs(input, map, rows)?;
    let dir = output_dir(out, "beta-output")?;
    let summary = analysis.run(&table, &metadata, &dir)?;

    println!("Beta diversity ({}) for {} samples", summary.metric, summary.n_samples);
    match &summary.permanova {
        Some(r) => println!(
            "PERMANOVA pseudo-F={:.4}, p={:.4} ({} permutations)",
            r.statistic, r.p_value, r.permutations
        ),
        None => println!(
            "PERMANOVA not computed: {}",
            summary.permanova_note.as_deref().unwrap_or("unknown reason")
        ),
    }
    print_outputs(&summary.outputs);
    Ok(())
}

fn cmd_taxa_bar(
    input: &Path,
    map: &Path,
    rows: bool,
    analysis: TaxaBarAnalysis,
    out: &Path,
) -> Result<()> {
    let (table, metadata) = load_inputs(input, map, rows)?;
    let dir = output_dir(out, "taxonomic-output")?;
    let summary = analysis.run(&table, &metadata, &dir)?;

    println!(
        "Top {} taxa across {} treatments",
        summary.taxa.len(),
        summary.treatments.len()
    );
    for taxon in &summary.taxa {
        println!("  {}", taxon);
    }
    print_outputs(&summary.outputs);
    Ok(())
}

struct CorrelateArgs {
    treatments: Vec<String>,
    group_column: String,
    columns: Vec<String>,
    taxa_file: Option<PathBuf>,
    top_n: Option<usize>,
    mode: CorrelationMode,
    plot_title: Option<String>,
}

fn cmd_correlate(
    input: &Path,
    map: &Path,
    rows: bool,
    args: CorrelateArgs,
    out: &Path,
) -> Result<()> {
    let taxa = match (&args.taxa_file, args.top_n) {
        (Some(path), _) => TaxaSelection::List {
            taxa: read_taxa_list(path)?,
        },
        (None, Some(n)) => TaxaSelection::TopN { n },
        (None, None) => TaxaSelection::All,
    };
    let (table, metadata) = load_inputs(input, map, rows)?;
    let dir = output_dir(out, "correlation-output")?;
    let analysis = CorrelationAnalysis {
        config: CorrelationConfig {
            group_column: args.group_column,
            treatments: args.treatments,
            columns: args.columns,
            taxa,
            mode: args.mode,
            exclude: None,
            kind: SequenceKind::Generic,
        },
        title: args.plot_title,
    };
    let summary = analysis.run(&table, &metadata, &dir)?;

    let result = &summary.result;
    println!(
        "Spearman correlation of {} taxa with {} columns across {} treatments",
        result.taxa.len(),
        result.columns.len(),
        result.treatments.len()
    );
    print_outputs(&summary.outputs);
    Ok(())
}

fn cmd_unknown(input: &Path, rows: bool, n: usize, rank: &str, out: &Path) -> Result<()> {
    let rank = Rank::parse(rank)
        .ok_or_else(|| ReportError::InvalidParameter(format!("Unknown rank '{}'", rank)))?;
    let table = load_table(input, rows)?;
    let dir = output_dir(out, "unknown-asvs-output")?;
    let summary = UnknownAnalysis { n, rank }.run(&table, &dir)?;

    println!(
        "{} features unresolved at {}",
        summary.features.len(),
        summary.rank.name()
    );
    for feature in &summary.features {
        println!(
            "  {:<40} {:>12} {:>8.3}%",
            feature.feature_id, feature.total, feature.relative_percent
        );
    }
    print_outputs(&summary.outputs);
    Ok(())
}

fn cmd_profile(input: &Path, rows: bool, format: CliFormat) -> Result<()> {
    let table = load_table(input, rows)?;
    let profile = profile_table(&table);

    match format {
        CliFormat::Json => println!("{}", serde_json::to_string_pretty(&profile)?),
        CliFormat::Yaml => print!("{}", serde_yaml::to_string(&profile)?),
        CliFormat::Text => print!("{}", profile),
    }
    Ok(())
}

fn cmd_run(config_path: &Path) -> Result<()> {
    let config = AnalysisConfig::from_file(config_path)?;
    let summary = run_config(&config)?;

    println!("Finished '{}': {} analyses", summary.name, summary.outcomes.len());
    for outcome in &summary.outcomes {
        print_outputs(outcome.outputs());
    }
    Ok(())
}

fn cmd_example(output: Option<&Path>) -> Result<()> {
    let yaml = example_config().to_yaml()?;
    match output {
        Some(path) => {
            std::fs::write(path, yaml)?;
            println!("Wrote example configuration to {}", path.display());
        }
        None => print!("{}", yaml),
    }
    Ok(())
}
