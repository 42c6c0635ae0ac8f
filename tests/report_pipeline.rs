//! Integration tests for the report analyses and batch runner.

use amplicon_report::pipeline::{load_table, AnalysisOutcome};
use amplicon_report::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SOILS: [&str; 3] = ["clay", "loam", "sand"];
const REPLICATES: usize = 6;
const N_FEATURES: usize = 20;

fn lineage(feature: usize) -> String {
    match feature {
        18 => "k__Bacteria; p__Proteobacteria; g__".to_string(),
        19 => "k__Viruses; p__Uroviricota".to_string(),
        f => format!("k__Bacteria; p__Phylum{}; g__Genus{}", f % 3, f),
    }
}

/// Features present in each soil: clay is rich, loam medium, sand poor.
fn present(soil: usize, feature: usize) -> bool {
    match soil {
        0 => true,
        1 => (5..15).contains(&feature),
        _ => (15..18).contains(&feature),
    }
}

/// Write a feature table (BIOM TSV export layout) and a matching map file.
fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
    let mut seed = 42u64;
    let mut noise = || {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        0.9 + 0.2 * (((seed >> 16) & 0x7FFF) as f64 / 32768.0)
    };

    let samples: Vec<(usize, String)> = (0..SOILS.len())
        .flat_map(|s| (1..=REPLICATES).map(move |r| (s, format!("{}_{}", SOILS[s], r))))
        .collect();

    let mut table = String::from("# Constructed from biom file\n#OTU ID");
    for (_, sid) in &samples {
        table.push('\t');
        table.push_str(sid);
    }
    table.push_str("\ttaxonomy\n");
    for f in 0..N_FEATURES {
        table.push_str(&format!("asv{}", f));
        for (soil, _) in &samples {
            let count = if present(*soil, f) {
                (100.0 * noise()).round()
            } else {
                0.0
            };
            table.push_str(&format!("\t{}", count));
        }
        table.push_str(&format!("\t{}\n", lineage(f)));
    }

    let mut map = String::from("#SampleID\tsoil\tph\tmoisture\n#q2:types\tcategorical\tnumeric\tnumeric\n");
    for (i, (soil, sid)) in samples.iter().enumerate() {
        let ph = 5.0 + *soil as f64 + 0.1 * (i % REPLICATES) as f64;
        let moisture = 30.0 - 10.0 * *soil as f64 + (i % 2) as f64;
        map.push_str(&format!("{}\t{}\t{}\t{}\n", sid, SOILS[*soil], ph, moisture));
    }

    let table_path = dir.join("feature-table.tsv");
    let map_path = dir.join("sample-metadata.tsv");
    fs::write(&table_path, table).unwrap();
    fs::write(&map_path, map).unwrap();
    (table_path, map_path)
}

#[test]
fn test_alpha_separates_rich_and_poor_soils() {
    let dir = TempDir::new().unwrap();
    let (table_path, map_path) = write_inputs(dir.path());
    let table = FeatureTable::from_tsv(&table_path).unwrap();
    let metadata = Metadata::from_tsv(&map_path).unwrap();

    let summary = AlphaAnalysis {
        column: "soil".to_string(),
        treatments: vec!["sand".to_string(), "loam".to_string(), "clay".to_string()],
        metric: AlphaMetric::Shannon,
        title: Some("Shannon by soil".to_string()),
    }
    .run(&table, &metadata, &dir.path().join("alpha"))
    .unwrap();

    let names: Vec<&str> = summary.groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["sand", "loam", "clay"]);
    assert!(summary.groups[0].max < summary.groups[1].min);
    assert!(summary.groups[1].max < summary.groups[2].min);

    let overall = summary.significance.overall.unwrap();
    assert_eq!(overall.df, 2);
    assert!(overall.p_value < 0.01);
    assert!(summary
        .significance
        .pairwise
        .iter()
        .all(|p| p.q_value.unwrap() < 0.05));
}

#[test]
fn test_beta_permanova_detects_composition_shift() {
    let dir = TempDir::new().unwrap();
    let (table_path, map_path) = write_inputs(dir.path());
    let table = FeatureTable::from_tsv(&table_path).unwrap();
    let metadata = Metadata::from_tsv(&map_path).unwrap();

    let summary = BetaAnalysis {
        column: "soil".to_string(),
        treatments: vec!["clay".to_string(), "sand".to_string()],
        metric: BetaMetric::BrayCurtis,
        permutations: 99,
        seed: 42,
        title: None,
    }
    .run(&table, &metadata, &dir.path().join("beta"))
    .unwrap();

    assert_eq!(summary.n_samples, 12);
    let result = summary.permanova.unwrap();
    assert_eq!(result.n_groups, 2);
    assert!(result.p_value <= 0.05);
    let total: f64 = summary.proportion_explained.iter().sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn test_top_taxa_feed_correlation() {
    let dir = TempDir::new().unwrap();
    let (table_path, map_path) = write_inputs(dir.path());
    let table = FeatureTable::from_tsv(&table_path).unwrap();
    let metadata = Metadata::from_tsv(&map_path).unwrap();
    let out = dir.path().join("taxa");

    let bar = TaxaBarAnalysis {
        column: "soil".to_string(),
        treatments: Vec::new(),
        n: 3,
        options: TopTaxaOptions {
            aggregation: Aggregation::Sum,
            exclude: Some("k__Virus".to_string()),
            kind: SequenceKind::Bacterial,
        },
        title: None,
    }
    .run(&table, &metadata, &out)
    .unwrap();
    assert_eq!(bar.taxa.len(), 3);
    assert_eq!(bar.n_excluded, 1);

    // one pick per soil in the first round
    let taxa = read_taxa_list(out.join("top_n_stats.csv")).unwrap();
    assert_eq!(taxa.len(), 3);
    assert!(taxa.iter().any(|t| t.ends_with("g__Genus15")
        || t.ends_with("g__Genus16")
        || t.ends_with("g__Genus17")));

    let result = correlate(
        &table,
        &metadata,
        &CorrelationConfig {
            group_column: "soil".to_string(),
            treatments: SOILS.iter().map(|s| s.to_string()).collect(),
            columns: vec!["ph".to_string(), "moisture".to_string()],
            taxa: TaxaSelection::List { taxa },
            mode: CorrelationMode::Mean,
            exclude: None,
            kind: SequenceKind::Bacterial,
        },
    )
    .unwrap();
    assert_eq!(result.rho.shape(), (3, 2));
    // ph rises and moisture falls from clay to sand
    for i in 0..3 {
        let (ph, moisture) = (result.rho[(i, 0)], result.rho[(i, 1)]);
        assert!((ph + moisture).abs() < 1e-12);
    }
}

#[test]
fn test_run_config_writes_every_report() {
    let dir = TempDir::new().unwrap();
    let (table_path, map_path) = write_inputs(dir.path());
    let out = dir.path().join("results");
    let yaml = format!(
        r#"
name: soil-survey
table: "{}"
metadata: "{}"
output_dir: "{}"
filters:
  min_library_size: 100
analyses:
  - kind: alpha
    column: soil
    metric: simpson
  - kind: beta
    column: soil
    permutations: 49
  - kind: taxa_bar
    column: soil
    n: 4
    options:
      exclude: k__Virus
      kind: bacterial
  - kind: correlation
    config:
      group_column: soil
      treatments: [clay, loam, sand]
      columns: [ph]
      taxa:
        select: top_n
        n: 2
  - kind: unknown
    n: 5
"#,
        table_path.display(),
        map_path.display(),
        out.display()
    );
    let config = AnalysisConfig::from_yaml(&yaml).unwrap();
    let summary = run_config(&config).unwrap();
    assert_eq!(summary.outcomes.len(), 5);

    for (dir_name, file) in [
        ("alpha-output", "alpha_diversity_stats.html"),
        ("alpha-output", "alpha_plot.svg"),
        ("beta-output", "beta_diversity_stats.md"),
        ("beta-output", "distance_matrix.csv"),
        ("taxonomic-output", "soil.svg"),
        ("taxonomic-output", "soil.csv"),
        ("taxonomic-output", "top_n_stats.csv"),
        ("correlation-output", "corr_analysis.svg"),
        ("correlation-output", "correlation_analysis_stats.md"),
        ("unknown-asvs-output", "top_unknown_asvs.html"),
    ] {
        assert!(out.join(dir_name).join(file).exists(), "missing {}/{}", dir_name, file);
    }

    let markdown =
        fs::read_to_string(out.join("correlation-output/correlation_analysis_stats.md")).unwrap();
    assert!(markdown.starts_with("# Correlation analysis stats"));
    assert!(markdown.contains("Date file was generated: "));
    assert!(markdown.contains("## Spearman results"));
    assert!(markdown.contains("Statistic: "));

    match &summary.outcomes[4] {
        AnalysisOutcome::Unknown(u) => {
            let ids: Vec<&str> = u.features.iter().map(|f| f.feature_id.as_str()).collect();
            assert_eq!(ids.len(), 2);
            assert!(ids.contains(&"asv18") && ids.contains(&"asv19"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_samples_as_rows_matches_transposed_input() {
    let dir = TempDir::new().unwrap();
    let (table_path, _) = write_inputs(dir.path());
    let table = FeatureTable::from_tsv(&table_path).unwrap();

    let rows_path = dir.path().join("samples-as-rows.tsv");
    table.transpose().unwrap().to_tsv(&rows_path).unwrap();
    let reloaded = load_table(&rows_path, true).unwrap();

    assert_eq!(reloaded.sample_ids(), table.sample_ids());
    assert_eq!(reloaded.feature_ids(), table.feature_ids());
    assert_eq!(reloaded.col_sums(), table.col_sums());
}
