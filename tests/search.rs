use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use assert_matches::assert_matches;

use kira_reference_genomes::error::KiraError;
use kira_reference_genomes::search::{MatchEngine, SearchOptions};

const HEADER: &str = "#   See ftp://ftp.ncbi.nlm.nih.gov/genomes/README_assembly_summary.txt\n\
#assembly_accession\tbioproject\tbiosample\twgs_master\trefseq_category\ttaxid\tspecies_taxid\torganism_name\tinfraspecific_name\tisolate\tversion_status\tassembly_level\trelease_type\tgenome_rep\tseq_rel_date\tasm_name\tsubmitter\tgbrs_paired_asm\tpaired_asm_comp\tftp_path\texcluded_from_refseq\n";

fn row(organism: &str, strain: &str, level: &str, url: &str) -> String {
    let mut fields = vec!["na"; 21];
    fields[7] = organism;
    fields[8] = strain;
    fields[13] = level;
    fields[19] = url;
    fields.join("\t")
}

fn write_report(dir: &Path, rows: &[String]) -> PathBuf {
    let path = dir.join("assembly_summary_refseq.txt");
    let mut content = HEADER.to_string();
    for line in rows {
        content.push_str(line);
        content.push('\n');
    }
    std::fs::write(&path, content).unwrap();
    path
}

fn scenario_rows() -> Vec<String> {
    vec![
        row("OrgA", "strain=S1", "Full", "https://host/all/GCF_1"),
        row("OrgA", "", "Full", "https://host/all/GCF_2"),
        row("OrgB", "", "Partial", "https://host/all/GCF_3"),
    ]
}

fn strains(outcome: &kira_reference_genomes::search::SearchOutcome, key: &str) -> Vec<(String, String)> {
    outcome
        .results
        .get(key)
        .unwrap()
        .iter()
        .map(|hit| (hit.strain.clone(), hit.url.clone()))
        .collect()
}

#[test]
fn species_level_search_groups_strains() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_report(temp.path(), &scenario_rows());
    let engine = MatchEngine::new(&path);

    let outcome = engine
        .search(&["OrgA", "orgb"], SearchOptions::default())
        .unwrap();

    assert_eq!(outcome.results.keys().collect::<Vec<_>>(), vec!["orga"]);
    assert_eq!(
        strains(&outcome, "orga"),
        vec![
            ("s1".to_string(), "https://host/all/GCF_1".to_string()),
            (String::new(), "https://host/all/GCF_2".to_string()),
        ]
    );
    assert_eq!(outcome.unfound, BTreeSet::from(["orgb".to_string()]));
    assert_eq!(outcome.stats.found, 1);
    assert_eq!(outcome.stats.strain_hits, 2);
    assert_eq!(outcome.stats.unfound, 1);
    assert_eq!(outcome.stats.queries, 2);
}

#[test]
fn strain_specific_search_splits_keys() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_report(temp.path(), &scenario_rows());
    let engine = MatchEngine::new(&path);
    let options = SearchOptions {
        require_full_genome: true,
        strain_specific: true,
    };

    let outcome = engine.search(&["orga s1", "orga", "orgb"], options).unwrap();

    assert_eq!(
        outcome.results.keys().collect::<Vec<_>>(),
        vec!["orga s1", "orga"]
    );
    assert_eq!(strains(&outcome, "orga s1").len(), 1);
    assert_eq!(strains(&outcome, "orga")[0].1, "https://host/all/GCF_2");
    assert_eq!(outcome.unfound, BTreeSet::from(["orgb".to_string()]));
}

#[test]
fn strain_specific_never_invents_species() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_report(temp.path(), &scenario_rows());
    let engine = MatchEngine::new(&path);
    let queries = ["orga s1", "orga", "orgb", "orgb s9"];

    let plain = engine.search(&queries, SearchOptions::default()).unwrap();
    let split = engine
        .search(
            &queries,
            SearchOptions {
                require_full_genome: true,
                strain_specific: true,
            },
        )
        .unwrap();

    for key in split.results.keys() {
        let species = key.split(' ').next().unwrap();
        assert!(plain.results.contains_key(species), "{key} has no species match");
    }
    assert_eq!(split.results.total_hits(), plain.results.total_hits());
}

#[test]
fn all_levels_includes_partial_assemblies() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_report(temp.path(), &scenario_rows());
    let engine = MatchEngine::new(&path);
    let options = SearchOptions {
        require_full_genome: false,
        strain_specific: false,
    };

    let outcome = engine.search(&["orga", "orgb"], options).unwrap();

    assert!(outcome.unfound.is_empty());
    assert_eq!(strains(&outcome, "orgb")[0].1, "https://host/all/GCF_3");
}

#[test]
fn full_genome_filter_excludes_other_levels() {
    let temp = tempfile::tempdir().unwrap();
    let rows = vec![
        row("OrgA", "", "Full", "https://host/all/GCF_1"),
        row("OrgA", "", "Partial", "https://host/all/GCF_2"),
        row("OrgA", "", "full", "https://host/all/GCF_3"),
    ];
    let path = write_report(temp.path(), &rows);

    let outcome = MatchEngine::new(&path)
        .search(&["orga"], SearchOptions::default())
        .unwrap();

    assert_eq!(strains(&outcome, "orga").len(), 1);
    assert_eq!(strains(&outcome, "orga")[0].1, "https://host/all/GCF_1");
}

#[test]
fn found_and_unfound_partition_queries() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_report(temp.path(), &scenario_rows());
    let queries = ["OrgA", "orga", "OrgB", "orgc", " orgd "];

    let outcome = MatchEngine::new(&path)
        .search(&queries, SearchOptions::default())
        .unwrap();

    let expected = ["orga", "orgb", "orgc", "orgd"]
        .into_iter()
        .map(str::to_string)
        .collect::<BTreeSet<_>>();
    let found = outcome
        .results
        .keys()
        .map(str::to_string)
        .collect::<BTreeSet<_>>();
    assert!(found.is_disjoint(&outcome.unfound));
    let union = found.union(&outcome.unfound).cloned().collect::<BTreeSet<_>>();
    assert_eq!(union, expected);
}

#[test]
fn header_only_report_finds_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_report(temp.path(), &[]);

    let outcome = MatchEngine::new(&path)
        .search(&["orga", "orgb"], SearchOptions::default())
        .unwrap();

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.unfound.len(), 2);
    assert_eq!(outcome.stats.strain_hits, 0);
}

#[test]
fn short_row_aborts_scan() {
    let temp = tempfile::tempdir().unwrap();
    let rows = vec![
        row("OrgA", "", "Full", "https://host/all/GCF_1"),
        "OrgA\tbroken".to_string(),
    ];
    let path = write_report(temp.path(), &rows);

    let err = MatchEngine::new(&path)
        .search(&["orga"], SearchOptions::default())
        .unwrap_err();

    assert_matches!(err, KiraError::MalformedRecord { line: 4, fields: 2, .. });
}

#[test]
fn blank_row_aborts_scan() {
    let temp = tempfile::tempdir().unwrap();
    let rows = vec![
        row("OrgA", "", "Full", "https://host/all/GCF_1"),
        String::new(),
        row("OrgB", "", "Full", "https://host/all/GCF_2"),
    ];
    let path = write_report(temp.path(), &rows);

    let err = MatchEngine::new(&path)
        .search(&["orga", "orgb"], SearchOptions::default())
        .unwrap_err();

    assert_matches!(err, KiraError::MalformedRecord { line: 4, fields: 1, .. });
}

#[test]
fn gzip_report_is_decompressed() {
    use std::io::Write;

    let temp = tempfile::tempdir().unwrap();
    let plain = write_report(temp.path(), &scenario_rows());
    let gz_path = temp.path().join("assembly_summary_refseq.txt.gz");
    let file = std::fs::File::create(&gz_path).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    encoder
        .write_all(&std::fs::read(&plain).unwrap())
        .unwrap();
    encoder.finish().unwrap();

    let outcome = MatchEngine::new(&gz_path)
        .search(&["orga"], SearchOptions::default())
        .unwrap();

    assert_eq!(outcome.results.total_hits(), 2);
}

#[test]
fn crlf_rows_are_accepted() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("assembly_summary_refseq.txt");
    let content = format!(
        "# comment\r\n# header\r\n{}\r\n",
        row("OrgA", "strain=S1", "Full", "https://host/all/GCF_1")
    );
    std::fs::write(&path, content).unwrap();

    let outcome = MatchEngine::new(&path)
        .search(&["orga"], SearchOptions::default())
        .unwrap();

    assert_eq!(outcome.results.get("orga").unwrap()[0].strain, "s1");
}
