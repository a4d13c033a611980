use n3mo::impact::{
    CallGraph, ImpactGraph, ImpactOutcome, ImpactQuery, render_text, trace_impact, traverse,
};
use n3mo::indexer::Indexer;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn temp_repo_dir(label: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("n3mo-{label}-{nanos}-{counter}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn copy_dir(src: &Path, dst: &Path) {
    std::fs::create_dir_all(dst).unwrap();
    for entry in std::fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        let target = dst.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&path, &target);
        } else {
            std::fs::copy(&path, &target).unwrap();
        }
    }
}

struct TempRepo {
    repo_root: PathBuf,
    db_path: PathBuf,
}

impl Drop for TempRepo {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.repo_root);
    }
}

impl TempRepo {
    fn new(fixture: &str) -> Self {
        let repo_root = temp_repo_dir(fixture);
        copy_dir(&fixture_path(fixture), &repo_root);
        let db_path = repo_root.join(".n3mo").join("n3mo.sqlite");
        Self { repo_root, db_path }
    }

    fn index(&self) -> Indexer {
        let mut indexer = Indexer::new(self.repo_root.clone(), &self.db_path).unwrap();
        indexer.index().unwrap();
        indexer
    }
}

fn trace(indexer: &Indexer, symbol: &str) -> ImpactOutcome {
    trace_impact(indexer.db(), indexer.project().id, &ImpactQuery::new(symbol)).unwrap()
}

fn summary(outcome: &ImpactOutcome) -> Vec<(usize, String, String, i64)> {
    let ImpactOutcome::Impacted(report) = outcome else {
        panic!("expected dependents, got {outcome:?}");
    };
    report
        .rows
        .iter()
        .map(|row| (row.depth, row.caller_file.clone(), row.caller_name.clone(), row.line))
        .collect()
}

#[test]
fn direct_and_ripple_callers_of_upsert_symbol() {
    let repo = TempRepo::new("py_graph");
    let indexer = repo.index();

    let outcome = trace(&indexer, "upsert_symbol");
    assert_eq!(
        summary(&outcome),
        vec![
            (1, "pkg/api.py".to_string(), "save".to_string(), 5),
            (1, "pkg/ingest.py".to_string(), "ingest_file".to_string(), 6),
            (2, "pkg/ingest.py".to_string(), "ingest_project".to_string(), 11),
        ]
    );
    let ImpactOutcome::Impacted(report) = &outcome else {
        unreachable!()
    };
    assert!(!report.truncated);
    assert_eq!(report.target.file_path, "pkg/store.py");
    assert_eq!(report.rows[2].target_name, "ingest_file");

    let text = render_text(&outcome);
    assert!(text.contains("Direct callers:"));
    assert!(text.contains("[depth 2] ingest_project (pkg/ingest.py:11) -> ingest_file"));
}

#[test]
fn cross_file_call_links_to_imported_helper() {
    let repo = TempRepo::new("py_graph");
    let indexer = repo.index();

    let outcome = trace(&indexer, "helper");
    assert_eq!(
        summary(&outcome),
        vec![(1, "main.py".to_string(), "main".to_string(), 6)]
    );
}

#[test]
fn method_call_through_self_is_linked() {
    let repo = TempRepo::new("py_graph");
    let indexer = repo.index();

    let outcome = trace(&indexer, "open");
    assert_eq!(
        summary(&outcome),
        vec![(1, "pkg/store.py".to_string(), "connect".to_string(), 3)]
    );
}

#[test]
fn unused_function_is_safe_to_change() {
    let repo = TempRepo::new("py_graph");
    let indexer = repo.index();

    let outcome = trace(&indexer, "unused_fn");
    let ImpactOutcome::NoDependents { target } = &outcome else {
        panic!("expected no dependents, got {outcome:?}");
    };
    assert_eq!(target.name, "unused_fn");
    assert!(render_text(&outcome).contains("Safe to change"));
}

#[test]
fn unknown_symbol_is_not_found() {
    let repo = TempRepo::new("py_graph");
    let indexer = repo.index();

    assert_eq!(
        trace(&indexer, "does_not_exist"),
        ImpactOutcome::NotFound {
            symbol: "does_not_exist".to_string()
        }
    );
    let scoped = ImpactQuery::new("helper").in_file(Some("main.py".to_string()));
    assert!(matches!(
        trace_impact(indexer.db(), indexer.project().id, &scoped).unwrap(),
        ImpactOutcome::NotFound { .. }
    ));
}

#[test]
fn mutual_recursion_terminates() {
    let repo = TempRepo::new("py_graph");
    let indexer = repo.index();

    let query = ImpactQuery::new("ping").with_depth(50);
    let outcome = trace_impact(indexer.db(), indexer.project().id, &query).unwrap();
    assert_eq!(
        summary(&outcome),
        vec![
            (1, "pkg/cycle.py".to_string(), "pong".to_string(), 8),
            (2, "pkg/cycle.py".to_string(), "ping".to_string(), 3),
        ]
    );
}

#[test]
fn depth_one_keeps_only_direct_callers() {
    let repo = TempRepo::new("py_graph");
    let indexer = repo.index();

    let query = ImpactQuery::new("upsert_symbol").with_depth(1);
    let outcome = trace_impact(indexer.db(), indexer.project().id, &query).unwrap();
    let rows = summary(&outcome);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|(depth, ..)| *depth == 1));
}

#[test]
fn graph_export_marks_target_and_ripple_groups() {
    let repo = TempRepo::new("py_graph");
    let indexer = repo.index();

    let ImpactOutcome::Impacted(report) = trace(&indexer, "upsert_symbol") else {
        panic!("expected dependents");
    };
    let graph = ImpactGraph::from_report(&report);
    let groups: Vec<_> = graph
        .nodes
        .iter()
        .map(|node| (node.label.as_str(), node.group))
        .collect();
    assert_eq!(graph.nodes.len(), 4);
    assert!(groups.contains(&("upsert_symbol", 0)));
    assert!(groups.contains(&("save", 1)));
    assert!(groups.contains(&("ingest_file", 1)));
    assert!(groups.contains(&("ingest_project", 2)));
    assert_eq!(graph.edges.len(), 3);
}

#[test]
fn in_memory_graph_matches_store_traversal() {
    let repo = TempRepo::new("py_graph");
    let indexer = repo.index();
    let project_id = indexer.project().id;

    let graph = CallGraph::load(indexer.db(), project_id).unwrap();
    assert_eq!(graph.edge_count(), 7);

    let ImpactOutcome::Impacted(report) = trace(&indexer, "upsert_symbol") else {
        panic!("expected dependents");
    };
    let in_memory = traverse(&graph, &report.target, report.max_depth, Duration::from_secs(60)).unwrap();
    assert_eq!(in_memory.rows, report.rows);
}

#[test]
fn depth_zero_still_reports_direct_callers() {
    let repo = TempRepo::new("py_graph");
    let indexer = repo.index();

    let query = ImpactQuery::new("upsert_symbol").with_depth(0);
    assert_eq!(query.max_depth, 1);
    let outcome = trace_impact(indexer.db(), indexer.project().id, &query).unwrap();
    let rows = summary(&outcome);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|(depth, ..)| *depth == 1));

    let mut raw = ImpactQuery::new("upsert_symbol");
    raw.max_depth = 0;
    let outcome = trace_impact(indexer.db(), indexer.project().id, &raw).unwrap();
    assert_eq!(summary(&outcome).len(), 2);
}
