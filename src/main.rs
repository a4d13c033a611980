use anyhow::{Context, Result, anyhow};
use clap::Parser;
use n3mo::impact::{self, ImpactQuery};
use n3mo::indexer::{self, IndexOptions};
use n3mo::model::Project;
use n3mo::resolve::Resolver;
use n3mo::{cli, db};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn default_db_path(repo: &Path) -> PathBuf {
    repo.join(".n3mo").join("n3mo.sqlite")
}

fn default_locator(repo: &Path) -> String {
    std::fs::canonicalize(repo)
        .unwrap_or_else(|_| repo.to_path_buf())
        .display()
        .to_string()
}

fn open_project(repo: &Path, db_path: Option<PathBuf>, locator: Option<String>) -> Result<(db::Db, Project)> {
    let db_path = db_path.unwrap_or_else(|| default_db_path(repo));
    let locator = locator.unwrap_or_else(|| default_locator(repo));
    let db = db::Db::new(&db_path)?;
    let project = db
        .find_project(&locator)?
        .ok_or_else(|| anyhow!("no project indexed for {locator}; run `n3mo index` first"))?;
    Ok((db, project))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_tracing(args.verbose);

    match args.command {
        cli::Command::Index {
            repo,
            db,
            name,
            locator,
            force,
            no_ignore,
        } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let options = IndexOptions {
                name,
                locator,
                force,
                scan: indexer::scan::ScanOptions::new(no_ignore),
            };
            let mut indexer = indexer::Indexer::new_with_options(repo, &db_path, options)?;
            let stats = indexer.index()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        cli::Command::Resolve { repo, db, locator } => {
            let (db, project) = open_project(&repo, db, locator)?;
            let stats = Resolver::new(&db).run(project.id)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        cli::Command::Impact {
            symbol,
            repo,
            db,
            locator,
            file,
            depth,
            json,
            graph,
        } => {
            let (db, project) = open_project(&repo, db, locator)?;
            let mut query = ImpactQuery::new(symbol).in_file(file);
            if let Some(depth) = depth {
                query = query.with_depth(depth);
            }
            let outcome = impact::trace_impact(&db, project.id, &query)?;

            if let Some(path) = graph {
                if let Some(export) = outcome.graph() {
                    n3mo::util::ensure_parent_dir(&path)?;
                    std::fs::write(&path, serde_json::to_string_pretty(&export)?)
                        .with_context(|| format!("write graph export {}", path.display()))?;
                    tracing::info!(path = %path.display(), nodes = export.nodes.len(), "graph exported");
                }
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print!("{}", impact::render_text(&outcome));
            }
            Ok(())
        }
        cli::Command::Overview { repo, db, locator } => {
            let (db, project) = open_project(&repo, db, locator)?;
            let overview = db.project_overview(&project)?;
            println!("{}", serde_json::to_string_pretty(&overview)?);
            Ok(())
        }
    }
}
