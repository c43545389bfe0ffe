//! `harvester extract`: load jobs, open the result store, run the pool.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result, bail};
use harvester_core::pipeline::{FixedInterval, Pacer, Pipeline, RunStats, RunSummary, WorkerPool};
use harvester_core::session::{HttpSessionFactory, PageProfile, SessionFactory};
use harvester_core::sink::{ResultSink, missing_jobs};
use harvester_core::{HarvestConfig, Resolver, load_jobs};
use tracing::{debug, info, warn};

use crate::app::progress::spawn_progress_ui;
use crate::cli::{Backend, ExtractArgs};

/// Folds the extract flags into `config` and re-validates it.
pub(crate) fn apply_overrides(args: &ExtractArgs, config: &mut HarvestConfig) -> Result<()> {
    if let Some(workers) = args.workers {
        config.pool.workers = usize::from(workers);
    }
    if let Some(delay_ms) = args.delay_ms {
        config.pool.delay_ms = delay_ms;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.page.navigation_timeout_secs = timeout_secs;
    }
    config
        .validate()
        .context("configuration invalid after applying command-line flags")
}

pub(crate) async fn run_extract(
    args: &ExtractArgs,
    mut config: HarvestConfig,
    show_progress: bool,
) -> Result<RunSummary> {
    apply_overrides(args, &mut config)?;

    let jobs = if args.retry_missing {
        if same_file(&args.input, &args.output) {
            bail!(
                "--output must differ from --input with --retry-missing\n  Suggestion: Write retried rows to a new file, e.g. -o retried.csv"
            );
        }
        missing_jobs(&args.input, &config.output).with_context(|| {
            format!("failed to read prior results from {}", args.input.display())
        })?
    } else {
        load_jobs(&args.input, &config.input)
            .with_context(|| format!("failed to load jobs from {}", args.input.display()))?
    };
    info!(jobs = jobs.len(), retry_missing = args.retry_missing, "loaded jobs");

    let sink = Arc::new(
        ResultSink::open(&args.output, config.output.clone())
            .with_context(|| format!("failed to open result store {}", args.output.display()))?,
    );
    let factory = build_factory(args.backend, &config.page)?;
    let resolver: Arc<dyn Resolver> = Arc::from(config.resolver.build());
    let pacer: Arc<dyn Pacer> = Arc::new(FixedInterval::from_millis(config.pool.delay_ms));
    let pool = WorkerPool::new(config.pool.workers, resolver, pacer)?;
    let pipeline = Pipeline::new(pool, factory);

    let stats = Arc::new(RunStats::new());
    let (progress_handle, stop_progress) =
        spawn_progress_ui(show_progress, Arc::clone(&stats), jobs.len());

    let result = pipeline.run(jobs, sink, stats).await;

    stop_progress.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let summary = result?;
    if all_jobs_failed(&summary) {
        warn!(
            failed = summary.failed,
            backend = ?args.backend,
            "every job failed; pages may need JavaScript rendering\n  Suggestion: Rerun with `--backend chromium`, then retry these rows with `--retry-missing`"
        );
    }
    Ok(summary)
}

/// Returns `true` when jobs were attempted and none of them succeeded.
fn all_jobs_failed(summary: &RunSummary) -> bool {
    summary.failed > 0 && summary.completed() == 0
}

pub(crate) fn build_factory(backend: Backend, page: &PageProfile) -> Result<Arc<dyn SessionFactory>> {
    debug!(?backend, "building session factory");
    match backend {
        Backend::Http => Ok(Arc::new(HttpSessionFactory::new(page)?)),
        #[cfg(feature = "chromium")]
        Backend::Chromium => Ok(Arc::new(
            harvester_core::session::ChromiumSessionFactory::new(page, true)?,
        )),
        #[cfg(not(feature = "chromium"))]
        Backend::Chromium => bail!(
            "this build has no Chromium backend\n  Suggestion: Rebuild with `--features chromium` or use `--backend http`"
        ),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::{Cli, Command};

    fn extract_args(extra: &[&str]) -> ExtractArgs {
        let mut argv = vec!["harvester", "extract", "-i", "in.csv", "-o", "out.csv"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Extract(args) => args,
            _ => panic!("expected extract"),
        }
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let args = extract_args(&["-w", "8", "-d", "0", "-t", "5"]);
        let mut config = HarvestConfig::default();
        apply_overrides(&args, &mut config).unwrap();
        assert_eq!(config.pool.workers, 8);
        assert_eq!(config.pool.delay_ms, 0);
        assert_eq!(config.page.navigation_timeout_secs, 5);
    }

    #[test]
    fn test_no_flags_keep_config_values() {
        let args = extract_args(&[]);
        let mut config = HarvestConfig::default();
        config.pool.workers = 2;
        apply_overrides(&args, &mut config).unwrap();
        assert_eq!(config.pool.workers, 2);
        assert_eq!(config.pool.delay_ms, 1000);
    }

    #[test]
    fn test_all_jobs_failed_only_without_any_success() {
        let all_failed = RunSummary {
            failed: 3,
            ..RunSummary::default()
        };
        assert!(all_jobs_failed(&all_failed));

        let one_missing = RunSummary {
            missing: 1,
            ..all_failed
        };
        assert!(!all_jobs_failed(&one_missing));

        let only_skipped = RunSummary {
            skipped: 4,
            ..RunSummary::default()
        };
        assert!(!all_jobs_failed(&only_skipped));
    }

    #[test]
    fn test_same_file_detects_identical_paths() {
        assert!(same_file(Path::new("a.csv"), Path::new("a.csv")));
        assert!(!same_file(Path::new("a.csv"), Path::new("b.csv")));
    }

    #[cfg(not(feature = "chromium"))]
    #[test]
    fn test_chromium_backend_unavailable_without_feature() {
        let err = build_factory(Backend::Chromium, &PageProfile::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("--features chromium"));
    }

    #[tokio::test]
    async fn test_retry_missing_rejects_same_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        std::fs::write(&path, "x").unwrap();
        let path_str = path.to_str().unwrap();
        let mut argv = vec!["harvester", "extract", "-i", path_str, "-o", path_str];
        argv.push("--retry-missing");
        let Command::Extract(args) = Cli::try_parse_from(argv).unwrap().command else {
            panic!("expected extract");
        };

        let err = run_extract(&args, HarvestConfig::default(), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--retry-missing"));
    }
}
