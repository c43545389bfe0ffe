//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Extract filing document links from listing pages and download them.
///
/// `crawl` collects the listing pages to visit into a job CSV. `extract` walks every listing page named in the input CSV with a pool of
/// workers and appends one row per page to the output CSV. Rerunning with the
/// same output resumes where the last run stopped. `download` then fetches
/// one document per row.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/harvester/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Collect listing page links into a job CSV
    Crawl(CrawlArgs),
    /// Extract one row of document links per listing page
    Extract(ExtractArgs),
    /// Download one document per extracted row
    Download(DownloadArgs),
}

/// Rendering backend for listing pages.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Plain HTTP fetch + HTML parsing
    #[default]
    Http,
    /// Headless Chromium (requires the `chromium` build feature)
    Chromium,
}

/// Arguments of `harvester crawl`.
#[derive(clap::Args, Debug)]
pub struct CrawlArgs {
    /// First listing page (defaults to crawl.start_url from the config)
    #[arg(short, long, value_name = "URL")]
    pub url: Option<String>,

    /// Job CSV to write; an existing file's rows are kept
    #[arg(short, long, value_name = "CSV")]
    pub output: PathBuf,

    /// Prior job CSV to merge with instead of the existing --output
    #[arg(short, long, value_name = "CSV")]
    pub merge: Option<PathBuf>,

    /// Stop after this many listing pages (1-10000)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=10000))]
    pub max_pages: Option<u16>,

    /// Delay between listing pages in milliseconds (0 to disable, max 60000)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub delay_ms: Option<u64>,

    /// Rendering backend
    #[arg(short, long, value_enum, default_value_t = Backend::Http)]
    pub backend: Backend,
}

/// Arguments of `harvester extract`.
#[derive(clap::Args, Debug)]
pub struct ExtractArgs {
    /// Input CSV with identifier and target columns
    #[arg(short, long, value_name = "CSV")]
    pub input: PathBuf,

    /// Result CSV; created if absent, appended to (resumed) otherwise
    #[arg(short, long, value_name = "CSV")]
    pub output: PathBuf,

    /// Concurrent workers (1-32)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub workers: Option<u8>,

    /// Delay after each page on one worker in milliseconds (0 to disable, max 60000)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub delay_ms: Option<u64>,

    /// Seconds to wait for the marker element on each page (1-600)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=600))]
    pub timeout_secs: Option<u64>,

    /// Rendering backend
    #[arg(short, long, value_enum, default_value_t = Backend::Http)]
    pub backend: Backend,

    /// Show a progress spinner
    #[arg(long)]
    pub progress: bool,

    /// Treat --input as a prior result CSV and retry its all-missing rows
    #[arg(long)]
    pub retry_missing: bool,
}

/// Arguments of `harvester download`.
#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    /// Result CSV written by `extract`
    #[arg(short, long, value_name = "CSV")]
    pub input: PathBuf,

    /// Directory to save documents to
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Delay between downloads in milliseconds (0 to disable, max 60000)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub delay_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(args: &[&str]) -> ExtractArgs {
        let mut argv = vec!["harvester", "extract", "-i", "in.csv", "-o", "out.csv"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Extract(args) => args,
            _ => panic!("expected extract"),
        }
    }

    #[test]
    fn test_cli_extract_defaults() {
        let args = extract(&[]);
        assert_eq!(args.input, PathBuf::from("in.csv"));
        assert_eq!(args.output, PathBuf::from("out.csv"));
        assert_eq!(args.workers, None);
        assert_eq!(args.delay_ms, None);
        assert_eq!(args.timeout_secs, None);
        assert_eq!(args.backend, Backend::Http);
        assert!(!args.progress);
        assert!(!args.retry_missing);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let cli = Cli::try_parse_from(["harvester", "-v", "extract", "-i", "a", "-o", "b"]).unwrap();
        assert_eq!(cli.verbose, 1);

        let cli = Cli::try_parse_from(["harvester", "extract", "-i", "a", "-o", "b", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let cli = Cli::try_parse_from(["harvester", "--quiet", "extract", "-i", "a", "-o", "b"])
            .unwrap();
        assert!(cli.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Cli::try_parse_from(["harvester", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Cli::try_parse_from(["harvester", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_subcommand_required() {
        let err = Cli::try_parse_from(["harvester"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn test_cli_extract_requires_input_and_output() {
        let err = Cli::try_parse_from(["harvester", "extract", "-i", "in.csv"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_workers_range() {
        assert_eq!(extract(&["-w", "1"]).workers, Some(1));
        assert_eq!(extract(&["--workers", "32"]).workers, Some(32));

        for bad in ["0", "33"] {
            let err = Cli::try_parse_from([
                "harvester", "extract", "-i", "a", "-o", "b", "-w", bad,
            ])
            .unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_delay_zero_disables() {
        assert_eq!(extract(&["--delay-ms", "0"]).delay_ms, Some(0));
        let err = Cli::try_parse_from([
            "harvester", "extract", "-i", "a", "-o", "b", "--delay-ms", "60001",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_timeout_range() {
        assert_eq!(extract(&["-t", "45"]).timeout_secs, Some(45));
        let err = Cli::try_parse_from([
            "harvester", "extract", "-i", "a", "-o", "b", "-t", "0",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_backend_and_flags() {
        let args = extract(&["--backend", "chromium", "--progress", "--retry-missing"]);
        assert_eq!(args.backend, Backend::Chromium);
        assert!(args.progress);
        assert!(args.retry_missing);
    }

    #[test]
    fn test_cli_crawl_args() {
        let cli = Cli::try_parse_from([
            "harvester",
            "crawl",
            "-o",
            "jobs.csv",
            "--url",
            "https://listing.example.com/ipo/index.html",
            "--merge",
            "old.csv",
            "--max-pages",
            "3",
            "-b",
            "chromium",
        ])
        .unwrap();
        let Command::Crawl(args) = cli.command else {
            panic!("expected crawl");
        };
        assert_eq!(args.output, PathBuf::from("jobs.csv"));
        assert_eq!(args.url.as_deref(), Some("https://listing.example.com/ipo/index.html"));
        assert_eq!(args.merge, Some(PathBuf::from("old.csv")));
        assert_eq!(args.max_pages, Some(3));
        assert_eq!(args.delay_ms, None);
        assert_eq!(args.backend, Backend::Chromium);

        let err = Cli::try_parse_from(["harvester", "crawl", "-o", "j.csv", "--max-pages", "0"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_download_args() {
        let cli = Cli::try_parse_from([
            "harvester",
            "--config",
            "site.toml",
            "download",
            "-i",
            "out.csv",
            "-o",
            "pdfs",
            "-d",
            "250",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("site.toml")));
        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.output_dir, PathBuf::from("pdfs"));
        assert_eq!(args.delay_ms, Some(250));
    }
}
