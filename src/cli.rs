//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use coursepack_core::DEFAULT_CONCURRENCY;

/// Download and install course content packages.
///
/// Coursepack reads a catalogue of package descriptors (a JSON array) and
/// runs them through the download-and-install pipeline, rendering progress
/// as it goes.
#[derive(Parser, Debug)]
#[command(name = "coursepack")]
#[command(author, version, about)]
pub struct Args {
    /// Catalogue JSON file of package descriptors (reads stdin when omitted)
    pub catalog: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum concurrent downloads (1-10)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub concurrency: u8,

    /// Folder receiving archives and extracted packages
    #[arg(short, long, default_value = "./packages")]
    pub output: PathBuf,

    /// Shared icon cache folder (defaults to {output}/images)
    #[arg(long)]
    pub images: Option<PathBuf>,

    /// Folder with runtime asset files copied next to each package manifest
    #[arg(long)]
    pub assets: Option<PathBuf>,

    /// Keep the library in memory instead of SQLite (useful for dry runs)
    #[arg(long)]
    pub ephemeral: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["coursepack"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.concurrency, 3); // DEFAULT_CONCURRENCY
        assert_eq!(args.output, PathBuf::from("./packages"));
        assert!(args.catalog.is_none());
        assert!(!args.ephemeral);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["coursepack", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["coursepack", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_concurrency_bounds_enforced() {
        assert!(Args::try_parse_from(["coursepack", "-c", "0"]).is_err());
        assert!(Args::try_parse_from(["coursepack", "-c", "11"]).is_err());

        let args = Args::try_parse_from(["coursepack", "-c", "10"]).unwrap();
        assert_eq!(args.concurrency, 10);
    }

    #[test]
    fn test_cli_catalog_positional() {
        let args = Args::try_parse_from(["coursepack", "catalogue.json"]).unwrap();
        assert_eq!(args.catalog, Some(PathBuf::from("catalogue.json")));
    }
}
