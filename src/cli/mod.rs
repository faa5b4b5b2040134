//! CLI module for trendscope
//!
//! Provides command-line interface parsing for the trendscope binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod output;

use crate::types::QueryParams;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// trendscope - concurrent market trend analysis
///
/// Runs public-sentiment, market, policy and company analyses in parallel,
/// re-runs the ones that fall below the quality bar, and writes a markdown
/// report.
#[derive(Parser, Debug)]
#[command(
    name = "trendscope",
    version,
    about = "Concurrent market trend analysis with quality-gated retries",
    after_help = "EXAMPLES:\n    \
                  trendscope run --region Europe --period 2024              # Let the model pick analyses\n    \
                  trendscope run --companies Tesla,BYD --tasks market       # Market plus company analysis\n    \
                  trendscope run --keywords \"battery swap\" --no-report      # Print outcomes only\n    \
                  trendscope config --validate                             # Check trendscope.toml"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = crate::utils::DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one analysis and write the report
    Run(RunArgs),

    /// Show configuration information
    Config {
        /// Validate the configuration file and exit
        #[arg(long)]
        validate: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Region of interest; repeat for several
    #[arg(short, long = "region")]
    pub regions: Vec<String>,

    /// Period of interest, e.g. "2024" or "2024 Q2"
    #[arg(short, long, default_value = "")]
    pub period: String,

    /// Companies to profile (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub companies: Vec<String>,

    /// Keywords for public-sentiment analysis (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub keywords: Vec<String>,

    /// Analyses to run: survey, market, policy, company (comma separated).
    /// Skips model-based selection.
    #[arg(short, long, value_delimiter = ',')]
    pub tasks: Option<Vec<String>>,

    /// Report file name (written under the configured output directory)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Do not write a report
    #[arg(long)]
    pub no_report: bool,
}

impl RunArgs {
    pub fn query_params(&self) -> QueryParams {
        let mut params = QueryParams::new()
            .with_period(self.period.trim())
            .with_companies(non_blank(&self.companies))
            .with_keywords(non_blank(&self.keywords));
        for region in non_blank(&self.regions) {
            params = params.with_region(region);
        }
        if let Some(tasks) = &self.tasks {
            params = params.with_tasks(non_blank(tasks));
        }
        params
    }
}

fn non_blank(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["trendscope", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_run_arguments_become_query_params() {
        let args = run_args(&[
            "--region",
            "Europe",
            "-r",
            "Korea",
            "--period",
            "2024",
            "--companies",
            "Tesla, BYD",
            "--keywords",
            "charging",
        ]);
        let params = args.query_params();

        assert_eq!(params.region, vec!["Europe", "Korea"]);
        assert_eq!(params.period, "2024");
        assert_eq!(params.companies, vec!["Tesla", "BYD"]);
        assert_eq!(params.keywords, vec!["charging"]);
        assert!(params.tasks.is_none());
    }

    #[test]
    fn test_tasks_flag_is_split_and_blank_entries_dropped() {
        let params = run_args(&["--tasks", "market,,policy"]).query_params();
        assert_eq!(
            params.tasks,
            Some(vec!["market".to_string(), "policy".to_string()])
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["trendscope", "run", "--no-color", "--config", "x.toml"]).unwrap();
        assert!(cli.no_color);
        assert_eq!(cli.config, PathBuf::from("x.toml"));
    }

    #[test]
    fn test_config_validate() {
        let cli = Cli::try_parse_from(["trendscope", "config", "--validate"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { validate: true }));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["trendscope"]).is_err());
    }
}
