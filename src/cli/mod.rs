//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Polling validation harness for provisioned cloud infrastructure
#[derive(Parser, Debug)]
#[command(name = "infra-validate")]
#[command(author = "hephaex@gmail.com")]
#[command(version)]
#[command(about = "Deploy infrastructure, poll it until it answers as expected, tear it down")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file (default: standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run suites end to end: deploy, validate, cleanup
    Run(RunArgs),

    /// Run one ad-hoc check against existing infrastructure
    Check(CheckArgs),

    /// List suites, stages and checks
    List(ListArgs),

    /// View stored results
    Results(ResultsArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Suite files (YAML or JSON)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Skip a stage (deploy, validate, cleanup); repeatable
    #[arg(short, long)]
    pub skip: Vec<String>,

    /// Maximum number of parallel suites
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Store the reports in the results directory
    #[arg(long)]
    pub save: bool,

    /// Also write the reports to a file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Retry flags shared by ad-hoc checks
#[derive(ClapArgs, Debug, Clone, Copy)]
pub struct RetryArgs {
    /// Maximum number of attempts (default from config)
    #[arg(long)]
    pub retries: Option<u32>,

    /// Seconds between attempts (default from config)
    #[arg(long)]
    pub interval: Option<f64>,
}

/// Arguments for check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(subcommand)]
    pub target: CheckTarget,

    #[command(flatten)]
    pub retry: RetryArgs,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long, global = true)]
    pub format: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CheckTarget {
    /// Run a command on a private host through a bastion
    Ssh {
        /// Public address of the bastion
        #[arg(long)]
        bastion: String,

        /// Private address of the target host
        #[arg(long)]
        host: String,

        /// Private key file
        #[arg(short, long)]
        key: PathBuf,

        /// SSH user (default from config)
        #[arg(short, long)]
        user: Option<String>,

        /// Command to run on the target
        #[arg(long)]
        command: String,

        /// Expected trimmed stdout
        #[arg(long)]
        expect: String,
    },

    /// Send an HTTP request
    Http {
        #[arg(long)]
        url: String,

        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Expected status code
        #[arg(short, long, default_value = "200")]
        status: u16,

        /// Substring the body must contain
        #[arg(long)]
        contains: Option<String>,
    },

    /// Open a TCP connection
    Tcp {
        #[arg(long)]
        host: String,

        #[arg(short, long)]
        port: u16,

        /// Connect timeout in seconds
        #[arg(long, default_value = "5")]
        timeout: u64,
    },

    /// Make a unary gRPC call
    Grpc {
        #[arg(long)]
        url: String,

        /// Method path
        #[arg(long, default_value = "/grpc.health.v1.Health/Check")]
        path: String,

        /// Request message (JSON or raw)
        #[arg(short, long, default_value = "")]
        request: String,

        /// Expected grpc-status
        #[arg(short, long, default_value = "0")]
        status: String,
    },
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Suite files (YAML or JSON)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Show every check
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for results command
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    /// Filter by suite
    #[arg(short, long)]
    pub suite: Option<String>,

    /// Show a specific run instead of the latest (needs --suite)
    #[arg(short, long, requires = "suite")]
    pub run: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Export the shown run to a file (.json or .csv)
    #[arg(short, long, requires = "suite")]
    pub export: Option<PathBuf>,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Write a default configuration file
    Init {
        /// Output path (default: ~/.config/infra-validate/config.yaml)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Describe the environment variables
    Env,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args() {
        let args = Args::parse_from([
            "infra-validate",
            "-vv",
            "run",
            "mongodb.yaml",
            "grpc.yaml",
            "--skip",
            "cleanup",
            "--skip",
            "deploy",
            "--parallel",
            "2",
            "--save",
        ]);
        assert_eq!(args.verbose, 2);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.files.len(), 2);
                assert_eq!(run.skip, vec!["cleanup", "deploy"]);
                assert_eq!(run.parallel, Some(2));
                assert!(run.save);
                assert!(run.format.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_requires_files() {
        assert!(Args::try_parse_from(["infra-validate", "run"]).is_err());
    }

    #[test]
    fn test_check_ssh_args() {
        let args = Args::parse_from([
            "infra-validate",
            "check",
            "--retries",
            "15",
            "--interval",
            "30",
            "ssh",
            "--bastion",
            "3.3.3.3",
            "--host",
            "10.0.1.5",
            "--key",
            "key.pem",
            "--command",
            "echo ok",
            "--expect",
            "ok",
        ]);
        match args.command {
            Command::Check(check) => {
                assert_eq!(check.retry.retries, Some(15));
                assert_eq!(check.retry.interval, Some(30.0));
                match check.target {
                    CheckTarget::Ssh { bastion, host, user, .. } => {
                        assert_eq!(bastion, "3.3.3.3");
                        assert_eq!(host, "10.0.1.5");
                        assert!(user.is_none());
                    }
                    _ => panic!("Expected ssh target"),
                }
            }
            _ => panic!("Expected Check command"),
        }
    }

    #[test]
    fn test_check_grpc_defaults() {
        let args = Args::parse_from(["infra-validate", "check", "grpc", "--url", "https://lb"]);
        match args.command {
            Command::Check(check) => match check.target {
                CheckTarget::Grpc { path, status, request, .. } => {
                    assert_eq!(path, "/grpc.health.v1.Health/Check");
                    assert_eq!(status, "0");
                    assert!(request.is_empty());
                }
                _ => panic!("Expected grpc target"),
            },
            _ => panic!("Expected Check command"),
        }
    }

    #[test]
    fn test_results_run_needs_suite() {
        assert!(Args::try_parse_from(["infra-validate", "results", "--run", "x"]).is_err());
        assert!(Args::try_parse_from(["infra-validate", "results", "--suite", "grpc", "--run", "x"]).is_ok());
    }

    #[test]
    fn test_config_init() {
        let args = Args::parse_from(["infra-validate", "config", "init", "--force"]);
        match args.command {
            Command::Config(ConfigArgs {
                action: ConfigAction::Init { output, force },
            }) => {
                assert!(output.is_none());
                assert!(force);
            }
            _ => panic!("Expected config init"),
        }
    }
}
